//! In-memory host
//!
//! Implements every collaborator port over plain maps: actors with a fixed
//! size storage, shared containers, an outbox of rendered notifications and a
//! pluggable scheduler. Used by the simulator, the CLI runtime and tests.

use crate::config::SlotLayout;
use crate::error::{Result, TradeError};
use crate::messages::{Cue, MessageCatalog, MessageKey};
use crate::ports::{
    ActorDirectory, ContainerProvider, Delivery, Feedback, Inventories, Messenger, Scheduler,
};
use crate::trade::manager::TradeManager;
use crate::trade::types::{EventOutcome, InteractionVerdict, TimerTask, TradeEvent};
use crate::types::{ActorId, ActorStatus, Item, Location, ResponseId, SessionId, TimerHandle};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Storage slots per actor
pub const STORAGE_SLOTS: usize = 36;

/// A simulated participant
#[derive(Clone, Debug)]
pub struct SimActor {
    pub status: ActorStatus,
    pub permissions: HashSet<String>,
    pub storage: Vec<Option<Item>>,
}

/// A notification as the actor would see it
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub actor: ActorId,
    pub key: MessageKey,
    pub text: String,
}

/// An item placed in the world because it did not fit in storage
#[derive(Clone, Debug, PartialEq)]
pub struct WorldDrop {
    pub actor: ActorId,
    pub location: Location,
    pub item: Item,
}

#[derive(Clone, Debug)]
pub struct SharedContainer {
    pub sides: (ActorId, ActorId),
    pub slots: Vec<Option<Item>>,
    pub viewers: HashSet<ActorId>,
}

/// Host environment backed by in-process state
#[derive(Debug)]
pub struct InMemoryHost<S> {
    actors: BTreeMap<ActorId, SimActor>,
    containers: HashMap<SessionId, SharedContainer>,
    outbox: Vec<Notice>,
    cues: Vec<(ActorId, Cue)>,
    drops: Vec<WorldDrop>,
    prompts: HashMap<ActorId, (ActorId, ResponseId)>,
    catalog: MessageCatalog,
    scheduler: S,
    fail_allocations: bool,
}

impl<S: Scheduler> InMemoryHost<S> {
    pub fn new(scheduler: S, catalog: MessageCatalog) -> Self {
        Self {
            actors: BTreeMap::new(),
            containers: HashMap::new(),
            outbox: Vec::new(),
            cues: Vec::new(),
            drops: Vec::new(),
            prompts: HashMap::new(),
            catalog,
            scheduler,
            fail_allocations: false,
        }
    }

    /// Add an online, healthy actor with empty storage
    pub fn add_actor(&mut self, id: ActorId, name: &str, location: Location) -> &mut SimActor {
        tracing::debug!(actor = %id, name, "Actor joined");
        self.actors.entry(id).or_insert_with(|| SimActor {
            status: ActorStatus {
                name: name.to_string(),
                online: true,
                alive: true,
                sleeping: false,
                location,
            },
            permissions: HashSet::new(),
            storage: vec![None; STORAGE_SLOTS],
        })
    }

    pub fn actor(&self, id: &ActorId) -> Option<&SimActor> {
        self.actors.get(id)
    }

    pub fn actor_mut(&mut self, id: &ActorId) -> Option<&mut SimActor> {
        self.actors.get_mut(id)
    }

    pub fn actors(&self) -> impl Iterator<Item = (&ActorId, &SimActor)> {
        self.actors.iter()
    }

    pub fn grant_permission(&mut self, id: &ActorId, permission: &str) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.permissions.insert(permission.to_string());
        }
    }

    pub fn set_online(&mut self, id: &ActorId, online: bool) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.status.online = online;
        }
    }

    pub fn move_to(&mut self, id: &ActorId, location: Location) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.status.location = location;
        }
    }

    /// Put `item` into a specific storage slot, replacing its content
    pub fn put(&mut self, id: &ActorId, slot: usize, item: Item) -> Result<()> {
        let actor = self
            .actors
            .get_mut(id)
            .ok_or_else(|| TradeError::ActorUnavailable(id.to_string()))?;
        let target = actor
            .storage
            .get_mut(slot)
            .ok_or_else(|| TradeError::Internal(format!("no storage slot {}", slot)))?;
        *target = Some(item);
        Ok(())
    }

    /// Fill every free storage slot with copies of `item`
    pub fn fill_storage(&mut self, id: &ActorId, item: Item) {
        if let Some(actor) = self.actors.get_mut(id) {
            for slot in actor.storage.iter_mut().filter(|slot| slot.is_none()) {
                *slot = Some(item.clone());
            }
        }
    }

    /// Remove and return the content of a storage slot
    pub fn take_from_storage(&mut self, id: &ActorId, slot: usize) -> Option<Item> {
        self.actors
            .get_mut(id)?
            .storage
            .get_mut(slot)?
            .take()
            .filter(|item| !item.is_empty())
    }

    /// Insert with stacking; returns what did not fit
    pub fn insert_into_storage(&mut self, id: &ActorId, mut item: Item) -> Option<Item> {
        let Some(actor) = self.actors.get_mut(id) else {
            return Some(item);
        };

        for stack in actor.storage.iter_mut().flatten() {
            if item.count == 0 {
                break;
            }
            if stack.stacks_with(&item) {
                let moved = stack.room().min(item.count);
                stack.count += moved;
                item.count -= moved;
            }
        }

        for slot in actor.storage.iter_mut().filter(|slot| slot.is_none()) {
            if item.count == 0 {
                break;
            }
            let moved = item.max_stack.max(1).min(item.count);
            let mut stack = item.clone();
            stack.count = moved;
            *slot = Some(stack);
            item.count -= moved;
        }

        (item.count > 0).then_some(item)
    }

    /// Units of `item_id` in storage
    pub fn count_items(&self, id: &ActorId, item_id: u32) -> u32 {
        self.actors.get(id).map_or(0, |actor| {
            actor
                .storage
                .iter()
                .flatten()
                .filter(|item| item.id == item_id)
                .map(|item| item.count)
                .sum()
        })
    }

    /// Units of `item_id` in storage plus what was dropped next to the actor
    pub fn total_items_held(&self, id: &ActorId, item_id: u32) -> u32 {
        let dropped: u32 = self
            .drops
            .iter()
            .filter(|drop| &drop.actor == id && drop.item.id == item_id)
            .map(|drop| drop.item.count)
            .sum();
        self.count_items(id, item_id) + dropped
    }

    pub fn container(&self, session: &SessionId) -> Option<&SharedContainer> {
        self.containers.get(session)
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Make the next allocations fail
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn outbox(&self) -> &[Notice] {
        &self.outbox
    }

    pub fn drain_outbox(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.outbox)
    }

    pub fn messages_for(&self, id: &ActorId) -> Vec<MessageKey> {
        self.outbox
            .iter()
            .filter(|notice| &notice.actor == id)
            .map(|notice| notice.key)
            .collect()
    }

    pub fn cues_for(&self, id: &ActorId) -> Vec<Cue> {
        self.cues
            .iter()
            .filter(|(actor, _)| actor == id)
            .map(|(_, cue)| *cue)
            .collect()
    }

    pub fn drops(&self) -> &[WorldDrop] {
        &self.drops
    }

    /// Response id of the prompt currently shown to `target`
    pub fn prompt_for(&self, target: &ActorId) -> Option<ResponseId> {
        self.prompts.get(target).map(|(_, response)| *response)
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Move a stack from storage into the actor's side of its trade.
    ///
    /// The item only leaves storage when the manager accepts the change; a
    /// similar stack already in the container slot is merged.
    pub fn stage(
        &mut self,
        manager: &mut TradeManager,
        actor: &ActorId,
        storage_slot: usize,
        container_slot: usize,
    ) -> Result<InteractionVerdict> {
        let session = manager
            .session(actor)
            .map(|session| session.id().clone())
            .ok_or_else(|| TradeError::SessionNotFound(actor.to_string()))?;
        let item = self
            .actors
            .get(actor)
            .and_then(|a| a.storage.get(storage_slot).cloned().flatten())
            .filter(|item| !item.is_empty())
            .ok_or_else(|| TradeError::Internal(format!("storage slot {} is empty", storage_slot)))?;

        let resulting = match self.slot(&session, container_slot) {
            None => item.clone(),
            Some(existing) if existing.stacks_with(&item) && existing.room() >= item.count => {
                let mut merged = existing;
                merged.count += item.count;
                merged
            }
            Some(_) => return Err(TradeError::Internal(format!("slot {} is occupied", container_slot))),
        };

        let verdict = self.interact(manager, actor, container_slot, Some(resulting.clone()));
        if verdict.is_accepted() {
            self.take_from_storage(actor, storage_slot);
            self.set_slot(&session, container_slot, Some(resulting));
        }
        Ok(verdict)
    }

    /// Take a staged stack back into storage
    pub fn unstage(
        &mut self,
        manager: &mut TradeManager,
        actor: &ActorId,
        container_slot: usize,
    ) -> Result<InteractionVerdict> {
        let session = manager
            .session(actor)
            .map(|session| session.id().clone())
            .ok_or_else(|| TradeError::SessionNotFound(actor.to_string()))?;
        let Some(existing) = self.slot(&session, container_slot) else {
            return Ok(InteractionVerdict::Ignored);
        };

        let verdict = self.interact(manager, actor, container_slot, None);
        if verdict.is_accepted() {
            self.set_slot(&session, container_slot, None);
            if self.grant_or_drop(actor, existing) == Delivery::Dropped {
                tracing::warn!(session = %session, actor = %actor, "Unstaged item dropped into the world");
                if self.is_online(actor) {
                    self.notify(actor, MessageKey::ItemsDropped, &[]);
                }
            }
        }
        Ok(verdict)
    }

    /// Click the ready control of the actor's trade
    pub fn click_ready(&mut self, manager: &mut TradeManager, actor: &ActorId) -> InteractionVerdict {
        let slot = manager.config().layout.ready_slot;
        self.interact(manager, actor, slot, None)
    }

    fn interact(
        &mut self,
        manager: &mut TradeManager,
        actor: &ActorId,
        slot: usize,
        item: Option<Item>,
    ) -> InteractionVerdict {
        let event = TradeEvent::Interaction {
            actor: actor.clone(),
            slot,
            item,
        };
        match manager.handle(self, event) {
            EventOutcome::Interaction(verdict) => verdict,
            _ => InteractionVerdict::Ignored,
        }
    }

    /// Close the container view and report it
    pub fn close_container(&mut self, manager: &mut TradeManager, actor: &ActorId) {
        if let Some(session) = manager.session(actor).map(|s| s.id().clone()) {
            self.hide(&session, actor);
        }
        manager.handle(self, TradeEvent::ContainerClosed { actor: actor.clone() });
    }

    /// Take the actor offline and report it
    pub fn disconnect(&mut self, manager: &mut TradeManager, actor: &ActorId) {
        self.set_online(actor, false);
        self.prompts.remove(actor);
        manager.handle(self, TradeEvent::Disconnected { actor: actor.clone() });
    }

    /// Kill the actor and report it
    pub fn kill(&mut self, manager: &mut TradeManager, actor: &ActorId) {
        if let Some(a) = self.actors.get_mut(actor) {
            a.status.alive = false;
        }
        manager.handle(self, TradeEvent::Died { actor: actor.clone() });
    }

    /// Move the actor and report the teleport
    pub fn teleport(&mut self, manager: &mut TradeManager, actor: &ActorId, destination: Location) {
        self.move_to(actor, destination.clone());
        manager.handle(
            self,
            TradeEvent::Teleported {
                actor: actor.clone(),
                destination,
            },
        );
    }

    /// Route a fired timer
    pub fn fire(&mut self, manager: &mut TradeManager, task: TimerTask) {
        manager.handle(self, TradeEvent::Timer(task));
    }
}

impl<S> ActorDirectory for InMemoryHost<S> {
    fn status(&self, actor: &ActorId) -> Option<ActorStatus> {
        self.actors.get(actor).map(|a| a.status.clone())
    }

    fn has_permission(&self, actor: &ActorId, permission: &str) -> bool {
        self.actors
            .get(actor)
            .map_or(false, |a| a.permissions.contains(permission))
    }
}

impl<S> Messenger for InMemoryHost<S> {
    fn notify(&mut self, actor: &ActorId, key: MessageKey, params: &[(&str, String)]) {
        let text = self.catalog.render(key, params);
        tracing::debug!(actor = %actor, key = key.as_str(), "{}", text);
        self.outbox.push(Notice {
            actor: actor.clone(),
            key,
            text,
        });
    }

    fn prompt(&mut self, target: &ActorId, sender: &ActorId, response: ResponseId) {
        tracing::debug!(recipient = %target, sender = %sender, %response, "Prompt shown");
        self.prompts.insert(target.clone(), (sender.clone(), response));
    }
}

impl<S> Feedback for InMemoryHost<S> {
    fn feedback(&mut self, actor: &ActorId, cue: Cue) {
        self.cues.push((actor.clone(), cue));
    }
}

impl<S> ContainerProvider for InMemoryHost<S> {
    fn allocate(
        &mut self,
        session: &SessionId,
        a: &ActorId,
        b: &ActorId,
        layout: &SlotLayout,
    ) -> Result<()> {
        if self.fail_allocations {
            return Err(TradeError::ContainerUnavailable(session.to_string()));
        }
        self.containers.insert(
            session.clone(),
            SharedContainer {
                sides: (a.clone(), b.clone()),
                slots: vec![None; layout.size()],
                viewers: HashSet::new(),
            },
        );
        Ok(())
    }

    fn set_slot(&mut self, session: &SessionId, slot: usize, item: Option<Item>) {
        if let Some(target) = self
            .containers
            .get_mut(session)
            .and_then(|c| c.slots.get_mut(slot))
        {
            *target = item;
        }
    }

    fn slot(&self, session: &SessionId, slot: usize) -> Option<Item> {
        self.containers
            .get(session)
            .and_then(|c| c.slots.get(slot).cloned().flatten())
    }

    fn show(&mut self, session: &SessionId, actor: &ActorId) {
        if let Some(container) = self.containers.get_mut(session) {
            container.viewers.insert(actor.clone());
        }
    }

    fn hide(&mut self, session: &SessionId, actor: &ActorId) {
        if let Some(container) = self.containers.get_mut(session) {
            container.viewers.remove(actor);
        }
    }

    fn is_viewing(&self, session: &SessionId, actor: &ActorId) -> bool {
        self.containers
            .get(session)
            .map_or(false, |c| c.viewers.contains(actor))
    }

    fn destroy(&mut self, session: &SessionId) {
        self.containers.remove(session);
    }
}

impl<S: Scheduler> Inventories for InMemoryHost<S> {
    fn storage(&self, actor: &ActorId) -> Vec<Option<Item>> {
        self.actors
            .get(actor)
            .map(|a| a.storage.clone())
            .unwrap_or_default()
    }

    fn grant_or_drop(&mut self, actor: &ActorId, item: Item) -> Delivery {
        let Some(leftover) = self.insert_into_storage(actor, item) else {
            return Delivery::Stored;
        };

        let location = self
            .actors
            .get(actor)
            .map(|a| a.status.location.clone())
            .unwrap_or_else(|| Location::new("unknown", 0.0, 0.0, 0.0));
        tracing::debug!(actor = %actor, item = %leftover, "Dropped item in the world");
        self.drops.push(WorldDrop {
            actor: actor.clone(),
            location,
            item: leftover,
        });
        Delivery::Dropped
    }
}

impl<S: Scheduler> Scheduler for InMemoryHost<S> {
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerHandle {
        self.scheduler.schedule(delay, task)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.scheduler.cancel(handle)
    }
}

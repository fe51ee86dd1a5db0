//! Deterministic trade simulation
//!
//! Couples a `TradeManager` with an `InMemoryHost` on a virtual clock, so a
//! whole handshake-to-resolution sequence can be scripted step by step.

use crate::config::TradeConfig;
use crate::error::Result;
use crate::host::memory::InMemoryHost;
use crate::host::scheduler::ManualScheduler;
use crate::trade::manager::TradeManager;
use crate::trade::types::{Decision, InteractionVerdict, Resolution, Side};
use crate::types::{ActorId, Item, Location, ResponseId};
use std::time::Duration;

pub struct Simulation {
    manager: TradeManager,
    host: InMemoryHost<ManualScheduler>,
}

impl Simulation {
    pub fn new(config: TradeConfig) -> Result<Self> {
        let host = InMemoryHost::new(ManualScheduler::new(), config.messages.clone());
        let manager = TradeManager::new(config)?;
        Ok(Self { manager, host })
    }

    /// Add an actor holding the trade permission
    pub fn add_actor(&mut self, id: &str, name: &str, location: Location) -> ActorId {
        let actor = ActorId::new(id);
        self.host.add_actor(actor.clone(), name, location);
        let permission = self.manager.config().use_permission.clone();
        self.host.grant_permission(&actor, &permission);
        actor
    }

    pub fn manager(&self) -> &TradeManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut TradeManager {
        &mut self.manager
    }

    pub fn host(&self) -> &InMemoryHost<ManualScheduler> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut InMemoryHost<ManualScheduler> {
        &mut self.host
    }

    pub fn give(&mut self, actor: &ActorId, slot: usize, item: Item) -> Result<()> {
        self.host.put(actor, slot, item)
    }

    pub fn request(&mut self, sender: &ActorId, target: &ActorId) -> Result<ResponseId> {
        self.manager.send_request(&mut self.host, sender, target)
    }

    /// Answer through the prompt currently shown to `target`
    pub fn respond(&mut self, target: &ActorId, decision: Decision) -> Resolution {
        match self.host.prompt_for(target) {
            Some(response) => self.respond_with(target, response, decision),
            None => Resolution::Ignored,
        }
    }

    pub fn respond_with(
        &mut self,
        target: &ActorId,
        response: ResponseId,
        decision: Decision,
    ) -> Resolution {
        self.manager
            .respond(&mut self.host, target, response, decision)
    }

    pub fn stage(
        &mut self,
        actor: &ActorId,
        storage_slot: usize,
        container_slot: usize,
    ) -> Result<InteractionVerdict> {
        self.host
            .stage(&mut self.manager, actor, storage_slot, container_slot)
    }

    pub fn unstage(&mut self, actor: &ActorId, container_slot: usize) -> Result<InteractionVerdict> {
        self.host.unstage(&mut self.manager, actor, container_slot)
    }

    pub fn ready(&mut self, actor: &ActorId) -> InteractionVerdict {
        self.host.click_ready(&mut self.manager, actor)
    }

    pub fn cancel(&mut self, actor: &ActorId) -> bool {
        self.manager.cancel_trade(&mut self.host, actor)
    }

    pub fn close(&mut self, actor: &ActorId) {
        self.host.close_container(&mut self.manager, actor);
    }

    pub fn disconnect(&mut self, actor: &ActorId) {
        self.host.disconnect(&mut self.manager, actor);
    }

    pub fn kill(&mut self, actor: &ActorId) {
        self.host.kill(&mut self.manager, actor);
    }

    pub fn teleport(&mut self, actor: &ActorId, destination: Location) {
        self.host.teleport(&mut self.manager, actor, destination);
    }

    /// Move the virtual clock forward and run every timer that came due.
    /// Returns how many timers fired.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.host.scheduler_mut().advance_clock(by);
        let mut fired = 0;
        while let Some(task) = self.host.scheduler_mut().pop_due() {
            self.host.fire(&mut self.manager, task);
            fired += 1;
        }
        fired
    }

    pub fn shutdown(&mut self) -> usize {
        self.manager.cancel_all_trades(&mut self.host)
    }

    /// Units of `item_id` anywhere: storage, world drops and live escrow
    pub fn total_units(&self, item_id: u32) -> u32 {
        let held: u32 = self
            .host
            .actors()
            .map(|(id, _)| self.host.total_items_held(id, item_id))
            .sum();
        let escrowed: u32 = self
            .manager
            .sessions()
            .flat_map(|session| {
                [Side::A, Side::B]
                    .into_iter()
                    .flat_map(move |side| session.staged(side).values())
            })
            .filter(|item| item.id == item_id)
            .map(|item| item.count)
            .sum();
        held + escrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageKey;

    #[test]
    fn test_conservation_through_completed_trade() {
        let mut sim = Simulation::new(TradeConfig::default()).unwrap();
        let alex = sim.add_actor("alex", "Alex", Location::new("world", 0.0, 64.0, 0.0));
        let steve = sim.add_actor("steve", "Steve", Location::new("world", 5.0, 64.0, 0.0));
        sim.give(&alex, 0, Item::new(264, 0, 5)).unwrap();

        sim.request(&alex, &steve).unwrap();
        assert!(matches!(sim.respond(&steve, Decision::Accept), Resolution::Accepted(_)));
        sim.stage(&alex, 0, 0).unwrap();
        assert_eq!(sim.host().count_items(&alex, 264), 0);
        assert_eq!(sim.total_units(264), 5);

        sim.ready(&alex);
        sim.ready(&steve);
        assert_eq!(sim.advance(Duration::from_secs(2)), 1);
        assert_eq!(sim.total_units(264), 5);
        assert_eq!(sim.host().count_items(&steve, 264), 5);
        assert!(sim.host().messages_for(&alex).contains(&MessageKey::TradeCompleted));
    }

    #[test]
    fn test_respond_without_prompt() {
        let mut sim = Simulation::new(TradeConfig::default()).unwrap();
        let steve = sim.add_actor("steve", "Steve", Location::new("world", 5.0, 64.0, 0.0));
        assert_eq!(sim.respond(&steve, Decision::Accept), Resolution::Ignored);
    }
}

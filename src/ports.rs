//! Collaborator capabilities consumed by the trade core.
//!
//! The host environment (game server, simulator, test double) implements
//! these traits; the core never owns actors, containers or timers itself.

use crate::blacklist::ItemBlacklist;
use crate::config::{SlotLayout, TradeConfig};
use crate::error::Result;
use crate::messages::{Cue, MessageKey};
use crate::trade::types::TimerTask;
use crate::types::{ActorId, ActorStatus, Item, ResponseId, SessionId, TimerHandle};
use std::time::Duration;

/// Resolves identities to live actor snapshots
pub trait ActorDirectory {
    fn status(&self, actor: &ActorId) -> Option<ActorStatus>;

    fn has_permission(&self, actor: &ActorId, permission: &str) -> bool;

    fn is_online(&self, actor: &ActorId) -> bool {
        self.status(actor).map_or(false, |s| s.online)
    }

    fn display_name(&self, actor: &ActorId) -> String {
        self.status(actor)
            .map(|s| s.name)
            .unwrap_or_else(|| actor.to_string())
    }
}

/// Fire-and-forget notifications
pub trait Messenger {
    fn notify(&mut self, actor: &ActorId, key: MessageKey, params: &[(&str, String)]);

    /// Present `target` an accept/reject choice tagged with `response`
    fn prompt(&mut self, target: &ActorId, sender: &ActorId, response: ResponseId);
}

pub trait Feedback {
    fn feedback(&mut self, actor: &ActorId, cue: Cue);
}

/// Two-partition container shared by the participants of one session
pub trait ContainerProvider {
    fn allocate(
        &mut self,
        session: &SessionId,
        a: &ActorId,
        b: &ActorId,
        layout: &SlotLayout,
    ) -> Result<()>;

    fn set_slot(&mut self, session: &SessionId, slot: usize, item: Option<Item>);

    fn slot(&self, session: &SessionId, slot: usize) -> Option<Item>;

    fn show(&mut self, session: &SessionId, actor: &ActorId);

    fn hide(&mut self, session: &SessionId, actor: &ActorId);

    /// Whether `actor` currently has the container open
    fn is_viewing(&self, session: &SessionId, actor: &ActorId) -> bool;

    fn destroy(&mut self, session: &SessionId);
}

/// Where a granted item ended up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Stored,
    /// Placed in the world next to the actor
    Dropped,
}

/// General storage of actors
pub trait Inventories {
    /// Snapshot of every storage slot
    fn storage(&self, actor: &ActorId) -> Vec<Option<Item>>;

    /// Add to storage, or drop in the world when it does not fit.
    /// Never discards.
    fn grant_or_drop(&mut self, actor: &ActorId, item: Item) -> Delivery;
}

/// Delayed, cancellable one-shot callbacks delivered back to the control
/// thread as `TradeEvent::Timer`
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Returns whether the timer was still pending
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

/// Everything the core needs from its environment
pub trait Host: ActorDirectory + Messenger + Feedback + ContainerProvider + Inventories + Scheduler {}

impl<T> Host for T where
    T: ActorDirectory + Messenger + Feedback + ContainerProvider + Inventories + Scheduler
{
}

/// Host plus read-only policy, handed to session operations
pub struct TradeContext<'a, H: Host> {
    pub host: &'a mut H,
    pub config: &'a TradeConfig,
    pub blacklist: &'a ItemBlacklist,
}

impl<'a, H: Host> TradeContext<'a, H> {
    pub fn new(host: &'a mut H, config: &'a TradeConfig, blacklist: &'a ItemBlacklist) -> Self {
        Self {
            host,
            config,
            blacklist,
        }
    }

    pub fn status(&self, actor: &ActorId) -> Option<ActorStatus> {
        self.host.status(actor)
    }

    pub fn name(&self, actor: &ActorId) -> String {
        self.host.display_name(actor)
    }

    /// Notify `actor` if it is still reachable
    pub fn notify(&mut self, actor: &ActorId, key: MessageKey, params: &[(&str, String)]) {
        if self.host.is_online(actor) {
            self.host.notify(actor, key, params);
        }
    }

    /// Notify `actor` with `{player}` set to `about`'s name
    pub fn notify_about(&mut self, actor: &ActorId, key: MessageKey, about: &ActorId) {
        let name = self.name(about);
        self.notify(actor, key, &[("player", name)]);
    }

    /// Play a cue when sounds are enabled
    pub fn cue(&mut self, actor: &ActorId, cue: Cue) {
        if self.config.sounds_enabled && self.host.is_online(actor) {
            self.host.feedback(actor, cue);
        }
    }

    /// Blacklist check including the actor's bypass permission
    pub fn can_trade(&self, actor: &ActorId, item: &Item) -> bool {
        let bypass = self
            .host
            .has_permission(actor, self.blacklist.bypass_permission());
        self.blacklist.can_trade(item, bypass)
    }

    pub fn render(&self, key: MessageKey, params: &[(&str, String)]) -> String {
        self.config.messages.render(key, params)
    }
}

//! Barter
//!
//! Peer-to-peer item trading for a shared game world.
//!
//! Two actors agree to trade through a timed handshake, stage items into a
//! shared two-sided container, and confirm with a ready toggle. Staged items
//! are held in escrow by the session: a completed trade hands each escrow to
//! the partner, any cancellation returns it to its owner.
//!
//! The host environment (actors, containers, storage, timers) is reached
//! through the traits in [`ports`]; [`host`] provides an in-memory host and
//! timer backends for simulation and tests.

pub mod blacklist;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod messages;
pub mod ports;
pub mod trade;
pub mod types;
pub mod validators;

// Re-export commonly used types
pub use blacklist::ItemBlacklist;
pub use config::{BlacklistConfig, SlotLayout, TradeConfig};
pub use error::{ErrorCategory, Result, TradeError};
pub use messages::{Cue, MessageCatalog, MessageKey};
pub use ports::{Host, TradeContext};
pub use trade::{
    CancelReason, Decision, EventOutcome, InteractionVerdict, Resolution, TradeEvent,
    TradeManager, TradePhase, TradeRequest, TradeSession,
};
pub use types::{ActorId, ActorStatus, Item, Location, ResponseId, SessionId, TimerHandle};

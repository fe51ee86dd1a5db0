//! Trade handshake, sessions and the directory that ties them together

pub mod manager;
pub mod request;
pub mod session;
pub mod types;

pub use manager::TradeManager;
pub use request::TradeRequest;
pub use session::TradeSession;
pub use types::{
    CancelReason, Decision, EventOutcome, InteractionVerdict, RejectReason, Resolution, Side,
    TimerTask, TradeEvent, TradePhase, Zone,
};

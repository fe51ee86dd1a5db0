//! Error types for barter

use crate::messages::MessageKey;
use thiserror::Error;

/// Broad failure classes a caller can react to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Validation rejected the operation; nothing changed
    PreconditionFailure,
    /// An actor is already bound to a trade or request
    StateConflict,
    /// Storage cannot absorb the incoming items
    CapacityFailure,
    /// Disconnect, death, distance or a closed container ended the trade
    DisruptionFailure,
    /// A timer or response arrived after its target resolved
    StaleCallback,
    /// Host, configuration or IO failure
    Environment,
}

/// Main error type for barter
#[derive(Error, Debug)]
pub enum TradeError {
    // Handshake preconditions
    #[error("Cannot trade with yourself")]
    CannotTradeSelf,

    #[error("Actor unavailable: {0}")]
    ActorUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Actor already in trade: {0}")]
    AlreadyInTrade(String),

    #[error("Target already in trade: {0}")]
    TargetInTrade(String),

    #[error("Target already has a pending request: {0}")]
    RequestAlreadyPending(String),

    #[error("Target is waiting on its own request: {0}")]
    TargetBusy(String),

    #[error("Actor already has a pending request: {0}")]
    PendingRequest(String),

    #[error("Out of range: distance {distance:.1}, max {max:.1}")]
    OutOfRange { distance: f64, max: f64 },

    // Session errors
    #[error("Trade session not found: {0}")]
    SessionNotFound(String),

    #[error("Shared container unavailable: {0}")]
    ContainerUnavailable(String),

    #[error("Insufficient storage for {actor}: {incoming} incoming items")]
    InsufficientCapacity { actor: String, incoming: usize },

    // Configuration errors
    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("Invalid item signature: {0}")]
    InvalidSignature(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradeError {
    /// Which failure class this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            TradeError::CannotTradeSelf
            | TradeError::ActorUnavailable(_)
            | TradeError::PermissionDenied(_)
            | TradeError::OutOfRange { .. } => ErrorCategory::PreconditionFailure,

            TradeError::AlreadyInTrade(_)
            | TradeError::TargetInTrade(_)
            | TradeError::RequestAlreadyPending(_)
            | TradeError::TargetBusy(_)
            | TradeError::PendingRequest(_) => ErrorCategory::StateConflict,

            TradeError::InsufficientCapacity { .. } => ErrorCategory::CapacityFailure,
            TradeError::SessionNotFound(_) => ErrorCategory::StaleCallback,

            TradeError::ContainerUnavailable(_)
            | TradeError::InvalidConfig(_)
            | TradeError::InvalidSignature(_)
            | TradeError::Io(_)
            | TradeError::Json(_)
            | TradeError::Internal(_) => ErrorCategory::Environment,
        }
    }

    /// Message shown to the initiating actor, if the error is user-facing
    pub fn message_key(&self) -> Option<MessageKey> {
        let key = match self {
            TradeError::CannotTradeSelf => MessageKey::CannotTradeYourself,
            TradeError::ActorUnavailable(_) => MessageKey::PlayerNotFound,
            TradeError::PermissionDenied(_) => MessageKey::NoPermission,
            TradeError::AlreadyInTrade(_) => MessageKey::AlreadyInTrade,
            TradeError::TargetInTrade(_) => MessageKey::TargetInTrade,
            TradeError::RequestAlreadyPending(_) => MessageKey::AlreadySentRequest,
            TradeError::TargetBusy(_) => MessageKey::TargetBusy,
            TradeError::PendingRequest(_) => MessageKey::PendingRequest,
            TradeError::OutOfRange { .. } => MessageKey::OutOfRange,
            TradeError::ContainerUnavailable(_) => MessageKey::TradeCancelled,
            TradeError::InsufficientCapacity { .. } => MessageKey::InventoryFull,
            _ => return None,
        };
        Some(key)
    }
}

/// Result type alias for barter operations
pub type Result<T> = std::result::Result<T, TradeError>;

//! Trade types and state machine

use crate::error::ErrorCategory;
use crate::types::{ActorId, Item, Location, ResponseId, SessionId};
use serde::{Deserialize, Serialize};

/// Phase of a trade session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradePhase {
    /// Both sides may stage items and toggle ready
    Active,
    /// Both sides are ready and the completion countdown is running
    Completing,
    /// Items were exchanged
    Completed,
    /// Escrow was returned to its owners
    Cancelled,
}

impl TradePhase {
    /// Check if the session is in a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradePhase::Completed | TradePhase::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Which half of the shared container an actor owns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The requester, left half
    A,
    /// The accepter, right half
    B,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Classification of a shared-container slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone {
    Side(Side),
    /// Read-only divider
    Separator,
    /// Shared ready toggle
    Ready,
    /// Past the end of the container
    Outside,
}

/// Answer to a trade request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accept,
    Reject,
}

/// Deferred work, re-resolved by id when it fires
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerTask {
    ExpireRequest { target: ActorId, response: ResponseId },
    CompleteTrade { session: SessionId },
    CloseGrace { session: SessionId, actor: ActorId },
    TeleportGrace { session: SessionId, actor: ActorId },
}

/// Host notifications routed into the trade core
#[derive(Clone, Debug, PartialEq)]
pub enum TradeEvent {
    /// An actor changed a shared-container slot; `item` is the slot's
    /// resulting content (`None` when emptied)
    Interaction {
        actor: ActorId,
        slot: usize,
        item: Option<Item>,
    },
    ContainerClosed { actor: ActorId },
    Disconnected { actor: ActorId },
    Died { actor: ActorId },
    Teleported { actor: ActorId, destination: Location },
    Timer(TimerTask),
}

/// Why a session was cancelled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The actor asked to stop
    Requested(ActorId),
    Disconnected(ActorId),
    Died(ActorId),
    OutOfRange(ActorId),
    ContainerClosed(ActorId),
    /// The named actor could not receive the partner's items
    InventoryFull(ActorId),
    /// A participant failed validation at start or completion
    ActorUnavailable,
    Shutdown,
}

impl CancelReason {
    /// Actor whose action ended the trade
    pub fn culprit(&self) -> Option<&ActorId> {
        match self {
            CancelReason::Requested(actor)
            | CancelReason::Disconnected(actor)
            | CancelReason::Died(actor)
            | CancelReason::OutOfRange(actor)
            | CancelReason::ContainerClosed(actor) => Some(actor),
            CancelReason::InventoryFull(_)
            | CancelReason::ActorUnavailable
            | CancelReason::Shutdown => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CancelReason::InventoryFull(_) => ErrorCategory::CapacityFailure,
            CancelReason::ActorUnavailable => ErrorCategory::PreconditionFailure,
            CancelReason::Requested(_) | CancelReason::Shutdown => ErrorCategory::Environment,
            CancelReason::Disconnected(_)
            | CancelReason::Died(_)
            | CancelReason::OutOfRange(_)
            | CancelReason::ContainerClosed(_) => ErrorCategory::DisruptionFailure,
        }
    }
}

/// Why an interaction was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Separator or out-of-range slot
    ReadOnlySlot,
    /// Slot belongs to the partner
    ForeignZone,
    Blacklisted,
    /// Session no longer accepts changes
    Closed,
}

/// What the host must do with the raw slot change it reported
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionVerdict {
    /// Commit the change; escrow was updated
    Accepted,
    /// The ready control was toggled; discard the raw change
    Control,
    /// Revert the raw change
    Rejected(RejectReason),
    /// Not a participant; leave the change to the host
    Ignored,
}

impl InteractionVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, InteractionVerdict::Accepted)
    }
}

/// Result of answering a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No matching request (stale or duplicate answer)
    Ignored,
    Accepted(SessionId),
    Rejected,
    /// Accepted, but the trade could not start
    AcceptFailed,
}

/// Result of routing a host event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// Nothing matched (unknown actor or stale timer)
    Ignored,
    /// State was updated
    Applied,
    Interaction(InteractionVerdict),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminal() {
        assert!(TradePhase::Completed.is_terminal());
        assert!(TradePhase::Cancelled.is_terminal());
        assert!(TradePhase::Active.is_active());
        assert!(TradePhase::Completing.is_active());
    }

    #[test]
    fn test_side_other() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
    }

    #[test]
    fn test_cancel_reason_culprit() {
        let alex = ActorId::new("alex");
        assert_eq!(
            CancelReason::Disconnected(alex.clone()).culprit(),
            Some(&alex)
        );
        assert_eq!(CancelReason::InventoryFull(alex).culprit(), None);
        assert_eq!(CancelReason::Shutdown.culprit(), None);
    }

    #[test]
    fn test_cancel_reason_category() {
        let alex = ActorId::new("alex");
        assert_eq!(
            CancelReason::Died(alex.clone()).category(),
            ErrorCategory::DisruptionFailure
        );
        assert_eq!(
            CancelReason::InventoryFull(alex).category(),
            ErrorCategory::CapacityFailure
        );
    }

    #[test]
    fn test_timer_task_serialization() {
        let task = TimerTask::ExpireRequest {
            target: ActorId::new("steve"),
            response: ResponseId(42),
        };
        let serialized = serde_json::to_string(&task).unwrap();
        let deserialized: TimerTask = serde_json::from_str(&serialized).unwrap();
        assert_eq!(task, deserialized);
    }
}

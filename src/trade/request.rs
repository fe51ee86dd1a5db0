//! Pending trade invitations

use crate::types::{ActorId, ResponseId, TimerHandle};
use std::time::{Duration, SystemTime};

/// An invitation waiting for the target's answer
#[derive(Clone, Debug)]
pub struct TradeRequest {
    sender: ActorId,
    target: ActorId,
    created_at: SystemTime,
    response: ResponseId,
    expiry: Option<TimerHandle>,
}

impl TradeRequest {
    pub fn new(sender: ActorId, target: ActorId) -> Self {
        Self {
            sender,
            target,
            created_at: SystemTime::now(),
            response: ResponseId::generate(),
            expiry: None,
        }
    }

    pub fn sender(&self) -> &ActorId {
        &self.sender
    }

    pub fn target(&self) -> &ActorId {
        &self.target
    }

    /// Correlation id the target's answer must carry
    pub fn response(&self) -> ResponseId {
        self.response
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }

    pub fn set_expiry(&mut self, handle: TimerHandle) {
        self.expiry = Some(handle);
    }

    /// Take the expiry handle so it is cancelled at most once
    pub fn take_expiry(&mut self) -> Option<TimerHandle> {
        self.expiry.take()
    }

    pub fn involves(&self, actor: &ActorId) -> bool {
        &self.sender == actor || &self.target == actor
    }

    /// Whether an answer tagged `response` belongs to this request
    pub fn matches(&self, response: ResponseId) -> bool {
        self.response == response
    }
}

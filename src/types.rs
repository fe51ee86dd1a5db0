//! Core types used throughout barter

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a participant in the shared world
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a trade session (derived from both participants and a nonce)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Derive a session id for the pair `a`/`b`
    pub fn derive(a: &ActorId, b: &ActorId, nonce: u64) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(a.0.as_bytes());
        hasher.update([0u8]);
        hasher.update(b.0.as_bytes());
        hasher.update(nonce.to_be_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..8]))
    }

    /// Fresh session id with a random nonce
    pub fn generate(a: &ActorId, b: &ActorId) -> Self {
        Self::derive(a, b, rand::random::<u64>())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque correlation id tying an accept/reject answer to its request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseId(pub u64);

impl ResponseId {
    pub fn generate() -> Self {
        Self(rand::random::<u64>())
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Handle of a scheduled one-shot callback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A stack of items
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    /// Variant of the item (damage / colour / subtype)
    pub meta: u16,
    pub count: u32,
    pub max_stack: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

impl Item {
    /// Id 0 is the empty slot marker
    pub const AIR: u32 = 0;

    pub fn new(id: u32, meta: u16, count: u32) -> Self {
        Self {
            id,
            meta,
            count,
            max_stack: 64,
            custom_name: None,
        }
    }

    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id == Self::AIR || self.count == 0
    }

    /// Same identity and variant, so the two can share a stack
    pub fn is_similar(&self, other: &Item) -> bool {
        self.id == other.id && self.meta == other.meta
    }

    /// Whether `other` can be merged into this stack without changing
    /// either item's identity
    pub fn stacks_with(&self, other: &Item) -> bool {
        self.is_similar(other)
            && self.custom_name == other.custom_name
            && self.max_stack == other.max_stack
    }

    /// How many more units fit on this stack
    pub fn room(&self) -> u32 {
        self.max_stack.saturating_sub(self.count)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "AIR");
        }
        match &self.custom_name {
            Some(name) => write!(f, "{} x{} ({}:{})", name, self.count, self.id, self.meta),
            None => write!(f, "x{} ({}:{})", self.count, self.id, self.meta),
        }
    }
}

/// Position inside a named world
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Euclidean distance, infinite across worlds
    pub fn distance(&self, other: &Location) -> f64 {
        if self.world != other.world {
            return f64::INFINITY;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Snapshot of an actor as seen by the host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorStatus {
    pub name: String,
    pub online: bool,
    pub alive: bool,
    pub sleeping: bool,
    pub location: Location,
}

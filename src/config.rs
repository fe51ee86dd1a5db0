//! Trade configuration
//!
//! Loaded from JSON at startup; every field has a default so a partial file
//! (or no file at all) yields a usable configuration.

use crate::error::{Result, TradeError};
use crate::messages::MessageCatalog;
use crate::trade::types::{Side, Zone};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Slots per container row
pub const ROW_WIDTH: usize = 9;

/// Top-level trade configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// How long a request waits for an answer
    pub request_timeout_ms: u64,

    /// Countdown between "both ready" and the exchange
    pub completion_delay_ms: u64,

    /// Grace period before a closed container cancels the trade
    pub close_grace_ms: u64,

    /// Grace period before an out-of-range teleport cancels the trade
    pub teleport_grace_ms: u64,

    pub max_distance: f64,

    /// Enforce `max_distance` when requesting and accepting
    pub check_distance: bool,

    /// Cancel running trades when a teleport leaves range
    pub cancel_on_distance: bool,

    pub sounds_enabled: bool,

    /// Permission needed to send requests
    pub use_permission: String,

    pub layout: SlotLayout,

    pub blacklist: BlacklistConfig,

    pub messages: MessageCatalog,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            completion_delay_ms: 2_000,
            close_grace_ms: 50,
            teleport_grace_ms: 250,
            max_distance: 15.0,
            check_distance: true,
            cancel_on_distance: true,
            sounds_enabled: true,
            use_permission: "trade.use".to_string(),
            layout: SlotLayout::default(),
            blacklist: BlacklistConfig::default(),
            messages: MessageCatalog::default(),
        }
    }
}

impl TradeConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&raw)?;
        tracing::info!("Loaded trade configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: TradeConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(TradeError::InvalidConfig(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.completion_delay_ms == 0 {
            return Err(TradeError::InvalidConfig(
                "completion_delay_ms must be positive".to_string(),
            ));
        }
        if !self.max_distance.is_finite() || self.max_distance <= 0.0 {
            return Err(TradeError::InvalidConfig(format!(
                "max_distance must be a positive number, got {}",
                self.max_distance
            )));
        }
        self.layout.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn teleport_grace(&self) -> Duration {
        Duration::from_millis(self.teleport_grace_ms)
    }
}

/// Geometry of the shared container.
///
/// Columns left of `divider_column` belong to side A, columns right of it to
/// side B. The divider column itself is read-only except for `ready_slot`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotLayout {
    pub rows: usize,
    pub divider_column: usize,
    /// Divider slots filled with the separator decoration
    pub separator_slots: Vec<usize>,
    pub ready_slot: usize,
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            rows: 6,
            divider_column: 4,
            separator_slots: vec![4, 13, 22, 31, 40],
            ready_slot: 49,
        }
    }
}

impl SlotLayout {
    pub fn size(&self) -> usize {
        self.rows * ROW_WIDTH
    }

    /// Classify a container slot
    pub fn zone(&self, slot: usize) -> Zone {
        if slot == self.ready_slot {
            return Zone::Ready;
        }
        if slot >= self.size() {
            return Zone::Outside;
        }

        let column = slot % ROW_WIDTH;
        if column < self.divider_column {
            Zone::Side(Side::A)
        } else if column > self.divider_column {
            Zone::Side(Side::B)
        } else {
            Zone::Separator
        }
    }

    /// All slots owned by `side`
    pub fn slots_of(&self, side: Side) -> Vec<usize> {
        (0..self.size())
            .filter(|slot| self.zone(*slot) == Zone::Side(side))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(TradeError::InvalidConfig("layout.rows must be positive".into()));
        }
        if self.divider_column == 0 || self.divider_column >= ROW_WIDTH - 1 {
            return Err(TradeError::InvalidConfig(format!(
                "layout.divider_column must be within 1..={}, got {}",
                ROW_WIDTH - 2,
                self.divider_column
            )));
        }
        if self.ready_slot >= self.size() {
            return Err(TradeError::InvalidConfig(format!(
                "layout.ready_slot {} is outside a {}-slot container",
                self.ready_slot,
                self.size()
            )));
        }
        if self.ready_slot % ROW_WIDTH != self.divider_column {
            return Err(TradeError::InvalidConfig(format!(
                "layout.ready_slot {} must sit in the divider column",
                self.ready_slot
            )));
        }
        for slot in &self.separator_slots {
            if *slot == self.ready_slot {
                return Err(TradeError::InvalidConfig(format!(
                    "layout.separator_slots contains the ready slot {}",
                    slot
                )));
            }
            if self.zone(*slot) != Zone::Separator {
                return Err(TradeError::InvalidConfig(format!(
                    "layout.separator_slots entry {} is not a divider slot",
                    slot
                )));
            }
        }
        Ok(())
    }
}

/// Blacklist seed: which item signatures are forbidden
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    pub enabled: bool,
    /// Signatures in `id:meta` form; meta 0 matches every variant
    pub items: Vec<String>,
    pub bypass_permission: String,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            items: Vec::new(),
            bypass_permission: "trade.bypass.blacklist".to_string(),
        }
    }
}

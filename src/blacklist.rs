//! Forbidden item signatures
//!
//! A signature is `id:meta`. An entry with meta `0` forbids every variant of
//! that id; any other meta forbids only that exact variant.

use crate::config::BlacklistConfig;
use crate::error::{Result, TradeError};
use crate::types::Item;
use std::collections::BTreeSet;
use std::path::Path;

/// Set of item signatures that may not enter a trade
#[derive(Clone, Debug)]
pub struct ItemBlacklist {
    enabled: bool,
    entries: BTreeSet<String>,
    bypass_permission: String,
}

impl ItemBlacklist {
    pub fn from_config(config: &BlacklistConfig) -> Self {
        let entries: BTreeSet<String> = config
            .items
            .iter()
            .filter_map(|raw| normalize(raw).ok())
            .collect();

        if config.enabled {
            tracing::info!("Loaded {} blacklisted item signatures", entries.len());
        } else {
            tracing::info!("Item blacklist disabled");
        }

        Self {
            enabled: config.enabled,
            entries,
            bypass_permission: config.bypass_permission.clone(),
        }
    }

    /// Load a persisted blacklist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: BlacklistConfig = serde_json::from_str(&raw)?;
        Ok(Self::from_config(&config))
    }

    /// Persist the blacklist as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.to_config())?;
        std::fs::write(path.as_ref(), raw)?;
        tracing::debug!("Saved blacklist to {}", path.as_ref().display());
        Ok(())
    }

    pub fn to_config(&self) -> BlacklistConfig {
        BlacklistConfig {
            enabled: self.enabled,
            items: self.entries(),
            bypass_permission: self.bypass_permission.clone(),
        }
    }

    /// Signature of a concrete item; `None` for empty slots
    pub fn signature(item: &Item) -> Option<String> {
        if item.is_empty() {
            return None;
        }
        Some(format!("{}:{}", item.id, item.meta))
    }

    pub fn is_blacklisted(&self, item: &Item) -> bool {
        if !self.enabled || item.is_empty() {
            return false;
        }

        let any_variant = format!("{}:0", item.id);
        let exact = format!("{}:{}", item.id, item.meta);
        self.entries.contains(&any_variant) || self.entries.contains(&exact)
    }

    /// Whether an actor may put `item` into a trade
    pub fn can_trade(&self, item: &Item, bypass: bool) -> bool {
        !self.is_blacklisted(item) || bypass
    }

    /// First forbidden item among `items`
    pub fn find_blacklisted<'a>(&self, items: &'a [Item], bypass: bool) -> Option<&'a Item> {
        if !self.enabled || bypass {
            return None;
        }
        items.iter().find(|item| self.is_blacklisted(item))
    }

    /// Returns whether the entry was new
    pub fn add(&mut self, raw: &str) -> Result<bool> {
        let signature = normalize(raw)?;
        Ok(self.entries.insert(signature))
    }

    /// Returns whether the entry existed
    pub fn remove(&mut self, raw: &str) -> Result<bool> {
        let signature = normalize(raw)?;
        Ok(self.entries.remove(&signature))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn bypass_permission(&self) -> &str {
        &self.bypass_permission
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted signatures
    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ItemBlacklist {
    fn default() -> Self {
        Self::from_config(&BlacklistConfig::default())
    }
}

/// `"46"` -> `"46:0"`, rejecting anything that is not `id[:meta]`
fn normalize(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let (id, meta) = match trimmed.split_once(':') {
        Some((id, meta)) => (id, meta),
        None => (trimmed, "0"),
    };

    let id: u32 = id
        .trim()
        .parse()
        .map_err(|_| TradeError::InvalidSignature(raw.to_string()))?;
    let meta: u16 = meta
        .trim()
        .parse()
        .map_err(|_| TradeError::InvalidSignature(raw.to_string()))?;

    Ok(format!("{}:{}", id, meta))
}

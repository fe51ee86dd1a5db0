//! User-facing message keys, feedback cues and the template catalog

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every message the trade core can send
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKey {
    // Handshake
    RequestSent,
    RequestReceived,
    RequestExpired,
    RequestCancelled,
    RequestDeclined,
    CannotTradeYourself,
    PlayerNotFound,
    NoPermission,
    AlreadyInTrade,
    TargetInTrade,
    AlreadySentRequest,
    TargetBusy,
    PendingRequest,
    OutOfRange,

    // Session
    TradeStarted,
    TradeReady,
    TradeNotReady,
    PartnerReady,
    PartnerNotReady,
    BothReady,
    TradeCompleted,
    TradeCancelled,
    PartnerCancelled,
    InventoryFull,
    PartnerInventoryFull,
    BlacklistItem,
    NotYourSide,
    ItemsDropped,

    // Container decoration
    SeparatorName,
    ReadyNone,
    ReadyOne,
    ReadyBoth,
}

impl MessageKey {
    pub const ALL: [MessageKey; 32] = [
        MessageKey::RequestSent,
        MessageKey::RequestReceived,
        MessageKey::RequestExpired,
        MessageKey::RequestCancelled,
        MessageKey::RequestDeclined,
        MessageKey::CannotTradeYourself,
        MessageKey::PlayerNotFound,
        MessageKey::NoPermission,
        MessageKey::AlreadyInTrade,
        MessageKey::TargetInTrade,
        MessageKey::AlreadySentRequest,
        MessageKey::TargetBusy,
        MessageKey::PendingRequest,
        MessageKey::OutOfRange,
        MessageKey::TradeStarted,
        MessageKey::TradeReady,
        MessageKey::TradeNotReady,
        MessageKey::PartnerReady,
        MessageKey::PartnerNotReady,
        MessageKey::BothReady,
        MessageKey::TradeCompleted,
        MessageKey::TradeCancelled,
        MessageKey::PartnerCancelled,
        MessageKey::InventoryFull,
        MessageKey::PartnerInventoryFull,
        MessageKey::BlacklistItem,
        MessageKey::NotYourSide,
        MessageKey::ItemsDropped,
        MessageKey::SeparatorName,
        MessageKey::ReadyNone,
        MessageKey::ReadyOne,
        MessageKey::ReadyBoth,
    ];

    /// Catalog key
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::RequestSent => "request-sent",
            MessageKey::RequestReceived => "request-received",
            MessageKey::RequestExpired => "request-expired",
            MessageKey::RequestCancelled => "request-cancelled",
            MessageKey::RequestDeclined => "request-declined",
            MessageKey::CannotTradeYourself => "cannot-trade-yourself",
            MessageKey::PlayerNotFound => "player-not-found",
            MessageKey::NoPermission => "no-permission",
            MessageKey::AlreadyInTrade => "already-in-trade",
            MessageKey::TargetInTrade => "target-in-trade",
            MessageKey::AlreadySentRequest => "already-sent-request",
            MessageKey::TargetBusy => "target-busy",
            MessageKey::PendingRequest => "pending-request",
            MessageKey::OutOfRange => "out-of-range",
            MessageKey::TradeStarted => "trade-started",
            MessageKey::TradeReady => "trade-ready",
            MessageKey::TradeNotReady => "trade-not-ready",
            MessageKey::PartnerReady => "partner-ready",
            MessageKey::PartnerNotReady => "partner-not-ready",
            MessageKey::BothReady => "both-ready",
            MessageKey::TradeCompleted => "trade-completed",
            MessageKey::TradeCancelled => "trade-cancelled",
            MessageKey::PartnerCancelled => "partner-cancelled",
            MessageKey::InventoryFull => "inventory-full",
            MessageKey::PartnerInventoryFull => "partner-inventory-full",
            MessageKey::BlacklistItem => "blacklist-item",
            MessageKey::NotYourSide => "not-your-side",
            MessageKey::ItemsDropped => "items-dropped",
            MessageKey::SeparatorName => "separator-name",
            MessageKey::ReadyNone => "ready-none",
            MessageKey::ReadyOne => "ready-one",
            MessageKey::ReadyBoth => "ready-both",
        }
    }

    /// Decoration keys render without the chat prefix
    pub fn is_decoration(&self) -> bool {
        matches!(
            self,
            MessageKey::SeparatorName
                | MessageKey::ReadyNone
                | MessageKey::ReadyOne
                | MessageKey::ReadyBoth
        )
    }

    fn default_template(&self) -> &'static str {
        match self {
            MessageKey::RequestSent => "Trade request sent to {player}.",
            MessageKey::RequestReceived => "{player} wants to trade with you.",
            MessageKey::RequestExpired => "The trade request expired.",
            MessageKey::RequestCancelled => "The trade request was cancelled.",
            MessageKey::RequestDeclined => "{player} declined your trade request.",
            MessageKey::CannotTradeYourself => "You cannot trade with yourself.",
            MessageKey::PlayerNotFound => "That player is not available.",
            MessageKey::NoPermission => "You do not have permission to trade.",
            MessageKey::AlreadyInTrade => "You are already trading.",
            MessageKey::TargetInTrade => "{player} is already trading.",
            MessageKey::AlreadySentRequest => "That player already has a pending request.",
            MessageKey::TargetBusy => "{player} is waiting on another request.",
            MessageKey::PendingRequest => "You already have a pending request.",
            MessageKey::OutOfRange => "{player} is too far away to trade.",
            MessageKey::TradeStarted => "Trading with {player}.",
            MessageKey::TradeReady => "You are ready.",
            MessageKey::TradeNotReady => "You are no longer ready.",
            MessageKey::PartnerReady => "{player} is ready.",
            MessageKey::PartnerNotReady => "{player} is no longer ready.",
            MessageKey::BothReady => "Both sides are ready, completing shortly...",
            MessageKey::TradeCompleted => "Trade completed.",
            MessageKey::TradeCancelled => "Trade cancelled.",
            MessageKey::PartnerCancelled => "{player} cancelled the trade.",
            MessageKey::InventoryFull => "Your inventory is too full for this trade.",
            MessageKey::PartnerInventoryFull => "{player}'s inventory is too full for this trade.",
            MessageKey::BlacklistItem => "That item cannot be traded.",
            MessageKey::NotYourSide => "You can only use your own side of the trade.",
            MessageKey::ItemsDropped => "Some items did not fit and were dropped at your feet.",
            MessageKey::SeparatorName => "===============",
            MessageKey::ReadyNone => "Nobody is ready",
            MessageKey::ReadyOne => "{player} is ready",
            MessageKey::ReadyBoth => "Both ready!",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audible feedback played to an actor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cue {
    /// Trade opened / request received
    Orb,
    /// Ready and completion
    LevelUp,
    /// Rejected item
    Bass,
    /// Request declined
    Break,
}

/// Prefix plus keyed templates with `{name}` placeholders
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageCatalog {
    pub prefix: String,
    pub templates: BTreeMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let templates = MessageKey::ALL
            .iter()
            .map(|key| (key.as_str().to_string(), key.default_template().to_string()))
            .collect();

        Self {
            prefix: "[Trade]".to_string(),
            templates,
        }
    }
}

impl MessageCatalog {
    /// Render `key` with its placeholders substituted
    pub fn render(&self, key: MessageKey, params: &[(&str, String)]) -> String {
        let body = match self.templates.get(key.as_str()) {
            Some(template) => substitute(template, params),
            None => format!("Missing message: {}", key.as_str()),
        };

        if key.is_decoration() || self.prefix.is_empty() {
            body
        } else {
            format!("{} {}", self.prefix, body)
        }
    }
}

fn substitute(template: &str, params: &[(&str, String)]) -> String {
    params
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_covers_every_key() {
        let catalog = MessageCatalog::default();
        for key in MessageKey::ALL {
            assert!(
                catalog.templates.contains_key(key.as_str()),
                "missing template for {}",
                key
            );
        }
    }

    #[test]
    fn test_render_with_placeholder() {
        let catalog = MessageCatalog::default();
        let rendered = catalog.render(MessageKey::PartnerCancelled, &[("player", "alex".into())]);
        assert_eq!(rendered, "[Trade] alex cancelled the trade.");
    }

    #[test]
    fn test_decoration_has_no_prefix() {
        let catalog = MessageCatalog::default();
        assert_eq!(catalog.render(MessageKey::ReadyBoth, &[]), "Both ready!");
    }

    #[test]
    fn test_missing_template() {
        let catalog = MessageCatalog {
            prefix: String::new(),
            templates: BTreeMap::new(),
        };
        assert_eq!(
            catalog.render(MessageKey::TradeCompleted, &[]),
            "Missing message: trade-completed"
        );
    }

    #[test]
    fn test_partial_catalog_deserializes() {
        let catalog: MessageCatalog = serde_json::from_str(r#"{"prefix": "<T>"}"#).unwrap();
        assert_eq!(catalog.prefix, "<T>");
        assert_eq!(
            catalog.render(MessageKey::TradeCancelled, &[]),
            "<T> Trade cancelled."
        );
    }
}

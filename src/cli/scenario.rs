//! Scripted two-actor trades for the `simulate` command

use crate::cli::app::{AppCommand, TradeApp};
use crate::cli::commands::Scenario;
use crate::config::TradeConfig;
use crate::error::{Result, TradeError};
use crate::host::memory::{Notice, WorldDrop};
use crate::trade::types::Decision;
use crate::types::{ActorId, Item, Location};
use std::fmt;
use std::time::Duration;

const DIAMOND: u32 = 264;
const IRON_INGOT: u32 = 265;
const COBBLESTONE: u32 = 4;
const TNT: u32 = 46;

/// Slack added to timer waits
const MARGIN: Duration = Duration::from_millis(200);

/// Short timers so scenarios finish quickly
pub fn quick_config() -> TradeConfig {
    TradeConfig {
        request_timeout_ms: 1_500,
        completion_delay_ms: 500,
        ..TradeConfig::default()
    }
}

/// What a scenario left behind
#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub notices: Vec<Notice>,
    pub storage: Vec<(ActorId, Vec<Item>)>,
    pub drops: Vec<WorldDrop>,
    pub cancelled_at_shutdown: usize,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario: {:?}", self.scenario)?;
        writeln!(f, "Notifications:")?;
        for notice in &self.notices {
            writeln!(f, "  {:<6} {}", notice.actor.to_string(), notice.text)?;
        }
        writeln!(f, "Storage:")?;
        for (actor, items) in &self.storage {
            let listed: Vec<String> = items.iter().map(|item| item.to_string()).collect();
            writeln!(f, "  {:<6} [{}]", actor.to_string(), listed.join(", "))?;
        }
        for drop in &self.drops {
            writeln!(f, "  dropped near {}: {}", drop.actor, drop.item)?;
        }
        write!(f, "Sessions cancelled at shutdown: {}", self.cancelled_at_shutdown)
    }
}

/// Play `scenario` on a fresh runtime
pub async fn run_scenario(scenario: Scenario, mut config: TradeConfig) -> Result<ScenarioReport> {
    if scenario == Scenario::Blacklisted {
        config.blacklist.items.push(format!("{}:0", TNT));
    }
    let completion_wait = config.completion_delay() + MARGIN;
    let expiry_wait = config.request_timeout() + MARGIN;

    let (app, event_loop) = TradeApp::new(config)?;
    let handle = tokio::spawn(event_loop.run());

    let alex = ActorId::new("alex");
    let steve = ActorId::new("steve");
    app.submit(AppCommand::Join {
        actor: alex.clone(),
        name: "Alex".to_string(),
        location: Location::new("world", 0.0, 64.0, 0.0),
    })?;
    app.submit(AppCommand::Join {
        actor: steve.clone(),
        name: "Steve".to_string(),
        location: Location::new("world", 5.0, 64.0, 0.0),
    })?;
    app.submit(AppCommand::Give {
        actor: alex.clone(),
        slot: 0,
        item: Item::new(DIAMOND, 0, 5),
    })?;
    app.submit(AppCommand::Give {
        actor: steve.clone(),
        slot: 0,
        item: Item::new(IRON_INGOT, 0, 12),
    })?;

    let open_trade = |app: &TradeApp| -> Result<()> {
        app.submit(AppCommand::Request {
            sender: alex.clone(),
            target: steve.clone(),
        })?;
        app.submit(AppCommand::Respond {
            target: steve.clone(),
            decision: Decision::Accept,
        })
    };
    let both_ready = |app: &TradeApp| -> Result<()> {
        app.submit(AppCommand::Ready { actor: alex.clone() })?;
        app.submit(AppCommand::Ready { actor: steve.clone() })
    };

    match scenario {
        Scenario::Completed => {
            open_trade(&app)?;
            app.submit(stage(&alex, 0, 0))?;
            app.submit(stage(&steve, 0, 5))?;
            both_ready(&app)?;
            tokio::time::sleep(completion_wait).await;
        }
        Scenario::Expired => {
            app.submit(AppCommand::Request {
                sender: alex.clone(),
                target: steve.clone(),
            })?;
            tokio::time::sleep(expiry_wait).await;
            // A fresh invitation is allowed right away
            app.submit(AppCommand::Request {
                sender: alex.clone(),
                target: steve.clone(),
            })?;
            app.submit(AppCommand::Respond {
                target: steve.clone(),
                decision: Decision::Reject,
            })?;
        }
        Scenario::Disconnect => {
            open_trade(&app)?;
            app.submit(stage(&alex, 0, 0))?;
            app.submit(stage(&steve, 0, 5))?;
            both_ready(&app)?;
            app.submit(AppCommand::Disconnect { actor: alex.clone() })?;
            tokio::time::sleep(completion_wait).await;
        }
        Scenario::InventoryFull => {
            app.submit(AppCommand::Fill {
                actor: steve.clone(),
                item: Item::new(COBBLESTONE, 0, 64),
            })?;
            open_trade(&app)?;
            app.submit(stage(&alex, 0, 0))?;
            both_ready(&app)?;
            tokio::time::sleep(completion_wait).await;
        }
        Scenario::Blacklisted => {
            app.submit(AppCommand::Give {
                actor: alex.clone(),
                slot: 1,
                item: Item::new(TNT, 0, 3),
            })?;
            open_trade(&app)?;
            app.submit(stage(&alex, 1, 0))?;
            app.submit(stage(&alex, 0, 1))?;
            app.submit(AppCommand::Cancel { actor: alex.clone() })?;
        }
    }
    app.flush().await?;

    app.shutdown();
    let cancelled_at_shutdown = handle
        .await
        .map_err(|e| TradeError::Internal(e.to_string()))?;

    let runtime = app.runtime();
    let runtime = runtime.lock().await;
    let storage = [alex, steve]
        .into_iter()
        .map(|actor| {
            let items: Vec<Item> = runtime
                .host
                .actor(&actor)
                .map(|a| a.storage.iter().flatten().cloned().collect())
                .unwrap_or_default();
            (actor, items)
        })
        .collect();

    Ok(ScenarioReport {
        scenario,
        notices: runtime.host.outbox().to_vec(),
        storage,
        drops: runtime.host.drops().to_vec(),
        cancelled_at_shutdown,
    })
}

fn stage(actor: &ActorId, storage_slot: usize, container_slot: usize) -> AppCommand {
    AppCommand::Stage {
        actor: actor.clone(),
        storage_slot,
        container_slot,
    }
}

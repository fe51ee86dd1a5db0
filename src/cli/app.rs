//! Barter application: the trade core on a tokio control loop

use crate::config::TradeConfig;
use crate::error::{Result, TradeError};
use crate::host::memory::InMemoryHost;
use crate::host::scheduler::{FiredTimer, TokioScheduler};
use crate::trade::manager::TradeManager;
use crate::trade::types::{Decision, TimerTask};
use crate::types::{ActorId, Item, Location, TimerHandle};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// Manager and host, always mutated together
pub struct TradeRuntime {
    pub manager: TradeManager,
    pub host: InMemoryHost<TokioScheduler>,
}

/// Actor input delivered to the control loop
#[derive(Debug)]
pub enum AppCommand {
    Join {
        actor: ActorId,
        name: String,
        location: Location,
    },
    Give {
        actor: ActorId,
        slot: usize,
        item: Item,
    },
    /// Fill every free storage slot
    Fill { actor: ActorId, item: Item },
    Request { sender: ActorId, target: ActorId },
    Respond { target: ActorId, decision: Decision },
    Stage {
        actor: ActorId,
        storage_slot: usize,
        container_slot: usize,
    },
    Unstage { actor: ActorId, container_slot: usize },
    Ready { actor: ActorId },
    Cancel { actor: ActorId },
    Close { actor: ActorId },
    Disconnect { actor: ActorId },
    Teleport { actor: ActorId, destination: Location },
    /// Answered once every earlier command has been applied
    Flush(oneshot::Sender<()>),
}

impl TradeRuntime {
    fn apply(&mut self, command: AppCommand) {
        match command {
            AppCommand::Join {
                actor,
                name,
                location,
            } => {
                self.host.add_actor(actor.clone(), &name, location);
                let permission = self.manager.config().use_permission.clone();
                self.host.grant_permission(&actor, &permission);
            }
            AppCommand::Give { actor, slot, item } => {
                if let Err(e) = self.host.put(&actor, slot, item) {
                    tracing::warn!("Cannot give item to {}: {}", actor, e);
                }
            }
            AppCommand::Fill { actor, item } => self.host.fill_storage(&actor, item),
            AppCommand::Request { sender, target } => {
                if let Err(e) = self.manager.send_request(&mut self.host, &sender, &target) {
                    tracing::info!("Request from {} to {} refused: {}", sender, target, e);
                }
            }
            AppCommand::Respond { target, decision } => match self.host.prompt_for(&target) {
                Some(response) => {
                    let resolution =
                        self.manager
                            .respond(&mut self.host, &target, response, decision);
                    tracing::debug!(recipient = %target, ?resolution, "Response applied");
                }
                None => tracing::warn!("{} has no request to answer", target),
            },
            AppCommand::Stage {
                actor,
                storage_slot,
                container_slot,
            } => match self
                .host
                .stage(&mut self.manager, &actor, storage_slot, container_slot)
            {
                Ok(verdict) => tracing::debug!(actor = %actor, ?verdict, "Stage applied"),
                Err(e) => tracing::warn!("Cannot stage for {}: {}", actor, e),
            },
            AppCommand::Unstage {
                actor,
                container_slot,
            } => match self.host.unstage(&mut self.manager, &actor, container_slot) {
                Ok(verdict) => tracing::debug!(actor = %actor, ?verdict, "Unstage applied"),
                Err(e) => tracing::warn!("Cannot unstage for {}: {}", actor, e),
            },
            AppCommand::Ready { actor } => {
                self.host.click_ready(&mut self.manager, &actor);
            }
            AppCommand::Cancel { actor } => {
                self.manager.cancel_trade(&mut self.host, &actor);
            }
            AppCommand::Close { actor } => self.host.close_container(&mut self.manager, &actor),
            AppCommand::Disconnect { actor } => self.host.disconnect(&mut self.manager, &actor),
            AppCommand::Teleport { actor, destination } => {
                self.host.teleport(&mut self.manager, &actor, destination)
            }
            AppCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn fire(&mut self, handle: TimerHandle, task: TimerTask) {
        if !self.host.scheduler_mut().acknowledge(handle) {
            tracing::debug!(%handle, "Dropping cancelled timer");
            return;
        }
        self.host.fire(&mut self.manager, task);
    }
}

/// Handle to a running trade runtime
#[derive(Clone)]
pub struct TradeApp {
    runtime: Arc<Mutex<TradeRuntime>>,
    commands: mpsc::UnboundedSender<AppCommand>,
    shutdown: CancellationToken,
}

/// The single control loop; every mutation of the runtime happens here
pub struct EventLoop {
    runtime: Arc<Mutex<TradeRuntime>>,
    commands: mpsc::UnboundedReceiver<AppCommand>,
    fired: mpsc::UnboundedReceiver<FiredTimer>,
    shutdown: CancellationToken,
}

impl TradeApp {
    /// Create the application and the loop that drives it
    pub fn new(config: TradeConfig) -> Result<(Self, EventLoop)> {
        let (scheduler, fired) = TokioScheduler::new();
        let host = InMemoryHost::new(scheduler, config.messages.clone());
        let manager = TradeManager::new(config)?;

        let runtime = Arc::new(Mutex::new(TradeRuntime { manager, host }));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let app = Self {
            runtime: runtime.clone(),
            commands: commands_tx,
            shutdown: shutdown.clone(),
        };
        let event_loop = EventLoop {
            runtime,
            commands: commands_rx,
            fired,
            shutdown,
        };
        Ok((app, event_loop))
    }

    /// Get the shared runtime
    pub fn runtime(&self) -> Arc<Mutex<TradeRuntime>> {
        self.runtime.clone()
    }

    /// Queue a command for the control loop
    pub fn submit(&self, command: AppCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TradeError::Internal("event loop stopped".to_string()))
    }

    /// Wait until every command submitted so far has been applied
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(AppCommand::Flush(done_tx))?;
        done_rx
            .await
            .map_err(|_| TradeError::Internal("event loop stopped".to_string()))
    }

    /// Ask the loop to cancel every trade and stop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl EventLoop {
    /// Run until shutdown; returns how many sessions were cancelled on the way out
    pub async fn run(mut self) -> usize {
        tracing::info!("Trade loop started");
        loop {
            tokio::select! {
                biased;

                Some(command) = self.commands.recv() => {
                    self.runtime.lock().await.apply(command);
                }

                Some((handle, task)) = self.fired.recv() => {
                    self.runtime.lock().await.fire(handle, task);
                }

                _ = self.shutdown.cancelled() => break,

                else => break,
            }
        }

        let mut runtime = self.runtime.lock().await;
        let runtime = &mut *runtime;
        let cancelled = runtime.manager.cancel_all_trades(&mut runtime.host);
        tracing::info!(cancelled, "Trade loop stopped");
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageKey;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn quick_config() -> TradeConfig {
        TradeConfig {
            request_timeout_ms: 100,
            completion_delay_ms: 20,
            ..TradeConfig::default()
        }
    }

    fn join(app: &TradeApp, id: &str, x: f64) -> ActorId {
        let actor = ActorId::new(id);
        app.submit(AppCommand::Join {
            actor: actor.clone(),
            name: id.to_string(),
            location: Location::new("world", x, 64.0, 0.0),
        })
        .unwrap();
        actor
    }

    #[tokio::test]
    async fn test_trade_completes_on_timer() {
        let (app, event_loop) = TradeApp::new(quick_config()).unwrap();
        let handle = tokio::spawn(event_loop.run());

        let alex = join(&app, "alex", 0.0);
        let steve = join(&app, "steve", 5.0);
        app.submit(AppCommand::Give {
            actor: alex.clone(),
            slot: 0,
            item: Item::new(264, 0, 4),
        })
        .unwrap();
        app.submit(AppCommand::Request {
            sender: alex.clone(),
            target: steve.clone(),
        })
        .unwrap();
        app.submit(AppCommand::Respond {
            target: steve.clone(),
            decision: Decision::Accept,
        })
        .unwrap();
        app.submit(AppCommand::Stage {
            actor: alex.clone(),
            storage_slot: 0,
            container_slot: 0,
        })
        .unwrap();
        app.submit(AppCommand::Ready { actor: alex.clone() }).unwrap();
        app.submit(AppCommand::Ready { actor: steve.clone() }).unwrap();
        assert_ok!(app.flush().await);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_ok!(app.flush().await);

        {
            let runtime = app.runtime();
            let runtime = runtime.lock().await;
            assert_eq!(runtime.host.count_items(&steve, 264), 4);
            assert!(!runtime.manager.is_in_trade(&alex));
            assert!(runtime
                .host
                .messages_for(&alex)
                .contains(&MessageKey::TradeCompleted));
        }

        app.shutdown();
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_trades() {
        let (app, event_loop) = TradeApp::new(quick_config()).unwrap();
        let handle = tokio::spawn(event_loop.run());

        let alex = join(&app, "alex", 0.0);
        let steve = join(&app, "steve", 5.0);
        app.submit(AppCommand::Give {
            actor: steve.clone(),
            slot: 3,
            item: Item::new(265, 0, 9),
        })
        .unwrap();
        app.submit(AppCommand::Request {
            sender: alex.clone(),
            target: steve.clone(),
        })
        .unwrap();
        app.submit(AppCommand::Respond {
            target: steve.clone(),
            decision: Decision::Accept,
        })
        .unwrap();
        app.submit(AppCommand::Stage {
            actor: steve.clone(),
            storage_slot: 3,
            container_slot: 5,
        })
        .unwrap();
        assert_ok!(app.flush().await);

        app.shutdown();
        assert_eq!(handle.await.unwrap(), 1);

        let runtime = app.runtime();
        let runtime = runtime.lock().await;
        assert_eq!(runtime.host.count_items(&steve, 265), 9);
        assert_eq!(runtime.manager.active_trades_count(), 0);
    }

    #[tokio::test]
    async fn test_unready_drops_completion_timer() {
        let config = TradeConfig {
            completion_delay_ms: 50,
            ..quick_config()
        };
        let (app, event_loop) = TradeApp::new(config).unwrap();
        let handle = tokio::spawn(event_loop.run());

        let alex = join(&app, "alex", 0.0);
        let steve = join(&app, "steve", 5.0);
        app.submit(AppCommand::Request {
            sender: alex.clone(),
            target: steve.clone(),
        })
        .unwrap();
        app.submit(AppCommand::Respond {
            target: steve.clone(),
            decision: Decision::Accept,
        })
        .unwrap();
        app.submit(AppCommand::Ready { actor: alex.clone() }).unwrap();
        app.submit(AppCommand::Ready { actor: steve.clone() }).unwrap();
        app.submit(AppCommand::Ready { actor: steve.clone() }).unwrap();
        assert_ok!(app.flush().await);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_ok!(app.flush().await);
        {
            let runtime = app.runtime();
            let runtime = runtime.lock().await;
            assert!(runtime.manager.is_in_trade(&alex));
        }

        app.shutdown();
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_stop_fails() {
        let (app, event_loop) = TradeApp::new(quick_config()).unwrap();
        drop(event_loop);
        assert!(app.submit(AppCommand::Cancel {
            actor: ActorId::new("alex")
        })
        .is_err());
    }
}

//! CLI module for barter

pub mod app;
pub mod commands;
pub mod scenario;

pub use app::{AppCommand, EventLoop, TradeApp, TradeRuntime};
pub use commands::{BlacklistAction, Cli, Commands, Scenario};
pub use scenario::{quick_config, run_scenario, ScenarioReport};

//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "barter")]
#[command(about = "Barter - player-to-player item trading with escrow", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted two-actor trade with real timers
    Simulate {
        /// Scenario to play
        #[arg(short, long, value_enum, default_value = "completed")]
        scenario: Scenario,

        /// Configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print or write the default configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Edit a persisted item blacklist
    Blacklist {
        /// Blacklist file
        #[arg(short, long, default_value = "blacklist.json")]
        file: PathBuf,

        #[command(subcommand)]
        action: BlacklistAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum BlacklistAction {
    /// List forbidden signatures
    List,

    /// Forbid a signature (`id` or `id:meta`)
    Add { signature: String },

    /// Allow a signature again
    Remove { signature: String },

    /// Turn enforcement on
    Enable,

    /// Turn enforcement off
    Disable,

    /// Remove every entry
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// Both sides stage, ready up and exchange
    Completed,
    /// The invitation times out
    Expired,
    /// A side disconnects during the countdown
    Disconnect,
    /// The receiver cannot hold the partner's items
    InventoryFull,
    /// A forbidden item is refused
    Blacklisted,
}

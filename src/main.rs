//! Barter CLI binary

use anyhow::Context;
use barter::blacklist::ItemBlacklist;
use barter::cli::{quick_config, run_scenario, BlacklistAction, Cli, Commands};
use barter::config::TradeConfig;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { scenario, config } => {
            let config = match config {
                Some(path) => TradeConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => quick_config(),
            };

            tracing::info!("Running scenario {:?}", scenario);
            let report = run_scenario(scenario, config).await?;
            println!("{}", report);
        }

        Commands::Config { output } => {
            let json = TradeConfig::default().to_json()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!("Wrote default configuration to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Blacklist { file, action } => {
            let mut blacklist = if file.exists() {
                ItemBlacklist::load(&file)
                    .with_context(|| format!("loading blacklist {}", file.display()))?
            } else {
                ItemBlacklist::default()
            };

            let changed = match action {
                BlacklistAction::List => {
                    println!(
                        "Blacklist ({}): {} entries",
                        if blacklist.is_enabled() { "enabled" } else { "disabled" },
                        blacklist.len()
                    );
                    for entry in blacklist.entries() {
                        println!("  {}", entry);
                    }
                    false
                }
                BlacklistAction::Add { signature } => {
                    let added = blacklist.add(&signature)?;
                    if !added {
                        tracing::info!("{} is already blacklisted", signature);
                    }
                    added
                }
                BlacklistAction::Remove { signature } => {
                    let removed = blacklist.remove(&signature)?;
                    if !removed {
                        tracing::info!("{} was not blacklisted", signature);
                    }
                    removed
                }
                BlacklistAction::Enable => {
                    blacklist.set_enabled(true);
                    true
                }
                BlacklistAction::Disable => {
                    blacklist.set_enabled(false);
                    true
                }
                BlacklistAction::Clear => {
                    blacklist.clear();
                    true
                }
            };

            if changed {
                blacklist.save(&file)?;
                tracing::info!("Saved blacklist to {}", file.display());
            }
        }
    }

    Ok(())
}

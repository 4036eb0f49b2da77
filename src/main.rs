//! hid-elements CLI
//!
//! Decodes HID unit fields, names transport status codes and drives the
//! loopback device through element queues and transactions.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use hid_elements::Config;

// CLI definitions
mod cli;
use cli::{Cli, Commands, DemoCommands, UnitCommands};

// Command handlers
mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    // Initialize logging: RUST_LOG, then --log-level, then the config file
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    debug!("Using config {:?}", config_path);

    match cli.command {
        Commands::Unit { action } => match action {
            UnitCommands::Decode { raw, json } => commands::unit::decode(raw, json),
            UnitCommands::Encode {
                system,
                length,
                mass,
                time,
                temperature,
                current,
                luminous_intensity,
                json,
            } => commands::unit::encode(
                system.into(),
                [length, mass, time, temperature, current, luminous_intensity],
                json,
            ),
        },
        Commands::Status { code } => {
            commands::status::run(code);
            Ok(())
        }
        Commands::Demo { action } => match action {
            DemoCommands::Queue { events, depth } => {
                let mut options = config.queue;
                if let Some(depth) = depth {
                    options.depth = depth;
                }
                commands::demo::queue(options, events)
            }
            DemoCommands::Transaction { timeout_ms } => {
                let mut options = config.transaction;
                if timeout_ms.is_some() {
                    options.commit_timeout_ms = timeout_ms;
                }
                commands::demo::transaction(options)
            }
        },
    }
}

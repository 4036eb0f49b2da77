// CLI definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use hid_element::UnitSystem;
use hid_elements::parse_u32;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hid-elements")]
#[command(author, version, about = "HID unit codec and element queue/transaction tools")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/hid-elements/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode or encode a HID unit field
    #[command(visible_alias = "u")]
    Unit {
        #[command(subcommand)]
        action: UnitCommands,
    },

    /// Name a raw transport status code, or list all known codes
    #[command(visible_aliases = ["st", "err"])]
    Status {
        /// Raw code (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        code: Option<u32>,
    },

    /// Exercise queues and transactions against the loopback device
    #[command(visible_alias = "d")]
    Demo {
        #[command(subcommand)]
        action: DemoCommands,
    },
}

#[derive(Subcommand)]
pub enum UnitCommands {
    /// Decode a raw unit field
    #[command(visible_alias = "dec")]
    Decode {
        /// Raw unit value (decimal or 0x hex)
        #[arg(value_parser = parse_u32)]
        raw: u32,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Build a unit field from a system and exponents
    #[command(visible_alias = "enc")]
    Encode {
        /// Measurement system
        #[arg(long, value_enum, default_value = "none")]
        system: SystemArg,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, value_parser = exponent)]
        length: i8,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, value_parser = exponent)]
        mass: i8,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, value_parser = exponent)]
        time: i8,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, value_parser = exponent)]
        temperature: i8,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, value_parser = exponent)]
        current: i8,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, value_parser = exponent)]
        luminous_intensity: i8,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum DemoCommands {
    /// Stream injected input values through an element queue
    #[command(visible_alias = "q")]
    Queue {
        /// Number of values to inject
        #[arg(short, long, default_value_t = 8)]
        events: u32,
        /// Override the configured queue depth
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Commit LED and feature values through transactions
    #[command(visible_alias = "tx")]
    Transaction {
        /// Override the configured commit timeout (ms)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

/// Measurement system names accepted on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SystemArg {
    None,
    SiLinear,
    SiRotation,
    EnglishLinear,
    EnglishRotation,
}

impl From<SystemArg> for UnitSystem {
    fn from(arg: SystemArg) -> Self {
        match arg {
            SystemArg::None => UnitSystem::None,
            SystemArg::SiLinear => UnitSystem::SiLinear,
            SystemArg::SiRotation => UnitSystem::SiRotation,
            SystemArg::EnglishLinear => UnitSystem::EnglishLinear,
            SystemArg::EnglishRotation => UnitSystem::EnglishRotation,
        }
    }
}

/// Exponent that fits a signed nibble
fn exponent(s: &str) -> Result<i8, String> {
    let value: i8 = s.parse().map_err(|e| format!("invalid exponent '{s}': {e}"))?;
    if (-8..=7).contains(&value) {
        Ok(value)
    } else {
        Err(format!("exponent {value} out of range (-8..=7)"))
    }
}

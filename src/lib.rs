// hid-elements - shared library for the CLI
// Persistent configuration and number parsing helpers

pub mod config;

pub use config::Config;

/// Parse an unsigned number given in decimal or with a `0x` prefix
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim().replace('_', "");
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

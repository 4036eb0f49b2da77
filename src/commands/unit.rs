//! Unit field command handlers.

use anyhow::Result;
use hid_element::{Dimension, UnitDescriptor, UnitSystem};
use serde_json::json;

/// Decode a raw unit field and print it
pub fn decode(raw: u32, as_json: bool) -> Result<()> {
    print_descriptor(UnitDescriptor::decode(raw), as_json)
}

/// Build a unit field from `system` and exponents in nibble order
pub fn encode(system: UnitSystem, exponents: [i8; 6], as_json: bool) -> Result<()> {
    let descriptor = Dimension::ALL
        .iter()
        .zip(exponents)
        .fold(UnitDescriptor::new(system), |d, (&dim, exp)| {
            d.with_exponent(dim, exp)
        });
    print_descriptor(descriptor, as_json)
}

fn print_descriptor(descriptor: UnitDescriptor, as_json: bool) -> Result<()> {
    let raw = descriptor.encode();
    if as_json {
        let value = json!({
            "raw": format!("0x{raw:08X}"),
            "descriptor": descriptor,
            "text": descriptor.format(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Raw:    0x{raw:08X}");
    println!(
        "System: {} ({})",
        descriptor.system().display_name(),
        descriptor.system().raw()
    );
    for dim in Dimension::ALL {
        let exp = descriptor.exponent(dim);
        if exp != 0 {
            println!(
                "  {:<12} {:>2}  ({})",
                dim.generic_name(),
                exp,
                dim.unit_name(descriptor.system())
            );
        }
    }
    if descriptor.reserved() != 0 {
        println!("Reserved nibble: 0x{:X}", descriptor.reserved());
    }
    println!("Unit:   {}", descriptor.format());
    Ok(())
}

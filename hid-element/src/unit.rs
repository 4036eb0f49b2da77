//! Physical unit codec
//!
//! A HID unit field packs a measurement system and six signed dimension
//! exponents into one 32-bit value, one nibble each:
//!
//! ```text
//! bit  31..28   27..24     23..20   19..16       15..12  11..8  7..4    3..0
//!      reserved luminous   current  temperature  time    mass   length  system
//! ```
//!
//! Exponent nibbles are two's complement (`0x8..=0xF` is `-8..=-1`). Every
//! 32-bit value decodes, and [`UnitDescriptor::encode`] restores it exactly.

use std::fmt;

use serde::Serialize;

/// Separator between dimension terms in formatted units
const TERM_SEPARATOR: &str = "×";

/// Unit names per system, columns in dimension order
const UNIT_NAMES: [[&str; 6]; 4] = [
    ["centimeter", "gram", "second", "kelvin", "ampere", "candela"],
    ["radian", "gram", "second", "kelvin", "ampere", "candela"],
    ["inch", "slug", "second", "fahrenheit", "ampere", "candela"],
    ["degree", "slug", "second", "fahrenheit", "ampere", "candela"],
];

/// Measurement system (nibble 0 of the unit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum UnitSystem {
    /// No system; dimensions render by their generic names
    #[default]
    None,
    SiLinear,
    SiRotation,
    EnglishLinear,
    EnglishRotation,
    /// Reserved or vendor-defined system code (5..=15), formatted as `None`
    ///
    /// Build it with [`UnitSystem::other`] or [`UnitSystem::from_raw`]. A
    /// literal holding a known code is normalized wherever it is used.
    Other(u8),
}

impl UnitSystem {
    /// Map a system nibble. Only the low four bits are considered.
    pub const fn from_raw(raw: u8) -> Self {
        match raw & 0x0F {
            0 => UnitSystem::None,
            1 => UnitSystem::SiLinear,
            2 => UnitSystem::SiRotation,
            3 => UnitSystem::EnglishLinear,
            4 => UnitSystem::EnglishRotation,
            other => UnitSystem::Other(other),
        }
    }

    /// Reserved system code, or `None` unless `code` is in `5..=15`
    pub const fn other(code: u8) -> Option<Self> {
        match code {
            5..=15 => Some(UnitSystem::Other(code)),
            _ => None,
        }
    }

    /// Canonical variant for this system's nibble, so `Other(1)` becomes
    /// `SiLinear` and `Other(0x15)` becomes `SiLinear` too
    pub const fn normalized(self) -> Self {
        Self::from_raw(self.raw())
    }

    /// System nibble
    pub const fn raw(self) -> u8 {
        match self {
            UnitSystem::None => 0,
            UnitSystem::SiLinear => 1,
            UnitSystem::SiRotation => 2,
            UnitSystem::EnglishLinear => 3,
            UnitSystem::EnglishRotation => 4,
            UnitSystem::Other(raw) => raw & 0x0F,
        }
    }

    /// Display name
    pub fn display_name(&self) -> &'static str {
        match self.normalized() {
            UnitSystem::None | UnitSystem::Other(_) => "none",
            UnitSystem::SiLinear => "SI linear",
            UnitSystem::SiRotation => "SI rotation",
            UnitSystem::EnglishLinear => "English linear",
            UnitSystem::EnglishRotation => "English rotation",
        }
    }
}

/// One of the six physical dimensions tracked by a unit field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimension {
    Length,
    Mass,
    Time,
    Temperature,
    Current,
    LuminousIntensity,
}

impl Dimension {
    /// All dimensions in nibble order (nibbles 1..=6)
    pub const ALL: [Dimension; 6] = [
        Dimension::Length,
        Dimension::Mass,
        Dimension::Time,
        Dimension::Temperature,
        Dimension::Current,
        Dimension::LuminousIntensity,
    ];

    /// Nibble index of this dimension within the unit field
    pub const fn nibble(self) -> u32 {
        match self {
            Dimension::Length => 1,
            Dimension::Mass => 2,
            Dimension::Time => 3,
            Dimension::Temperature => 4,
            Dimension::Current => 5,
            Dimension::LuminousIntensity => 6,
        }
    }

    /// Unit name for this dimension under `system`
    pub fn unit_name(self, system: UnitSystem) -> &'static str {
        let row = match system.normalized() {
            UnitSystem::SiLinear => 0,
            UnitSystem::SiRotation => 1,
            UnitSystem::EnglishLinear => 2,
            UnitSystem::EnglishRotation => 3,
            UnitSystem::None | UnitSystem::Other(_) => return self.generic_name(),
        };
        UNIT_NAMES[row][self.nibble() as usize - 1]
    }

    /// Name used when no measurement system applies
    pub fn generic_name(self) -> &'static str {
        match self {
            Dimension::Length => "length",
            Dimension::Mass => "mass",
            Dimension::Time => "time",
            Dimension::Temperature => "temperature",
            Dimension::Current => "current",
            Dimension::LuminousIntensity => "luminosity",
        }
    }
}

#[inline]
const fn nibble_at(raw: u32, index: u32) -> u8 {
    ((raw >> (index * 4)) & 0x0F) as u8
}

/// Decode a two's complement nibble into `-8..=7`
#[inline]
const fn nibble_to_exponent(nibble: u8) -> i8 {
    ((nibble << 4) as i8) >> 4
}

/// Encode an exponent into its two's complement nibble
#[inline]
const fn exponent_to_nibble(exponent: i8) -> u8 {
    (exponent as u8) & 0x0F
}

/// Reduce an exponent into `-8..=7` the way the wire encoding does
#[inline]
const fn wrap_exponent(exponent: i8) -> i8 {
    nibble_to_exponent(exponent_to_nibble(exponent))
}

/// Decoded HID unit field
///
/// Exponents are always within `-8..=7` and the system is always in its
/// normalized form, so `decode(encode(d)) == d` for every descriptor. Builder
/// setters wrap out of range values the same way the wire encoding would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct UnitDescriptor {
    system: UnitSystem,
    length: i8,
    mass: i8,
    time: i8,
    temperature: i8,
    current: i8,
    luminous_intensity: i8,
    /// Nibble 7, reserved by HID and kept verbatim
    reserved: u8,
}

impl UnitDescriptor {
    /// Dimensionless descriptor in `system`
    pub const fn new(system: UnitSystem) -> Self {
        Self {
            system: system.normalized(),
            length: 0,
            mass: 0,
            time: 0,
            temperature: 0,
            current: 0,
            luminous_intensity: 0,
            reserved: 0,
        }
    }

    /// Decode a raw unit field
    pub const fn decode(raw: u32) -> Self {
        Self {
            system: UnitSystem::from_raw(nibble_at(raw, 0)),
            length: nibble_to_exponent(nibble_at(raw, 1)),
            mass: nibble_to_exponent(nibble_at(raw, 2)),
            time: nibble_to_exponent(nibble_at(raw, 3)),
            temperature: nibble_to_exponent(nibble_at(raw, 4)),
            current: nibble_to_exponent(nibble_at(raw, 5)),
            luminous_intensity: nibble_to_exponent(nibble_at(raw, 6)),
            reserved: nibble_at(raw, 7),
        }
    }

    /// Encode back into a raw unit field
    pub const fn encode(self) -> u32 {
        (self.system.raw() as u32 & 0x0F)
            | (exponent_to_nibble(self.length) as u32) << 4
            | (exponent_to_nibble(self.mass) as u32) << 8
            | (exponent_to_nibble(self.time) as u32) << 12
            | (exponent_to_nibble(self.temperature) as u32) << 16
            | (exponent_to_nibble(self.current) as u32) << 20
            | (exponent_to_nibble(self.luminous_intensity) as u32) << 24
            | ((self.reserved & 0x0F) as u32) << 28
    }

    pub const fn system(&self) -> UnitSystem {
        self.system
    }

    /// Reserved nibble 7
    pub const fn reserved(&self) -> u8 {
        self.reserved
    }

    /// Copy with the measurement system replaced
    pub const fn with_system(mut self, system: UnitSystem) -> Self {
        self.system = system.normalized();
        self
    }

    /// Copy with the reserved nibble replaced. Only the low four bits count.
    pub const fn with_reserved(mut self, nibble: u8) -> Self {
        self.reserved = nibble & 0x0F;
        self
    }

    /// Exponent of one dimension
    pub fn exponent(&self, dimension: Dimension) -> i8 {
        match dimension {
            Dimension::Length => self.length,
            Dimension::Mass => self.mass,
            Dimension::Time => self.time,
            Dimension::Temperature => self.temperature,
            Dimension::Current => self.current,
            Dimension::LuminousIntensity => self.luminous_intensity,
        }
    }

    /// Copy with one dimension's exponent replaced
    pub fn with_exponent(mut self, dimension: Dimension, exponent: i8) -> Self {
        let exponent = wrap_exponent(exponent);
        match dimension {
            Dimension::Length => self.length = exponent,
            Dimension::Mass => self.mass = exponent,
            Dimension::Time => self.time = exponent,
            Dimension::Temperature => self.temperature = exponent,
            Dimension::Current => self.current = exponent,
            Dimension::LuminousIntensity => self.luminous_intensity = exponent,
        }
        self
    }

    pub fn with_length(self, exponent: i8) -> Self {
        self.with_exponent(Dimension::Length, exponent)
    }

    pub fn with_mass(self, exponent: i8) -> Self {
        self.with_exponent(Dimension::Mass, exponent)
    }

    pub fn with_time(self, exponent: i8) -> Self {
        self.with_exponent(Dimension::Time, exponent)
    }

    pub fn with_temperature(self, exponent: i8) -> Self {
        self.with_exponent(Dimension::Temperature, exponent)
    }

    pub fn with_current(self, exponent: i8) -> Self {
        self.with_exponent(Dimension::Current, exponent)
    }

    pub fn with_luminous_intensity(self, exponent: i8) -> Self {
        self.with_exponent(Dimension::LuminousIntensity, exponent)
    }

    /// True when every exponent is zero
    pub fn is_dimensionless(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.exponent(*d) == 0)
    }

    /// Render as display text, e.g. `centimeter×gram/(second^2)`
    pub fn format(&self) -> String {
        let mut numerator = Vec::new();
        let mut denominator = Vec::new();

        for dimension in Dimension::ALL {
            let exponent = self.exponent(dimension);
            if exponent == 0 {
                continue;
            }
            let term = render_term(dimension.unit_name(self.system), exponent.unsigned_abs());
            if exponent > 0 {
                numerator.push(term);
            } else {
                denominator.push(term);
            }
        }

        let mut text = if numerator.is_empty() {
            String::from("1")
        } else {
            numerator.join(TERM_SEPARATOR)
        };

        if !denominator.is_empty() {
            text.push_str("/(");
            text.push_str(&denominator.join(TERM_SEPARATOR));
            text.push(')');
        }

        text
    }
}

fn render_term(name: &str, magnitude: u8) -> String {
    if magnitude == 1 {
        name.to_string()
    } else {
        format!("{name}^{magnitude}")
    }
}

impl From<u32> for UnitDescriptor {
    fn from(raw: u32) -> Self {
        UnitDescriptor::decode(raw)
    }
}

impl From<UnitDescriptor> for u32 {
    fn from(unit: UnitDescriptor) -> Self {
        unit.encode()
    }
}

impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_decoding() {
        assert_eq!(nibble_to_exponent(0x0), 0);
        assert_eq!(nibble_to_exponent(0x7), 7);
        assert_eq!(nibble_to_exponent(0x8), -8);
        assert_eq!(nibble_to_exponent(0xF), -1);
        assert_eq!(exponent_to_nibble(-1), 0xF);
        assert_eq!(exponent_to_nibble(-8), 0x8);
        assert_eq!(exponent_to_nibble(7), 0x7);
    }

    #[test]
    fn test_decode_fields() {
        // SI linear, cm * g * s^-2 (force, dyne)
        let unit = UnitDescriptor::decode(0x0000_E111);
        assert_eq!(unit.system(), UnitSystem::SiLinear);
        assert_eq!(unit.exponent(Dimension::Length), 1);
        assert_eq!(unit.exponent(Dimension::Mass), 1);
        assert_eq!(unit.exponent(Dimension::Time), -2);
        assert_eq!(unit.exponent(Dimension::Temperature), 0);
        assert_eq!(unit.format(), "centimeter×gram/(second^2)");
    }

    #[test]
    fn test_roundtrip_nibble_patterns() {
        // Every value of every nibble position, with the others held at a
        // mix of patterns.
        for position in 0..8u32 {
            for nibble in 0..16u32 {
                for background in [0u32, 0xFFFF_FFFF, 0x8765_4321, 0x1234_5678] {
                    let mask = 0xF << (position * 4);
                    let raw = (background & !mask) | (nibble << (position * 4));
                    assert_eq!(UnitDescriptor::decode(raw).encode(), raw, "raw 0x{raw:08X}");
                }
            }
        }
    }

    #[test]
    fn test_roundtrip_sweep() {
        let mut raw = 0u32;
        loop {
            assert_eq!(UnitDescriptor::decode(raw).encode(), raw, "raw 0x{raw:08X}");
            match raw.checked_add(0x0001_0F0B) {
                Some(next) => raw = next,
                None => break,
            }
        }
        assert_eq!(UnitDescriptor::decode(u32::MAX).encode(), u32::MAX);
    }

    #[test]
    fn test_exponent_range() {
        for raw in [0u32, u32::MAX, 0x8888_8888, 0x7777_7777, 0xF0F0_F0F0] {
            let unit = UnitDescriptor::decode(raw);
            for dimension in Dimension::ALL {
                assert!((-8..=7).contains(&unit.exponent(dimension)));
            }
        }
    }

    #[test]
    fn test_unknown_system_formats_as_none() {
        let unit = UnitDescriptor::decode(0x0000_0019);
        assert_eq!(unit.system(), UnitSystem::Other(9));
        assert_eq!(unit.format(), "length");
        assert_eq!(unit.encode(), 0x0000_0019);
    }

    #[test]
    fn test_format_scenarios() {
        assert_eq!(UnitDescriptor::decode(0x0000_0001).format(), "1");

        let cm = UnitDescriptor::new(UnitSystem::SiLinear).with_length(1);
        assert_eq!(cm.format(), "centimeter");

        let velocity = cm.with_time(-1);
        assert_eq!(velocity.format(), "centimeter/(second)");

        let area = UnitDescriptor::new(UnitSystem::EnglishRotation).with_length(2);
        assert_eq!(area.format(), "degree^2");
    }

    #[test]
    fn test_format_only_negative() {
        let hertz = UnitDescriptor::new(UnitSystem::SiLinear).with_time(-1);
        assert_eq!(hertz.format(), "1/(second)");

        let odd = UnitDescriptor::new(UnitSystem::EnglishLinear)
            .with_time(-2)
            .with_current(-1);
        assert_eq!(odd.format(), "1/(second^2×ampere)");
    }

    #[test]
    fn test_format_generic_names() {
        let unit = UnitDescriptor::new(UnitSystem::None)
            .with_temperature(3)
            .with_luminous_intensity(-8);
        assert_eq!(unit.format(), "temperature^3/(luminosity^8)");
        assert_eq!(UnitDescriptor::default().format(), "1");
    }

    #[test]
    fn test_format_all_systems() {
        let unit = |system| {
            UnitDescriptor::new(system)
                .with_length(1)
                .with_mass(1)
                .with_time(1)
                .with_temperature(1)
                .with_current(1)
                .with_luminous_intensity(1)
                .format()
        };
        assert_eq!(
            unit(UnitSystem::SiRotation),
            "radian×gram×second×kelvin×ampere×candela"
        );
        assert_eq!(
            unit(UnitSystem::EnglishLinear),
            "inch×slug×second×fahrenheit×ampere×candela"
        );
        assert_eq!(
            unit(UnitSystem::EnglishRotation),
            "degree×slug×second×fahrenheit×ampere×candela"
        );
    }

    #[test]
    fn test_builder_wraps_out_of_range() {
        let unit = UnitDescriptor::new(UnitSystem::SiLinear).with_length(9);
        assert_eq!(unit.exponent(Dimension::Length), -7);
        assert_eq!(UnitDescriptor::decode(unit.encode()), unit);

        let unit = UnitDescriptor::new(UnitSystem::SiLinear)
            .with_length(20)
            .with_reserved(0x1F);
        assert_eq!(unit.exponent(Dimension::Length), 4);
        assert_eq!(unit.reserved(), 0xF);
        assert_eq!(UnitDescriptor::decode(unit.encode()), unit);
    }

    #[test]
    fn test_other_system_is_normalized() {
        assert_eq!(UnitSystem::other(9), Some(UnitSystem::Other(9)));
        assert_eq!(UnitSystem::other(1), None);
        assert_eq!(UnitSystem::other(0x15), None);

        let literal = UnitDescriptor::new(UnitSystem::Other(1)).with_length(1);
        let si = UnitDescriptor::new(UnitSystem::SiLinear).with_length(1);
        assert_eq!(literal, si);
        assert_eq!(literal.format(), "centimeter");
        assert_eq!(literal.encode(), si.encode());

        let masked = UnitDescriptor::default().with_system(UnitSystem::Other(0x15));
        assert_eq!(masked.system(), UnitSystem::SiLinear);
        assert_eq!(UnitDescriptor::decode(masked.encode()), masked);

        assert_eq!(UnitSystem::Other(2).display_name(), "SI rotation");
        assert_eq!(Dimension::Mass.unit_name(UnitSystem::Other(3)), "slug");
    }

    #[test]
    fn test_display_matches_format() {
        let unit = UnitDescriptor::decode(0x00F0_D121);
        assert_eq!(unit.to_string(), unit.format());
        assert_eq!(unit.format(), unit.format());
    }
}

//! Common types for the element layer

use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::unit::UnitDescriptor;

/// Opaque device identity, unique per device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId(pub u64);

/// Per-device element identifier assigned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementCookie(pub u32);

/// Element type as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementKind {
    InputMisc,
    InputButton,
    InputAxis,
    InputScanCodes,
    Output,
    Feature,
    Collection,
    /// Transport-specific type code with no named variant
    Other(u32),
}

impl ElementKind {
    /// Map a raw element type code (IOHIDElementType numbering)
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ElementKind::InputMisc,
            2 => ElementKind::InputButton,
            3 => ElementKind::InputAxis,
            4 => ElementKind::InputScanCodes,
            129 => ElementKind::Output,
            257 => ElementKind::Feature,
            513 => ElementKind::Collection,
            other => ElementKind::Other(other),
        }
    }

    /// Raw element type code
    pub const fn raw(self) -> u32 {
        match self {
            ElementKind::InputMisc => 1,
            ElementKind::InputButton => 2,
            ElementKind::InputAxis => 3,
            ElementKind::InputScanCodes => 4,
            ElementKind::Output => 129,
            ElementKind::Feature => 257,
            ElementKind::Collection => 513,
            ElementKind::Other(raw) => raw,
        }
    }

    /// Whether values of this element arrive in input reports
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Self::InputMisc | Self::InputButton | Self::InputAxis | Self::InputScanCodes
        )
    }
}

/// Handle to one value slot on a device
///
/// Equality and hashing use identity only (device + cookie); the descriptive
/// fields are carried along for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct Element {
    /// Owning device
    pub device: DeviceId,
    /// Transport-assigned identifier
    pub cookie: ElementCookie,
    /// Element type
    pub kind: ElementKind,
    /// HID usage page
    pub usage_page: u16,
    /// HID usage
    pub usage: u16,
    /// Report this element lives in
    pub report_id: u8,
    /// Raw unit field from the report descriptor
    pub unit: u32,
}

impl Element {
    /// Create an element handle with no unit
    pub fn new(
        device: DeviceId,
        cookie: u32,
        kind: ElementKind,
        usage_page: u16,
        usage: u16,
    ) -> Self {
        Self {
            device,
            cookie: ElementCookie(cookie),
            kind,
            usage_page,
            usage,
            report_id: 0,
            unit: 0,
        }
    }

    /// Set the report ID
    pub fn with_report_id(mut self, report_id: u8) -> Self {
        self.report_id = report_id;
        self
    }

    /// Set the raw unit field
    pub fn with_unit(mut self, unit: u32) -> Self {
        self.unit = unit;
        self
    }

    /// Decoded physical unit
    pub fn unit(&self) -> UnitDescriptor {
        UnitDescriptor::decode(self.unit)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.device == other.device && self.cookie == other.cookie
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device.hash(state);
        self.cookie.hash(state);
    }
}

/// Value payload; its interpretation belongs to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValuePayload {
    /// Logical integer value
    Integer(i64),
    /// Raw report bytes for elements wider than an integer
    Bytes(Vec<u8>),
}

/// Value of one element at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementValue {
    /// Element the value belongs to
    pub element: Element,
    /// Payload
    pub payload: ValuePayload,
    /// Transport timestamp (time since the device session started)
    pub timestamp: Duration,
}

impl ElementValue {
    /// Integer value stamped with `timestamp`
    pub fn integer(element: &Element, value: i64, timestamp: Duration) -> Self {
        Self {
            element: element.clone(),
            payload: ValuePayload::Integer(value),
            timestamp,
        }
    }

    /// Byte value stamped with `timestamp`
    pub fn bytes(element: &Element, data: impl Into<Vec<u8>>, timestamp: Duration) -> Self {
        Self {
            element: element.clone(),
            payload: ValuePayload::Bytes(data.into()),
            timestamp,
        }
    }

    /// Integer payload, if this is an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            ValuePayload::Integer(v) => Some(v),
            ValuePayload::Bytes(_) => None,
        }
    }

    /// Byte payload, if this is a byte value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            ValuePayload::Bytes(data) => Some(data),
            ValuePayload::Integer(_) => None,
        }
    }
}

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Values are fetched from the device on commit
    #[default]
    Input,
    /// Staged values are sent to the device on commit
    Output,
}

/// Which per-element slot of a transaction a value operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueSlot {
    /// Value staged for the next commit
    #[default]
    Pending,
    /// Fallback value, preserved across commits
    Default,
}

/// Device property value returned by `Device::property`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Property {
    Number(i64),
    Text(String),
}

impl Property {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Property::Number(n) => Some(*n),
            Property::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Property::Text(s) => Some(s),
            Property::Number(_) => None,
        }
    }
}

/// Well-known property keys
pub mod property_key {
    pub const VENDOR_ID: &str = "VendorID";
    pub const PRODUCT_ID: &str = "ProductID";
    pub const PRODUCT: &str = "Product";
    pub const MANUFACTURER: &str = "Manufacturer";
    pub const SERIAL_NUMBER: &str = "SerialNumber";
    pub const MAX_INPUT_REPORT_SIZE: &str = "MaxInputReportSize";
}

/// Queue creation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Requested depth, forwarded to the transport
    pub depth: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self { depth: 16 }
    }
}

impl QueueOptions {
    pub fn with_depth(depth: usize) -> Self {
        Self { depth }
    }
}

/// Transaction creation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// Timeout used by `commit_with_callback` callers that do not pass one
    pub commit_timeout_ms: Option<u64>,
}

impl TransactionOptions {
    /// Configured commit timeout, if any
    pub fn commit_timeout(&self) -> Option<Duration> {
        self.commit_timeout_ms.map(Duration::from_millis)
    }
}

//! HID element layer
//!
//! Two self-contained pieces of a HID binding:
//!
//! - a unit codec that decodes the packed 32-bit unit field of a report
//!   descriptor into dimension exponents and renders it as text
//! - batched element value exchange: [`ElementQueue`] buffers incoming
//!   values, [`ElementTransaction`] stages values and commits them as a unit
//!
//! Hardware access stays with the hosting transport, which implements
//! [`Device`] and [`QueueBackend`]. [`LoopbackDevice`] is an in-process
//! implementation for tests and demos.
//!
//! ```text
//! [ElementQueue / ElementTransaction]   <- owned by one caller context
//!                |
//!            [Device]                    <- transport collaborator
//!                |
//!          [EventSource]                 <- callbacks and timers
//! ```

pub mod device;
pub mod error;
pub mod loopback;
pub mod queue;
pub mod registry;
pub mod run_loop;
pub mod status;
pub mod transaction;
pub mod types;
pub mod unit;

pub use device::{CommitRequest, Completion, Device, EnqueueHook, QueueBackend};
pub use error::HidError;
pub use loopback::{demo_cookie, LoopbackDevice, LoopbackQueue};
pub use queue::{AvailableCallback, ElementQueue};
pub use registry::{RegistrationId, Registry};
pub use run_loop::{EventSource, RunLoop, Task};
pub use status::Status;
pub use transaction::{CommitCallback, ElementTransaction, DEFAULT_COMMIT_TIMEOUT};
pub use types::{
    property_key, DeviceId, Direction, Element, ElementCookie, ElementKind, ElementValue,
    Property, QueueOptions, TransactionOptions, ValuePayload, ValueSlot,
};
pub use unit::{Dimension, UnitDescriptor, UnitSystem};

/// Type alias for a shared device handle
pub type SharedDevice = std::sync::Arc<dyn Device>;

//! Device collaborator traits
//!
//! The element layer does not talk to hardware itself. A transport backend
//! implements [`Device`] (device-level operations and value exchange) and
//! hands out [`QueueBackend`] resources that do the actual buffering.
//!
//! ```text
//! [ElementQueue]        [ElementTransaction]
//!       |                        |
//! [QueueBackend] <-- [Device] ---+      <- implemented by the transport
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::run_loop::EventSource;
use crate::status::Status;
use crate::types::{DeviceId, Direction, Element, ElementValue, Property};

/// Notification from a queue backend that a value was enqueued
pub type EnqueueHook = Box<dyn Fn() + Send + Sync>;

/// Completion for an asynchronous commit. May be called from any thread.
pub type Completion = Box<dyn FnOnce(Result<Vec<ElementValue>, Status>) + Send>;

/// One batch exchanged with the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRequest {
    /// Values to send, at most one per element
    Output(Vec<ElementValue>),
    /// Elements whose current values should be fetched
    Input(Vec<Element>),
}

impl CommitRequest {
    /// Number of elements in the batch
    pub fn len(&self) -> usize {
        match self {
            CommitRequest::Output(values) => values.len(),
            CommitRequest::Input(elements) => elements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direction this batch travels in
    pub fn direction(&self) -> Direction {
        match self {
            CommitRequest::Output(_) => Direction::Output,
            CommitRequest::Input(_) => Direction::Input,
        }
    }
}

/// Device handle provided by the hosting transport
pub trait Device: Send + Sync {
    /// Identity of this device session
    fn id(&self) -> DeviceId;

    /// Open the device for I/O
    fn open(&self) -> Result<(), Status>;

    /// Close the device
    fn close(&self) -> Result<(), Status>;

    /// Elements exposed by the device
    fn elements(&self) -> Result<Vec<Element>, Status>;

    /// Look up a device property
    fn property(&self, key: &str) -> Option<Property>;

    /// Schedule device-level callbacks on `source`
    fn schedule_with_event_source(&self, source: Arc<dyn EventSource>);

    /// Allocate a transport queue of `depth` entries
    fn create_queue(&self, depth: usize) -> Result<Arc<dyn QueueBackend>, Status>;

    /// Check that a transaction in `direction` can be created
    fn prepare_transaction(&self, direction: Direction) -> Result<(), Status>;

    /// Exchange one batch synchronously
    ///
    /// Output batches return an empty vector; input batches return the
    /// fetched values.
    fn commit(&self, request: CommitRequest) -> Result<Vec<ElementValue>, Status>;

    /// Start exchanging one batch; `completion` receives the outcome
    ///
    /// The transport may report `Status::Timeout` itself once `timeout`
    /// elapses, or complete later than that.
    fn commit_async(&self, request: CommitRequest, timeout: Duration, completion: Completion);
}

/// Transport-side queue resource
///
/// The backend owns the buffered values. `try_pop` and `pop_timeout` consume
/// in arrival order.
pub trait QueueBackend: Send + Sync {
    /// Change the requested depth for values buffered from now on
    fn set_depth(&self, depth: usize);

    /// Subscribe an element
    fn add_element(&self, element: &Element);

    /// Unsubscribe an element
    fn remove_element(&self, element: &Element);

    /// Begin delivering values
    fn start(&self);

    /// Stop delivering values
    fn stop(&self);

    /// Pop the head value without blocking
    fn try_pop(&self) -> Option<ElementValue>;

    /// Pop the head value, waiting up to `timeout` for one to arrive
    fn pop_timeout(&self, timeout: Duration) -> Option<ElementValue>;

    /// Whether nothing is buffered
    fn is_empty(&self) -> bool;

    /// Install or clear the hook called after each enqueue
    ///
    /// Implementations must not hold internal locks while calling it.
    fn set_enqueue_hook(&self, hook: Option<EnqueueHook>);

    /// Release transport resources; the backend is not used afterwards
    fn release(&self);
}

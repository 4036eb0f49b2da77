//! Element queues
//!
//! An [`ElementQueue`] subscribes to a set of elements on one device and
//! hands out their values in arrival order. Buffering is done by the
//! transport's [`QueueBackend`]; the queue itself only tracks depth, running
//! state, membership and the availability callback.
//!
//! The availability callback is edge-triggered: it fires once when the
//! backend goes from empty to non-empty, however many values arrive before
//! the consumer drains it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::{Device, QueueBackend};
use crate::error::HidError;
use crate::run_loop::EventSource;
use crate::types::{Element, ElementValue, QueueOptions};

/// Callback fired when a queue transitions from empty to non-empty
pub type AvailableCallback = Arc<dyn Fn(&ElementQueue) + Send + Sync>;

/// Queue of incoming element values for one device
///
/// Cloning yields another handle to the same queue; handles compare equal
/// iff they share the transport resource. The resource is stopped and
/// released when the last handle is dropped.
#[derive(Clone)]
pub struct ElementQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    device: Arc<dyn Device>,
    backend: Arc<dyn QueueBackend>,
    state: Mutex<QueueState>,
}

struct QueueState {
    depth: usize,
    running: bool,
    elements: HashSet<Element>,
    callback: Option<AvailableCallback>,
    event_source: Option<Arc<dyn EventSource>>,
    /// Backend was empty at the last enqueue notification or dequeue
    was_empty: bool,
}

impl ElementQueue {
    /// Create a queue on `device`
    ///
    /// Fails with the transport's status if it cannot allocate the queue.
    pub fn create(device: Arc<dyn Device>, options: QueueOptions) -> Result<Self, HidError> {
        let backend = device.create_queue(options.depth)?;
        let inner = Arc::new(QueueInner {
            device,
            backend,
            state: Mutex::new(QueueState {
                depth: options.depth,
                running: false,
                elements: HashSet::new(),
                callback: None,
                event_source: None,
                was_empty: true,
            }),
        });

        let weak = Arc::downgrade(&inner);
        inner.backend.set_enqueue_hook(Some(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_enqueue();
            }
        })));

        debug!(
            "Created element queue on device {:?} (depth {})",
            inner.device.id(),
            options.depth
        );
        Ok(Self { inner })
    }

    /// Device this queue is bound to
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.inner.device
    }

    /// Requested depth
    pub fn depth(&self) -> usize {
        self.inner.state.lock().depth
    }

    /// Change the requested depth; applies to values buffered from now on
    pub fn set_depth(&self, depth: usize) {
        self.inner.state.lock().depth = depth;
        self.inner.backend.set_depth(depth);
    }

    /// Subscribe `element`. No-op if already subscribed.
    pub fn add_element(&self, element: &Element) {
        let mut state = self.inner.state.lock();
        if state.elements.insert(element.clone()) {
            self.inner.backend.add_element(element);
        }
    }

    /// Unsubscribe `element`. No-op if not subscribed.
    pub fn remove_element(&self, element: &Element) {
        let mut state = self.inner.state.lock();
        if state.elements.remove(element) {
            self.inner.backend.remove_element(element);
        }
    }

    pub fn contains_element(&self, element: &Element) -> bool {
        self.inner.state.lock().elements.contains(element)
    }

    /// Subscribed elements, in no particular order
    pub fn elements(&self) -> Vec<Element> {
        self.inner.state.lock().elements.iter().cloned().collect()
    }

    /// Start delivery. Idempotent.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if !state.running {
            self.inner.backend.start();
            state.running = true;
            debug!("Queue started with {} element(s)", state.elements.len());
        }
    }

    /// Stop delivery. Idempotent. Already buffered values stay available.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            self.inner.backend.stop();
            state.running = false;
            debug!("Queue stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Take the head value if one is buffered. Never blocks.
    pub fn copy_next_value(&self) -> Option<ElementValue> {
        let mut state = self.inner.state.lock();
        let value = self.inner.backend.try_pop();
        self.inner.note_dequeue(&mut state);
        value
    }

    /// Take the head value, blocking the caller up to `timeout` for one
    ///
    /// `None` means the timeout elapsed, which is a normal outcome.
    pub fn copy_next_value_timeout(&self, timeout: Duration) -> Option<ElementValue> {
        if let Some(value) = self.copy_next_value() {
            return Some(value);
        }
        // Blocking must not hold the state lock, the enqueue hook needs it
        let value = self.inner.backend.pop_timeout(timeout);
        self.inner.note_dequeue(&mut self.inner.state.lock());
        value
    }

    /// Register the availability callback, replacing any previous one
    ///
    /// The callback only fires once the queue is scheduled with
    /// [`ElementQueue::schedule`]; it runs on that event source.
    pub fn register_available_callback<F>(&self, callback: F)
    where
        F: Fn(&ElementQueue) + Send + Sync + 'static,
    {
        self.inner.state.lock().callback = Some(Arc::new(callback));
    }

    pub fn unregister_available_callback(&self) {
        self.inner.state.lock().callback = None;
    }

    /// Deliver callbacks on `source`
    pub fn schedule(&self, source: Arc<dyn EventSource>) {
        self.inner.state.lock().event_source = Some(source);
    }

    /// Stop delivering callbacks. Values keep buffering.
    pub fn unschedule(&self) {
        self.inner.state.lock().event_source = None;
    }
}

impl QueueInner {
    fn on_enqueue(self: &Arc<Self>) {
        let (callback, source) = {
            let mut state = self.state.lock();
            if !state.was_empty || self.backend.is_empty() {
                return;
            }
            state.was_empty = false;
            match (state.callback.clone(), state.event_source.clone()) {
                (Some(callback), Some(source)) => (callback, source),
                _ => return,
            }
        };

        let weak = Arc::downgrade(self);
        source.post(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                callback(&ElementQueue { inner });
            }
        }));
    }

    fn note_dequeue(&self, state: &mut QueueState) {
        if self.backend.is_empty() {
            state.was_empty = true;
        }
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.running {
            self.backend.stop();
            state.running = false;
        }
        self.backend.set_enqueue_hook(None);
        self.backend.release();
        debug!("Queue released on device {:?}", self.device.id());
    }
}

impl PartialEq for ElementQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ElementQueue {}

impl fmt::Debug for ElementQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ElementQueue")
            .field("device", &self.inner.device.id())
            .field("depth", &state.depth)
            .field("running", &state.running)
            .field("elements", &state.elements.len())
            .field("scheduled", &state.event_source.is_some())
            .finish()
    }
}

//! In-process loopback device
//!
//! `LoopbackDevice` implements [`Device`] without hardware: output batches
//! are stored as the device's current values, input batches read them back,
//! and [`LoopbackDevice::inject`] plays the part of an input report arriving
//! from the wire. Faults can be injected to exercise error paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::device::{CommitRequest, Completion, Device, EnqueueHook, QueueBackend};
use crate::registry::Registry;
use crate::run_loop::EventSource;
use crate::status::Status;
use crate::types::{
    property_key, DeviceId, Direction, Element, ElementKind, ElementValue, Property,
};

/// Demo element cookies used by [`LoopbackDevice::demo`]
pub mod demo_cookie {
    pub const KEY_A: u32 = 1;
    pub const AXIS_X: u32 = 2;
    pub const AXIS_Y: u32 = 3;
    pub const LED_NUM_LOCK: u32 = 4;
    pub const LED_CAPS_LOCK: u32 = 5;
    pub const TEMPERATURE: u32 = 6;
}

/// Simulated device
pub struct LoopbackDevice {
    id: DeviceId,
    started_at: Instant,
    elements: Vec<Element>,
    properties: HashMap<String, Property>,
    state: Mutex<LoopbackState>,
}

struct LoopbackState {
    open: bool,
    attached: bool,
    values: HashMap<Element, ElementValue>,
    queues: Registry<LoopbackQueue>,
    max_queues: Option<usize>,
    fail_next_commit: Option<Status>,
    commit_latency: Duration,
    event_source: Option<Arc<dyn EventSource>>,
    sent: Vec<Vec<ElementValue>>,
}

impl LoopbackDevice {
    /// Device exposing `elements`
    pub fn new(id: DeviceId, elements: Vec<Element>) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            elements,
            properties: HashMap::new(),
            state: Mutex::new(LoopbackState {
                open: false,
                attached: true,
                values: HashMap::new(),
                queues: Registry::new(),
                max_queues: None,
                fail_next_commit: None,
                commit_latency: Duration::ZERO,
                event_source: None,
                sent: Vec::new(),
            }),
        }
    }

    /// Small keyboard-like device: a key, two axes, two LEDs and a
    /// temperature feature
    pub fn demo(id: u64) -> Self {
        let device = DeviceId(id);
        let elements = vec![
            Element::new(device, demo_cookie::KEY_A, ElementKind::InputButton, 0x07, 0x04)
                .with_report_id(1),
            Element::new(device, demo_cookie::AXIS_X, ElementKind::InputAxis, 0x01, 0x30)
                .with_report_id(2)
                .with_unit(0x0000_0011),
            Element::new(device, demo_cookie::AXIS_Y, ElementKind::InputAxis, 0x01, 0x31)
                .with_report_id(2)
                .with_unit(0x0000_F011),
            Element::new(device, demo_cookie::LED_NUM_LOCK, ElementKind::Output, 0x08, 0x01)
                .with_report_id(1),
            Element::new(device, demo_cookie::LED_CAPS_LOCK, ElementKind::Output, 0x08, 0x02)
                .with_report_id(1),
            Element::new(device, demo_cookie::TEMPERATURE, ElementKind::Feature, 0xFF00, 0x01)
                .with_report_id(6)
                .with_unit(0x0001_0001),
        ];

        Self::new(device, elements)
            .with_property(property_key::VENDOR_ID, Property::Number(0x1209))
            .with_property(property_key::PRODUCT_ID, Property::Number(0x0001))
            .with_property(property_key::PRODUCT, Property::Text("Loopback HID".into()))
            .with_property(property_key::MANUFACTURER, Property::Text("hid-element".into()))
    }

    /// Add a property
    pub fn with_property(mut self, key: &str, value: Property) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Element with `cookie`, if the device has one
    pub fn element(&self, cookie: u32) -> Option<&Element> {
        self.elements.iter().find(|e| e.cookie.0 == cookie)
    }

    /// Time since the device was created
    pub fn now(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Integer value for `element`, stamped now
    pub fn integer_value(&self, element: &Element, value: i64) -> ElementValue {
        ElementValue::integer(element, value, self.now())
    }

    /// Simulate an input report carrying `value`
    ///
    /// The value becomes the element's current value and is offered to every
    /// live, started queue subscribed to the element.
    pub fn inject(&self, value: ElementValue) {
        let queues = {
            let mut state = self.state.lock();
            if !state.attached {
                debug!("Dropping injected value: device detached");
                return;
            }
            state.values.insert(value.element.clone(), value.clone());
            state.queues.live()
        };
        for (_, queue) in queues {
            queue.offer(value.clone());
        }
    }

    /// Set the device-side value returned by input commits
    pub fn set_current_value(&self, value: ElementValue) {
        self.state
            .lock()
            .values
            .insert(value.element.clone(), value);
    }

    /// Device-side value of `element`
    pub fn current_value(&self, element: &Element) -> Option<ElementValue> {
        self.state.lock().values.get(element).cloned()
    }

    /// Output batches received so far, oldest first
    pub fn sent_batches(&self) -> Vec<Vec<ElementValue>> {
        self.state.lock().sent.clone()
    }

    /// Number of queues still alive
    pub fn live_queues(&self) -> usize {
        self.state.lock().queues.live().len()
    }

    /// Fail the next commit with `status`
    pub fn fail_next_commit(&self, status: Status) {
        self.state.lock().fail_next_commit = Some(status);
    }

    /// Limit how many live queues may exist
    pub fn set_max_queues(&self, max: Option<usize>) {
        self.state.lock().max_queues = max;
    }

    /// Delay before asynchronous commits complete
    pub fn set_commit_latency(&self, latency: Duration) {
        self.state.lock().commit_latency = latency;
    }

    /// Simulate unplugging; every later operation fails with `NotAttached`
    pub fn unplug(&self) {
        let mut state = self.state.lock();
        state.attached = false;
        state.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn attached(state: &LoopbackState) -> Result<(), Status> {
        if state.attached {
            Ok(())
        } else {
            Err(Status::NotAttached)
        }
    }

    fn exchange(&self, request: CommitRequest) -> Result<Vec<ElementValue>, Status> {
        let mut state = self.state.lock();
        Self::attached(&state)?;
        if !state.open {
            return Err(Status::NotOpen);
        }
        if let Some(status) = state.fail_next_commit.take() {
            debug!("Failing {:?} commit with {}", request.direction(), status);
            return Err(status);
        }

        match request {
            CommitRequest::Output(values) => {
                for value in &values {
                    state.values.insert(value.element.clone(), value.clone());
                }
                state.sent.push(values);
                Ok(Vec::new())
            }
            CommitRequest::Input(elements) => Ok(elements
                .iter()
                .filter_map(|e| state.values.get(e).cloned())
                .collect()),
        }
    }
}

impl Device for LoopbackDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn open(&self) -> Result<(), Status> {
        let mut state = self.state.lock();
        Self::attached(&state)?;
        state.open = true;
        Ok(())
    }

    fn close(&self) -> Result<(), Status> {
        let mut state = self.state.lock();
        Self::attached(&state)?;
        state.open = false;
        Ok(())
    }

    fn elements(&self) -> Result<Vec<Element>, Status> {
        Self::attached(&self.state.lock())?;
        Ok(self.elements.clone())
    }

    fn property(&self, key: &str) -> Option<Property> {
        self.properties.get(key).cloned()
    }

    fn schedule_with_event_source(&self, source: Arc<dyn EventSource>) {
        self.state.lock().event_source = Some(source);
    }

    fn create_queue(&self, depth: usize) -> Result<Arc<dyn QueueBackend>, Status> {
        let mut state = self.state.lock();
        Self::attached(&state)?;
        if depth == 0 {
            return Err(Status::BadArgument);
        }
        if let Some(max) = state.max_queues {
            if state.queues.live().len() >= max {
                return Err(Status::NoResources);
            }
        }
        let queue = Arc::new(LoopbackQueue::new(depth));
        state.queues.register(&queue);
        Ok(queue)
    }

    fn prepare_transaction(&self, direction: Direction) -> Result<(), Status> {
        Self::attached(&self.state.lock())?;
        debug!("Loopback accepts {:?} transaction", direction);
        Ok(())
    }

    fn commit(&self, request: CommitRequest) -> Result<Vec<ElementValue>, Status> {
        self.exchange(request)
    }

    fn commit_async(&self, request: CommitRequest, _timeout: Duration, completion: Completion) {
        let result = self.exchange(request);
        let (source, latency) = {
            let state = self.state.lock();
            (state.event_source.clone(), state.commit_latency)
        };
        match source {
            Some(source) => source.post_after(latency, Box::new(move || completion(result))),
            None => completion(result),
        }
    }
}

/// Transport-side queue buffer used by [`LoopbackDevice`]
pub struct LoopbackQueue {
    state: Mutex<LoopbackQueueState>,
    available: Condvar,
    hook: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

struct LoopbackQueueState {
    depth: usize,
    running: bool,
    released: bool,
    elements: HashSet<Element>,
    buffer: VecDeque<ElementValue>,
    dropped: u64,
}

impl LoopbackQueue {
    fn new(depth: usize) -> Self {
        Self {
            state: Mutex::new(LoopbackQueueState {
                depth,
                running: false,
                released: false,
                elements: HashSet::new(),
                buffer: VecDeque::with_capacity(depth),
                dropped: 0,
            }),
            available: Condvar::new(),
            hook: Mutex::new(None),
        }
    }

    /// Buffer `value` if the queue is started and subscribed to its element.
    /// A full queue drops the new value.
    fn offer(&self, value: ElementValue) -> bool {
        {
            let mut state = self.state.lock();
            if state.released || !state.running || !state.elements.contains(&value.element) {
                return false;
            }
            if state.buffer.len() >= state.depth {
                state.dropped += 1;
                debug!(
                    "Queue full ({} values), dropping value for cookie {} ({} dropped)",
                    state.depth, value.element.cookie.0, state.dropped
                );
                return false;
            }
            state.buffer.push_back(value);
        }
        self.available.notify_one();

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    /// Values dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

impl QueueBackend for LoopbackQueue {
    fn set_depth(&self, depth: usize) {
        self.state.lock().depth = depth;
    }

    fn add_element(&self, element: &Element) {
        self.state.lock().elements.insert(element.clone());
    }

    fn remove_element(&self, element: &Element) {
        self.state.lock().elements.remove(element);
    }

    fn start(&self) {
        self.state.lock().running = true;
    }

    fn stop(&self) {
        self.state.lock().running = false;
    }

    fn try_pop(&self) -> Option<ElementValue> {
        self.state.lock().buffer.pop_front()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<ElementValue> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.buffer.is_empty() {
            if self.available.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.buffer.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    fn set_enqueue_hook(&self, hook: Option<EnqueueHook>) {
        *self.hook.lock() = hook.map(Arc::from);
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.running = false;
        state.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_queue(
        device: &LoopbackDevice,
        depth: usize,
        element: &Element,
    ) -> Arc<dyn QueueBackend> {
        let queue = device.create_queue(depth).unwrap();
        queue.add_element(element);
        queue.start();
        queue
    }

    #[test]
    fn test_inject_reaches_subscribed_queue_only() {
        let device = LoopbackDevice::demo(1);
        let key = device.element(demo_cookie::KEY_A).unwrap().clone();
        let axis = device.element(demo_cookie::AXIS_X).unwrap().clone();
        let queue = started_queue(&device, 4, &key);

        device.inject(device.integer_value(&axis, 10));
        assert!(queue.is_empty());

        device.inject(device.integer_value(&key, 1));
        assert_eq!(queue.try_pop().and_then(|v| v.as_integer()), Some(1));
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let device = LoopbackDevice::demo(1);
        let key = device.element(demo_cookie::KEY_A).unwrap().clone();
        let queue = Arc::new(LoopbackQueue::new(2));
        queue.add_element(&key);
        queue.start();

        for v in 0..4 {
            queue.offer(device.integer_value(&key, v));
        }
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.try_pop().and_then(|v| v.as_integer()), Some(0));
        assert_eq!(queue.try_pop().and_then(|v| v.as_integer()), Some(1));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_stopped_queue_ignores_values() {
        let device = LoopbackDevice::demo(1);
        let key = device.element(demo_cookie::KEY_A).unwrap().clone();
        let queue = started_queue(&device, 4, &key);
        queue.stop();

        device.inject(device.integer_value(&key, 1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dropped_queue_is_forgotten() {
        let device = LoopbackDevice::demo(1);
        let queue = device.create_queue(4).unwrap();
        assert_eq!(device.live_queues(), 1);
        drop(queue);
        assert_eq!(device.live_queues(), 0);
    }

    #[test]
    fn test_queue_limit_and_bad_depth() {
        let device = LoopbackDevice::demo(1);
        device.set_max_queues(Some(1));
        let _first = device.create_queue(4).unwrap();
        assert_eq!(device.create_queue(4).err(), Some(Status::NoResources));
        assert_eq!(device.create_queue(0).err(), Some(Status::BadArgument));
    }

    #[test]
    fn test_commit_requires_open_device() {
        let device = LoopbackDevice::demo(1);
        let led = device.element(demo_cookie::LED_CAPS_LOCK).unwrap().clone();
        let batch = CommitRequest::Output(vec![device.integer_value(&led, 1)]);

        assert_eq!(device.commit(batch.clone()), Err(Status::NotOpen));
        device.open().unwrap();
        assert_eq!(device.commit(batch), Ok(Vec::new()));
        assert_eq!(device.sent_batches().len(), 1);
        assert_eq!(
            device.current_value(&led).and_then(|v| v.as_integer()),
            Some(1)
        );
    }

    #[test]
    fn test_unplug() {
        let device = LoopbackDevice::demo(1);
        device.open().unwrap();
        device.unplug();
        assert!(!device.is_open());
        assert_eq!(device.elements().err(), Some(Status::NotAttached));
        assert_eq!(device.open(), Err(Status::NotAttached));
        assert!(device.create_queue(4).is_err());
    }

    #[test]
    fn test_demo_properties_and_units() {
        let device = LoopbackDevice::demo(1);
        assert_eq!(
            device.property(property_key::VENDOR_ID),
            Some(Property::Number(0x1209))
        );
        assert_eq!(device.property("Missing"), None);

        let temperature = device.element(demo_cookie::TEMPERATURE).unwrap();
        assert_eq!(temperature.unit().format(), "kelvin");
        let axis = device.element(demo_cookie::AXIS_Y).unwrap();
        assert_eq!(axis.unit().format(), "centimeter/(second)");
    }
}

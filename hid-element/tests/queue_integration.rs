//! Integration tests for element queues.
//!
//! These drive `ElementQueue` through the loopback device, so they cover
//! the queue bookkeeping and the transport hook wiring together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hid_element::{
    demo_cookie, Element, ElementQueue, HidError, LoopbackDevice, QueueOptions, RunLoop, Status,
};

fn setup() -> (Arc<LoopbackDevice>, Element, Element) {
    let device = Arc::new(LoopbackDevice::demo(1));
    let key = device.element(demo_cookie::KEY_A).unwrap().clone();
    let axis = device.element(demo_cookie::AXIS_X).unwrap().clone();
    (device, key, axis)
}

fn started_queue(device: &Arc<LoopbackDevice>, elements: &[&Element]) -> ElementQueue {
    let queue = ElementQueue::create(device.clone(), QueueOptions::with_depth(8)).unwrap();
    for element in elements {
        queue.add_element(element);
    }
    queue.start();
    queue
}

// ── Delivery order ──

#[test]
fn values_come_out_in_arrival_order() {
    let (device, key, axis) = setup();
    let queue = started_queue(&device, &[&key, &axis]);

    device.inject(device.integer_value(&key, 1));
    device.inject(device.integer_value(&axis, 250));
    device.inject(device.integer_value(&key, 0));

    let first = queue.copy_next_value().unwrap();
    assert_eq!(first.element, key);
    assert_eq!(first.as_integer(), Some(1));

    let second = queue.copy_next_value().unwrap();
    assert_eq!(second.element, axis);
    assert_eq!(second.as_integer(), Some(250));

    let third = queue.copy_next_value().unwrap();
    assert_eq!(third.as_integer(), Some(0));
    assert!(first.timestamp <= second.timestamp && second.timestamp <= third.timestamp);

    assert!(queue.copy_next_value().is_none());
}

#[test]
fn unsubscribed_elements_are_not_buffered() {
    let (device, key, axis) = setup();
    let queue = started_queue(&device, &[&key]);

    device.inject(device.integer_value(&axis, 5));
    assert!(queue.copy_next_value().is_none());
}

// ── Blocking behaviour ──

#[test]
fn empty_queue_returns_immediately() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[&key]);

    let start = Instant::now();
    assert!(queue.copy_next_value().is_none());
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn timed_copy_returns_value_produced_before_timeout() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[&key]);

    let producer_device = Arc::clone(&device);
    let producer_key = key.clone();
    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        producer_device.inject(producer_device.integer_value(&producer_key, 42));
    });

    let start = Instant::now();
    let value = queue.copy_next_value_timeout(Duration::from_secs(5));
    producer.join().unwrap();

    assert_eq!(value.and_then(|v| v.as_integer()), Some(42));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn timed_copy_gives_up_after_timeout() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[&key]);

    let start = Instant::now();
    assert!(queue
        .copy_next_value_timeout(Duration::from_millis(30))
        .is_none());
    assert!(start.elapsed() >= Duration::from_millis(30));
}

// ── Membership and running state ──

#[test]
fn membership_and_running_are_idempotent() {
    let (device, key, axis) = setup();
    let queue = ElementQueue::create(device.clone(), QueueOptions::default()).unwrap();

    queue.add_element(&key);
    queue.add_element(&key);
    assert!(queue.contains_element(&key));
    assert_eq!(queue.elements().len(), 1);

    queue.remove_element(&axis);
    assert!(queue.contains_element(&key));

    queue.remove_element(&key);
    queue.remove_element(&key);
    assert!(!queue.contains_element(&key));

    queue.start();
    queue.start();
    assert!(queue.is_running());
    queue.stop();
    queue.stop();
    assert!(!queue.is_running());
}

#[test]
fn starting_without_elements_yields_nothing() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[]);
    device.inject(device.integer_value(&key, 1));
    assert!(queue.copy_next_value().is_none());
}

#[test]
fn stop_halts_delivery_but_keeps_buffered_values() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[&key]);

    device.inject(device.integer_value(&key, 1));
    queue.stop();
    device.inject(device.integer_value(&key, 2));

    assert_eq!(queue.copy_next_value().and_then(|v| v.as_integer()), Some(1));
    assert!(queue.copy_next_value().is_none());
}

#[test]
fn depth_is_forwarded_to_transport() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[&key]);
    queue.set_depth(2);
    assert_eq!(queue.depth(), 2);

    for v in 0..5 {
        device.inject(device.integer_value(&key, v));
    }
    assert_eq!(queue.copy_next_value().and_then(|v| v.as_integer()), Some(0));
    assert_eq!(queue.copy_next_value().and_then(|v| v.as_integer()), Some(1));
    assert!(queue.copy_next_value().is_none());
}

// ── Availability callback ──

#[test]
fn callback_fires_once_per_empty_to_nonempty_transition() {
    let (device, key, _) = setup();
    let run_loop = Arc::new(RunLoop::new());
    let queue = started_queue(&device, &[&key]);
    queue.schedule(run_loop.clone());

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    queue.register_available_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for v in 0..5 {
        device.inject(device.integer_value(&key, v));
    }
    run_loop.run_pending();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    while queue.copy_next_value().is_some() {}

    device.inject(device.integer_value(&key, 9));
    device.inject(device.integer_value(&key, 10));
    run_loop.run_pending();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn callback_receives_the_same_queue() {
    let (device, key, _) = setup();
    let run_loop = Arc::new(RunLoop::new());
    let queue = started_queue(&device, &[&key]);
    queue.schedule(run_loop.clone());

    let drained = Arc::new(AtomicUsize::new(0));
    let drained_clone = Arc::clone(&drained);
    let expected = queue.clone();
    queue.register_available_callback(move |q| {
        assert_eq!(*q, expected);
        while q.copy_next_value().is_some() {
            drained_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    device.inject(device.integer_value(&key, 1));
    device.inject(device.integer_value(&key, 0));
    assert!(run_loop.run_until(Duration::from_secs(1), || drained
        .load(Ordering::SeqCst)
        == 2));
}

#[test]
fn unscheduled_queue_never_fires() {
    let (device, key, _) = setup();
    let run_loop = RunLoop::new();
    let queue = started_queue(&device, &[&key]);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    queue.register_available_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    device.inject(device.integer_value(&key, 1));
    run_loop.run_for(Duration::from_millis(10));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(queue.copy_next_value().is_some());
}

#[test]
fn unregistered_callback_stops_firing() {
    let (device, key, _) = setup();
    let run_loop = Arc::new(RunLoop::new());
    let queue = started_queue(&device, &[&key]);
    queue.schedule(run_loop.clone());

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    queue.register_available_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    queue.unregister_available_callback();

    device.inject(device.integer_value(&key, 1));
    run_loop.run_pending();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

// ── Identity and lifetime ──

#[test]
fn handles_compare_by_transport_resource() {
    let (device, _, _) = setup();
    let a = ElementQueue::create(device.clone(), QueueOptions::default()).unwrap();
    let b = ElementQueue::create(device.clone(), QueueOptions::default()).unwrap();

    assert_eq!(a, a.clone());
    assert_ne!(a, b);
}

#[test]
fn dropping_last_handle_releases_transport_queue() {
    let (device, key, _) = setup();
    let queue = started_queue(&device, &[&key]);
    let second = queue.clone();
    assert_eq!(device.live_queues(), 1);

    drop(queue);
    assert_eq!(device.live_queues(), 1);
    drop(second);
    assert_eq!(device.live_queues(), 0);

    // Values injected after teardown go nowhere and do not panic
    device.inject(device.integer_value(&key, 1));
}

#[test]
fn pending_callback_after_drop_is_skipped() {
    let (device, key, _) = setup();
    let run_loop = Arc::new(RunLoop::new());
    let queue = started_queue(&device, &[&key]);
    queue.schedule(run_loop.clone());

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    queue.register_available_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    device.inject(device.integer_value(&key, 1));
    drop(queue);
    run_loop.run_pending();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

// ── Construction failures ──

#[test]
fn creation_fails_with_transport_status() {
    let (device, _, _) = setup();
    device.set_max_queues(Some(1));
    let _held = ElementQueue::create(device.clone(), QueueOptions::default()).unwrap();

    let err = ElementQueue::create(device.clone(), QueueOptions::default()).unwrap_err();
    assert_eq!(err, HidError::Status(Status::NoResources));

    device.unplug();
    device.set_max_queues(None);
    let err = ElementQueue::create(device.clone(), QueueOptions::default()).unwrap_err();
    assert_eq!(err.status(), Status::NotAttached);
}

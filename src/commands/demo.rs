//! Loopback demos.
//!
//! Both demos run against an in-process [`LoopbackDevice`] and a
//! [`RunLoop`] pumped on the calling thread, so they need no hardware.

use anyhow::{anyhow, Result};
use hid_element::{
    demo_cookie, property_key, Device, Direction, Element, ElementQueue, ElementTransaction,
    ElementValue, EventSource, HidError, LoopbackDevice, QueueOptions, RunLoop, TransactionOptions,
    ValueSlot,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn element(device: &LoopbackDevice, cookie: u32) -> Result<Element> {
    device
        .element(cookie)
        .cloned()
        .ok_or_else(|| anyhow!("loopback device has no element with cookie {cookie}"))
}

fn describe_device(device: &LoopbackDevice) -> Result<()> {
    let product = device
        .property(property_key::PRODUCT)
        .and_then(|p| p.as_text().map(str::to_string))
        .unwrap_or_default();
    let vid = device
        .property(property_key::VENDOR_ID)
        .and_then(|p| p.as_number())
        .unwrap_or_default();
    let pid = device
        .property(property_key::PRODUCT_ID)
        .and_then(|p| p.as_number())
        .unwrap_or_default();
    println!("Device: {product} VID={vid:04X} PID={pid:04X}");

    for e in device.elements().map_err(HidError::from)? {
        println!(
            "  cookie {:<2} {:<14} page 0x{:04X} usage 0x{:02X}  unit: {}",
            e.cookie.0,
            format!("{:?}", e.kind),
            e.usage_page,
            e.usage,
            e.unit()
        );
    }
    Ok(())
}

fn print_value(prefix: &str, value: &ElementValue) {
    let unit = value.element.unit();
    let unit = if unit.is_dimensionless() {
        String::new()
    } else {
        format!(" {unit}")
    };
    match value.as_integer() {
        Some(v) => println!(
            "{prefix} cookie {} = {v}{unit} @ {:?}",
            value.element.cookie.0, value.timestamp
        ),
        None => println!(
            "{prefix} cookie {} = {:02X?} @ {:?}",
            value.element.cookie.0,
            value.as_bytes().unwrap_or_default(),
            value.timestamp
        ),
    }
}

/// Inject `events` input values from a producer thread and drain them from
/// the queue's availability callback
pub fn queue(options: QueueOptions, events: u32) -> Result<()> {
    let device = Arc::new(LoopbackDevice::demo(1));
    describe_device(&device)?;

    let key = element(&device, demo_cookie::KEY_A)?;
    let axis = element(&device, demo_cookie::AXIS_X)?;
    let run_loop = Arc::new(RunLoop::new());

    let queue = ElementQueue::create(device.clone(), options)?;
    queue.add_element(&key);
    queue.add_element(&axis);
    queue.schedule(run_loop.clone());

    let received = Arc::new(AtomicU32::new(0));
    let callbacks = Arc::new(AtomicU32::new(0));
    {
        let received = Arc::clone(&received);
        let callbacks = Arc::clone(&callbacks);
        queue.register_available_callback(move |q| {
            callbacks.fetch_add(1, Ordering::Relaxed);
            while let Some(value) = q.copy_next_value() {
                received.fetch_add(1, Ordering::Relaxed);
                print_value("  <-", &value);
            }
        });
    }
    queue.start();

    let finished = Arc::new(AtomicBool::new(false));
    let producer = {
        let device = Arc::clone(&device);
        let finished = Arc::clone(&finished);
        let run_loop = Arc::clone(&run_loop);
        thread::spawn(move || {
            for i in 0..events {
                let value = if i % 2 == 0 {
                    device.integer_value(&key, i64::from((i / 2) % 2 == 0))
                } else {
                    device.integer_value(&axis, i64::from(i) * 10)
                };
                device.inject(value);
                // Bursts of four, so the callback sees several values at once
                if i % 4 == 3 {
                    thread::sleep(Duration::from_millis(20));
                }
            }
            // Posted behind any pending callbacks, so it also wakes the pump
            run_loop.post(Box::new(move || finished.store(true, Ordering::Release)));
        })
    };

    let completed = run_loop.run_until(Duration::from_secs(5), || {
        finished.load(Ordering::Acquire)
    });
    producer
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))?;
    run_loop.run_pending();
    queue.stop();

    if !completed {
        warn!("Producer did not finish within 5s");
    }
    let received = received.load(Ordering::Relaxed);
    info!(
        "Received {} of {} value(s) in {} callback(s), queue depth {}",
        received,
        events,
        callbacks.load(Ordering::Relaxed),
        queue.depth()
    );
    if received < events {
        warn!(
            "{} value(s) dropped by a full queue; raise --depth to keep them",
            events - received
        );
    }
    Ok(())
}

/// Commit with a callback and pump `run_loop` until it reports
fn commit_and_wait(
    tx: &ElementTransaction,
    run_loop: &RunLoop,
    timeout: Duration,
) -> Result<Result<(), HidError>> {
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    tx.commit_with_callback(
        Some(Box::new(move |_: &ElementTransaction, result| {
            *slot.lock() = Some(result)
        })),
        timeout,
    )?;
    run_loop.run_until(timeout * 4, || outcome.lock().is_some());
    let result = outcome.lock().take();
    result.ok_or_else(|| anyhow!("commit callback never ran"))
}

/// Walk through synchronous, asynchronous, timed-out and input commits
pub fn transaction(options: TransactionOptions) -> Result<()> {
    let device = Arc::new(LoopbackDevice::demo(2));
    describe_device(&device)?;
    device.open().map_err(HidError::from)?;

    let run_loop = Arc::new(RunLoop::new());
    device.schedule_with_event_source(run_loop.clone());

    let num_lock = element(&device, demo_cookie::LED_NUM_LOCK)?;
    let caps_lock = element(&device, demo_cookie::LED_CAPS_LOCK)?;
    let temperature = element(&device, demo_cookie::TEMPERATURE)?;

    let tx = ElementTransaction::create(device.clone(), Direction::Output, options)?;
    tx.set_value(&num_lock, device.integer_value(&num_lock, 0), ValueSlot::Default);
    tx.set_value(&caps_lock, device.integer_value(&caps_lock, 0), ValueSlot::Default);
    tx.set_value(&caps_lock, device.integer_value(&caps_lock, 1), ValueSlot::Pending);

    println!("Synchronous commit:");
    tx.commit()?;
    if let Some(batch) = device.sent_batches().last() {
        for value in batch {
            print_value("  ->", value);
        }
    }

    let timeout = tx.commit_timeout();
    tx.schedule(run_loop.clone());

    println!("Asynchronous commit (device answers in {:?}):", timeout / 4);
    device.set_commit_latency(timeout / 4);
    tx.set_value(&num_lock, device.integer_value(&num_lock, 1), ValueSlot::Pending);
    match commit_and_wait(&tx, &run_loop, timeout)? {
        Ok(()) => println!("  committed"),
        Err(e) => println!("  failed: {e}"),
    }

    let late = timeout + Duration::from_millis(50);
    println!("Asynchronous commit (device answers in {late:?}, timeout {timeout:?}):");
    device.set_commit_latency(late);
    tx.set_value(&caps_lock, device.integer_value(&caps_lock, 0), ValueSlot::Pending);
    match commit_and_wait(&tx, &run_loop, timeout)? {
        Ok(()) => println!("  committed"),
        Err(e) => println!("  failed: {e}"),
    }
    if let Some(value) = tx.get_value_in(&caps_lock, ValueSlot::Pending) {
        print_value("  still pending:", &value);
    }
    // The late device answer arrives here and is discarded
    run_loop.run_for(Duration::from_millis(100));

    println!("Input commit:");
    device.set_current_value(device.integer_value(&temperature, 296));
    let input = ElementTransaction::create(device.clone(), Direction::Input, options)?;
    input.add_element(&temperature);
    input.commit()?;
    match input.get_value(&temperature) {
        Some(value) => print_value("  <-", &value),
        None => println!("  no value for cookie {}", temperature.cookie.0),
    }

    device.close().map_err(HidError::from)?;
    Ok(())
}

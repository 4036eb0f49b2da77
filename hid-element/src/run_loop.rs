//! Event source seam and a minimal cooperative run loop
//!
//! Queues and transactions never spawn threads. Callbacks and timers are
//! handed to an [`EventSource`] supplied by the host; they run on whatever
//! thread pumps that source. [`RunLoop`] is a small in-process pump used by
//! the loopback device, the CLI demos and the tests.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Unit of work posted to an event source
pub type Task = Box<dyn FnOnce() + Send>;

/// Dispatcher that runs posted work on its own schedule
pub trait EventSource: Send + Sync {
    /// Run `task` on the next pump
    fn post(&self, task: Task);

    /// Run `task` once `delay` has elapsed
    fn post_after(&self, delay: Duration, task: Task);
}

struct Timer {
    deadline: Instant,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct RunLoopState {
    ready: VecDeque<Task>,
    timers: Vec<Timer>,
    next_seq: u64,
}

impl RunLoopState {
    /// Move every expired timer to the ready queue, earliest first
    fn promote_due(&mut self, now: Instant) {
        if self.timers.is_empty() {
            return;
        }
        self.timers.sort_by_key(|t| (t.deadline, t.seq));
        let due = self.timers.partition_point(|t| t.deadline <= now);
        for timer in self.timers.drain(..due) {
            self.ready.push_back(timer.task);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }
}

/// Single-threaded cooperative pump
///
/// Tasks run in posting order; timers run in deadline order once due.
#[derive(Default)]
pub struct RunLoop {
    state: Mutex<RunLoopState>,
    wake: Condvar,
}

impl RunLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every task that is ready now and return how many ran
    ///
    /// Work posted by those tasks waits for the next call.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Task> = {
            let mut state = self.state.lock();
            state.promote_due(Instant::now());
            state.ready.drain(..).collect()
        };
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Pump for `duration`, sleeping while idle. Returns tasks run.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut total = 0;
        loop {
            total += self.run_pending();
            if !self.wait_for_work(deadline) {
                return total;
            }
        }
    }

    /// Pump until `done` returns true or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            if !self.wait_for_work(deadline) {
                return done();
            }
        }
    }

    /// Number of tasks ready or waiting on a timer
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.timers.len()
    }

    /// Block until work is due or `deadline` passes. False once past deadline.
    fn wait_for_work(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state.promote_due(now);
            if !state.ready.is_empty() {
                return true;
            }
            let wake_at = state
                .next_deadline()
                .map_or(deadline, |timer| timer.min(deadline));
            self.wake.wait_until(&mut state, wake_at);
        }
    }
}

impl EventSource for RunLoop {
    fn post(&self, task: Task) {
        self.state.lock().ready.push_back(task);
        self.wake.notify_all();
    }

    fn post_after(&self, delay: Duration, task: Task) {
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.timers.push(Timer {
                deadline: Instant::now() + delay,
                seq,
                task,
            });
        }
        self.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |n: u32| -> Task {
            let log = Arc::clone(&log_clone);
            Box::new(move || log.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_tasks_run_in_post_order() {
        let run_loop = RunLoop::new();
        let (log, task) = recorder();
        run_loop.post(task(1));
        run_loop.post(task(2));
        run_loop.post(task(3));

        assert_eq!(run_loop.pending(), 3);
        assert_eq!(run_loop.run_pending(), 3);
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(run_loop.run_pending(), 0);
    }

    #[test]
    fn test_timers_wait_for_deadline() {
        let run_loop = RunLoop::new();
        let (log, task) = recorder();
        run_loop.post_after(Duration::from_millis(30), task(2));
        run_loop.post_after(Duration::from_millis(10), task(1));

        assert_eq!(run_loop.run_pending(), 0);
        run_loop.run_for(Duration::from_millis(80));
        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(run_loop.pending(), 0);
    }

    #[test]
    fn test_run_until_stops_on_condition() {
        let run_loop = Arc::new(RunLoop::new());
        let (log, task) = recorder();
        run_loop.post_after(Duration::from_millis(5), task(7));

        let done = run_loop.run_until(Duration::from_secs(2), || !log.lock().is_empty());
        assert!(done);
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn test_run_until_times_out() {
        let run_loop = RunLoop::new();
        let start = Instant::now();
        assert!(!run_loop.run_until(Duration::from_millis(20), || false));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_post_from_another_thread_wakes_pump() {
        let run_loop = Arc::new(RunLoop::new());
        let (log, task) = recorder();
        let poster = Arc::clone(&run_loop);
        let t = task(9);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            poster.post(t);
        });

        assert!(run_loop.run_until(Duration::from_secs(2), || !log.lock().is_empty()));
        handle.join().unwrap();
    }
}

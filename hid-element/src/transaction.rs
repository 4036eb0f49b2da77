//! Element transactions
//!
//! An [`ElementTransaction`] stages values for a set of elements and
//! exchanges them with the device as one batch. Each member has a pending
//! slot (staged for the next commit) and a default slot (fallback that
//! survives commits).
//!
//! ```text
//! Idle --set_value--> Staging --commit--> Committing --ok--> Idle
//!                        ^                     |
//!                        +-------- err --------+
//! ```
//!
//! Asynchronous commits are tagged with a generation number. Exactly one of
//! the device completion, the timeout timer, or a newer commit settles an
//! attempt; whatever arrives for an attempt that is no longer in flight is
//! dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::device::{CommitRequest, Device};
use crate::error::HidError;
use crate::run_loop::EventSource;
use crate::status::Status;
use crate::types::{Direction, Element, ElementValue, TransactionOptions, ValueSlot};

/// Commit timeout used when the options do not name one
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Receives the outcome of an asynchronous commit
pub type CommitCallback = Box<dyn FnOnce(&ElementTransaction, Result<(), HidError>) + Send>;

/// Staged batch of element values for one device
///
/// Cloning yields another handle to the same transaction.
#[derive(Clone)]
pub struct ElementTransaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    device: Arc<dyn Device>,
    options: TransactionOptions,
    state: Mutex<TransactionState>,
}

#[derive(Default)]
struct Slots {
    pending: Option<ElementValue>,
    default: Option<ElementValue>,
    /// Stamp of the last `set_value` into the pending slot
    staged_at: u64,
}

/// Pending stamps of every member at the moment a batch was built
type Snapshot = Vec<(Element, u64)>;

struct InFlight {
    generation: u64,
    direction: Direction,
    snapshot: Snapshot,
    callback: CommitCallback,
}

struct TransactionState {
    direction: Direction,
    /// Members in insertion order
    entries: Vec<(Element, Slots)>,
    generation: u64,
    /// Last stamp handed out by `set_value`
    stamp: u64,
    in_flight: Option<InFlight>,
    event_source: Option<Arc<dyn EventSource>>,
}

impl TransactionState {
    fn slots(&self, element: &Element) -> Option<&Slots> {
        self.entries
            .iter()
            .find(|(e, _)| e == element)
            .map(|(_, slots)| slots)
    }

    fn slots_mut(&mut self, element: &Element) -> Option<&mut Slots> {
        self.entries
            .iter_mut()
            .find(|(e, _)| e == element)
            .map(|(_, slots)| slots)
    }

    fn entry(&mut self, element: &Element) -> &mut Slots {
        let index = match self.entries.iter().position(|(e, _)| e == element) {
            Some(index) => index,
            None => {
                self.entries.push((element.clone(), Slots::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    fn clear_pending(&mut self) {
        for (_, slots) in &mut self.entries {
            slots.pending = None;
        }
    }

    /// Batch for the current direction. Output members with neither a
    /// pending nor a default value are left out.
    fn build_request(&self) -> CommitRequest {
        match self.direction {
            Direction::Output => CommitRequest::Output(
                self.entries
                    .iter()
                    .filter_map(|(_, slots)| slots.pending.as_ref().or(slots.default.as_ref()))
                    .cloned()
                    .collect(),
            ),
            Direction::Input => {
                CommitRequest::Input(self.entries.iter().map(|(e, _)| e.clone()).collect())
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        self.entries
            .iter()
            .map(|(e, slots)| (e.clone(), slots.staged_at))
            .collect()
    }

    /// Apply a successful exchange of the batch taken at `snapshot`
    ///
    /// Only slots left untouched since the snapshot are cleared or receive
    /// fetched values. Anything staged while the batch was out stays pending
    /// for the next commit.
    fn apply_success(
        &mut self,
        direction: Direction,
        snapshot: &[(Element, u64)],
        fetched: Vec<ElementValue>,
    ) {
        for (element, staged_at) in snapshot {
            if let Some(slots) = self.slots_mut(element) {
                if slots.staged_at == *staged_at {
                    slots.pending = None;
                }
            }
        }
        if direction == Direction::Input {
            for value in fetched {
                let Some(&(_, staged_at)) = snapshot.iter().find(|(e, _)| *e == value.element) else {
                    continue;
                };
                if let Some(slots) = self.slots_mut(&value.element) {
                    if slots.staged_at == staged_at {
                        slots.pending = Some(value);
                    }
                }
            }
        }
    }

    /// Start a new attempt, returning any attempt it supersedes
    fn begin_attempt(&mut self) -> (u64, Option<InFlight>) {
        self.generation += 1;
        (self.generation, self.in_flight.take())
    }
}

impl ElementTransaction {
    /// Create a transaction on `device`
    ///
    /// Fails with the transport's status if the device refuses.
    pub fn create(
        device: Arc<dyn Device>,
        direction: Direction,
        options: TransactionOptions,
    ) -> Result<Self, HidError> {
        device.prepare_transaction(direction)?;
        debug!(
            "Created {:?} transaction on device {:?}",
            direction,
            device.id()
        );
        Ok(Self {
            inner: Arc::new(TransactionInner {
                device,
                options,
                state: Mutex::new(TransactionState {
                    direction,
                    entries: Vec::new(),
                    generation: 0,
                    stamp: 0,
                    in_flight: None,
                    event_source: None,
                }),
            }),
        })
    }

    /// Device this transaction is bound to
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.inner.device
    }

    pub fn direction(&self) -> Direction {
        self.inner.state.lock().direction
    }

    /// Change direction. Membership and staged values are kept.
    pub fn set_direction(&self, direction: Direction) {
        self.inner.state.lock().direction = direction;
    }

    /// Add `element`. No-op if already a member.
    pub fn add_element(&self, element: &Element) {
        self.inner.state.lock().entry(element);
    }

    /// Remove `element` and its values. No-op if not a member.
    pub fn remove_element(&self, element: &Element) {
        self.inner
            .state
            .lock()
            .entries
            .retain(|(e, _)| e != element);
    }

    pub fn contains_element(&self, element: &Element) -> bool {
        self.inner.state.lock().slots(element).is_some()
    }

    /// Members in insertion order
    pub fn elements(&self) -> Vec<Element> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }

    /// Stage `value` for `element` in `slot`, adding the element if needed
    pub fn set_value(&self, element: &Element, value: ElementValue, slot: ValueSlot) {
        let mut state = self.inner.state.lock();
        state.stamp += 1;
        let stamp = state.stamp;
        let slots = state.entry(element);
        match slot {
            ValueSlot::Pending => {
                slots.pending = Some(value);
                slots.staged_at = stamp;
            }
            ValueSlot::Default => slots.default = Some(value),
        }
    }

    /// Pending value if staged, otherwise the default
    pub fn get_value(&self, element: &Element) -> Option<ElementValue> {
        let state = self.inner.state.lock();
        let slots = state.slots(element)?;
        slots.pending.clone().or_else(|| slots.default.clone())
    }

    /// Value held in one specific slot
    pub fn get_value_in(&self, element: &Element, slot: ValueSlot) -> Option<ElementValue> {
        let state = self.inner.state.lock();
        let slots = state.slots(element)?;
        match slot {
            ValueSlot::Pending => slots.pending.clone(),
            ValueSlot::Default => slots.default.clone(),
        }
    }

    /// Drop every pending value. Defaults and membership are kept and the
    /// device is not contacted.
    pub fn clear(&self) {
        self.inner.state.lock().clear_pending();
    }

    /// Deliver asynchronous commit outcomes on `source`
    pub fn schedule(&self, source: Arc<dyn EventSource>) {
        self.inner.state.lock().event_source = Some(source);
    }

    pub fn unschedule(&self) {
        self.inner.state.lock().event_source = None;
    }

    /// Whether an asynchronous commit is waiting for its outcome
    pub fn is_committing(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Timeout from the creation options, or [`DEFAULT_COMMIT_TIMEOUT`]
    pub fn commit_timeout(&self) -> Duration {
        self.inner
            .options
            .commit_timeout()
            .unwrap_or(DEFAULT_COMMIT_TIMEOUT)
    }

    /// Exchange the batch with the device and wait for the outcome
    ///
    /// On success the pending values that went out are cleared, or input
    /// pending slots receive the fetched values. Values staged while the
    /// batch was out are kept. On failure nothing changes so the caller can
    /// retry.
    pub fn commit(&self) -> Result<(), HidError> {
        let (direction, request, snapshot, superseded) = {
            let mut state = self.inner.state.lock();
            let (_, superseded) = state.begin_attempt();
            let superseded = superseded.map(|old| (old, state.event_source.clone()));
            (state.direction, state.build_request(), state.snapshot(), superseded)
        };
        if let Some((old, source)) = superseded {
            self.inner.abort(old, source);
        }

        if request.is_empty() {
            debug!("Nothing to commit for {:?} transaction", direction);
            return Ok(());
        }

        let count = request.len();
        match self.inner.device.commit(request) {
            Ok(fetched) => {
                self.inner
                    .state
                    .lock()
                    .apply_success(direction, &snapshot, fetched);
                debug!("Committed {} {:?} element(s)", count, direction);
                Ok(())
            }
            Err(status) => {
                warn!("Commit of {} element(s) failed: {}", count, status);
                Err(status.into())
            }
        }
    }

    /// Commit, reporting the outcome through `callback`
    ///
    /// Without a callback this is [`ElementTransaction::commit`]. With one,
    /// the call returns `Ok(())` once the batch is handed to the device, and
    /// the outcome arrives later on the scheduled event source: success, a
    /// device error, or `Status::Timeout` if `timeout` elapses first. The
    /// timeout covers the whole batch.
    pub fn commit_with_callback(
        &self,
        callback: Option<CommitCallback>,
        timeout: Duration,
    ) -> Result<(), HidError> {
        let Some(callback) = callback else {
            return self.commit();
        };

        let (generation, request, source, superseded) = {
            let mut state = self.inner.state.lock();
            let source = state.event_source.clone().ok_or(HidError::NotScheduled)?;
            let (generation, superseded) = state.begin_attempt();
            state.in_flight = Some(InFlight {
                generation,
                direction: state.direction,
                snapshot: state.snapshot(),
                callback,
            });
            (generation, state.build_request(), source, superseded)
        };
        if let Some(old) = superseded {
            self.inner.abort(old, Some(Arc::clone(&source)));
        }

        if request.is_empty() {
            let weak = Arc::downgrade(&self.inner);
            source.post(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.settle(generation, Ok(Vec::new()));
                }
            }));
            return Ok(());
        }

        let weak = Arc::downgrade(&self.inner);
        source.post_after(
            timeout,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.settle(generation, Err(Status::Timeout));
                }
            }),
        );

        debug!(
            "Commit generation {} started with {} element(s)",
            generation,
            request.len()
        );
        let weak = Arc::downgrade(&self.inner);
        let completion_source = Arc::clone(&source);
        self.inner.device.commit_async(
            request,
            timeout,
            Box::new(move |result| {
                completion_source.post(Box::new(move || match weak.upgrade() {
                    Some(inner) => inner.settle(generation, result),
                    None => debug!("Commit generation {} completed after release", generation),
                }));
            }),
        );
        Ok(())
    }
}

impl TransactionInner {
    /// Settle attempt `generation` if it is still the one in flight
    fn settle(self: &Arc<Self>, generation: u64, result: Result<Vec<ElementValue>, Status>) {
        let (callback, outcome) = {
            let mut state = self.state.lock();
            let current = state.in_flight.as_ref().map(|f| f.generation);
            if current != Some(generation) {
                debug!(
                    "Discarding outcome for commit generation {} ({:?})",
                    generation,
                    result.as_ref().err()
                );
                return;
            }
            let Some(in_flight) = state.in_flight.take() else {
                return;
            };
            let outcome = match result {
                Ok(fetched) => {
                    state.apply_success(in_flight.direction, &in_flight.snapshot, fetched);
                    Ok(())
                }
                Err(status) => {
                    warn!("Commit generation {} failed: {}", generation, status);
                    Err(HidError::Status(status))
                }
            };
            (in_flight.callback, outcome)
        };

        let transaction = ElementTransaction {
            inner: Arc::clone(self),
        };
        callback(&transaction, outcome);
    }

    /// Report `Aborted` to an attempt replaced by a newer commit
    fn abort(self: &Arc<Self>, old: InFlight, source: Option<Arc<dyn EventSource>>) {
        debug!("Commit generation {} superseded", old.generation);
        let Some(source) = source else {
            return;
        };
        let weak = Arc::downgrade(self);
        source.post(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let transaction = ElementTransaction { inner };
                (old.callback)(&transaction, Err(HidError::Status(Status::Aborted)));
            }
        }));
    }
}

impl PartialEq for ElementTransaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ElementTransaction {}

impl fmt::Debug for ElementTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ElementTransaction")
            .field("device", &self.inner.device.id())
            .field("direction", &state.direction)
            .field("elements", &state.entries.len())
            .field("generation", &state.generation)
            .field("committing", &state.in_flight.is_some())
            .finish()
    }
}

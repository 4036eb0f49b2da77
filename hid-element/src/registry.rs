//! Identity-keyed registry of non-owning references
//!
//! A transport needs to reach the queues subscribed to it without keeping
//! them alive. Entries are `Weak` and are upgraded at use time; an entry whose
//! owner has gone is skipped and pruned, never resurrected.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Identity of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Registry of weakly held entries keyed by registration identity
pub struct Registry<T: ?Sized> {
    entries: BTreeMap<RegistrationId, Weak<T>>,
    next_id: u64,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a non-owning reference to `entry`
    pub fn register(&mut self, entry: &Arc<T>) -> RegistrationId {
        let id = RegistrationId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Arc::downgrade(entry));
        id
    }

    /// Remove a registration. Returns whether it was present.
    pub fn unregister(&mut self, id: RegistrationId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Entry for `id` if it is registered and its owner is still alive
    pub fn get(&self, id: RegistrationId) -> Option<Arc<T>> {
        self.entries.get(&id).and_then(Weak::upgrade)
    }

    /// Live entries in registration order; dead ones are pruned
    pub fn live(&mut self) -> Vec<(RegistrationId, Arc<T>)> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|id, weak| match weak.upgrade() {
            Some(entry) => {
                live.push((*id, entry));
                true
            }
            None => false,
        });
        live
    }

    /// Number of registrations, including ones not yet pruned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

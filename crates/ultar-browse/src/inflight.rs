//! Per-key populate gates.
//!
//! Both caches populate outside their main lock (a directory scan or an
//! open+mmap can be slow). To keep at most one populate per key in flight,
//! callers first claim the key, re-check the cache, populate, insert, and
//! only then release the claim. A waiter that wakes after the insert finds
//! the entry and reuses it.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::hash::Hash;

/// Set of keys currently being populated.
pub(crate) struct Inflight<K> {
    claimed: Mutex<HashSet<K>>,
    released: Condvar,
}

/// Exclusive populate right for one key. Dropping it releases the claim.
pub(crate) struct PopulateGuard<'a, K: Eq + Hash> {
    owner: &'a Inflight<K>,
    key: Option<K>,
}

impl<K: Eq + Hash + Clone> Inflight<K> {
    pub(crate) fn new() -> Self {
        Self {
            claimed: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Block until this thread holds the populate claim for `key`.
    pub(crate) fn acquire(&self, key: &K) -> PopulateGuard<'_, K> {
        let mut claimed = self.claimed.lock();
        while claimed.contains(key) {
            self.released.wait(&mut claimed);
        }
        claimed.insert(key.clone());
        PopulateGuard {
            owner: self,
            key: Some(key.clone()),
        }
    }

    /// Number of keys currently claimed.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.claimed.lock().len()
    }
}

impl<K: Eq + Hash> Drop for PopulateGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.owner.claimed.lock().remove(&key);
            // One condvar serves every key; waiters re-check their own.
            self.owner.released.notify_all();
        }
    }
}

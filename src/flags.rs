use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// Keys with an operation currently in flight. A key enters the set through
/// [`PendingSet::try_begin`] and leaves it when the returned guard drops, so
/// the flag clears on every exit path.
#[derive(Debug)]
pub struct PendingSet<K> {
    inner: Arc<Mutex<HashSet<K>>>,
}

impl<K> Clone for PendingSet<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash + Clone> PendingSet<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Marks `key` pending. Returns `None` when an operation for the same
    /// key is already outstanding.
    pub fn try_begin(&self, key: K) -> Option<PendingGuard<K>> {
        let mut keys = self.inner.lock().unwrap();
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(PendingGuard {
            set: Arc::clone(&self.inner),
            key,
        })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().unwrap().contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for PendingSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PendingGuard<K: Eq + Hash> {
    set: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for PendingGuard<K> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.key);
    }
}

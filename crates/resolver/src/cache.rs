//! Bounded memoization of slow-path results
//!
//! Process-wide, keyed by normalized identifier, least-recently-used
//! eviction at a fixed capacity, no expiry by time. Entries are
//! write-once: a later insert for an existing key is ignored, so a cache
//! hit can never change an already-returned name.

use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    name: String,
    last_used: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    tick: u64,
}

/// LRU cache shared by all concurrent requests.
///
/// A plain `std::sync::Mutex` is enough here: the critical sections are a
/// map lookup or insert, never an await.
pub struct ResultCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Look up a name, refreshing the entry's recency on a hit.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.name.clone())
    }

    /// Insert a resolved name. Existing entries are never overwritten.
    pub fn insert(&self, key: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.entries.contains_key(key) {
            return;
        }
        if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key.to_string(),
            Entry {
                name: name.to_string(),
                last_used: tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

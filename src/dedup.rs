// Duplicate suppression for scoring signals.
//
// Chat clients love to double-fire: edited reactions, resent messages,
// reconnect replays. Each (actor, target, event) key may apply at most one
// scoring call per TTL window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Identity of a logical scoring signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub actor_id: i64,
    pub target_id: i64,
    pub event_id: String,
}

const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Thread-safe bounded TTL map of recently seen signals.
#[derive(Debug, Clone)]
pub struct DedupCache {
    inner: Arc<Mutex<HashMap<DedupKey, Instant>>>,
    max_entries: usize,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_entries,
        }
    }

    /// Returns true when the key was already marked within `ttl` of `now`;
    /// otherwise records the key and returns false. Test and set happen
    /// under one lock, so two concurrent calls for the same key cannot
    /// both return false. An expired entry is replaced and reported as a
    /// first occurrence.
    pub fn check_and_mark(&self, key: DedupKey, now: Instant, ttl: Duration) -> bool {
        let mut map = self.inner.lock().unwrap();
        if let Some(&seen) = map.get(&key) {
            if now.saturating_duration_since(seen) < ttl {
                return true;
            }
        }
        // At the size bound, drop everything expired before inserting.
        if map.len() >= self.max_entries {
            map.retain(|_, &mut seen| now.saturating_duration_since(seen) < ttl);
        }
        map.insert(key, now);
        false
    }

    /// Entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

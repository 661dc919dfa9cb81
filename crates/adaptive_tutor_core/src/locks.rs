//! crates/adaptive_tutor_core/src/locks.rs
//!
//! Per-key async mutexes. Entries are dropped from the map once nobody holds or
//! waits on them, so the map only ever contains keys with activity.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type LockMap<K> = Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>;

pub struct KeyedLocks<K> {
    locks: LockMap<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the lock for `key` is free and takes it.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = {
            let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(key.clone()).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            guard: Some(guard),
            key,
            locks: self.locks.clone(),
        }
    }

    pub fn active_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

pub struct KeyedGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    locks: LockMap<K>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        // Release before checking so a waiter that already holds a clone keeps the entry alive.
        self.guard.take();
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(mutex) = map.get(&self.key) {
            if Arc::strong_count(mutex) == 1 {
                map.remove(&self.key);
            }
        }
    }
}

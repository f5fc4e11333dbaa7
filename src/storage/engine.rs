//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the keyspace shared by every connection.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys hash into one of 64 shards, each behind its own
//!    `RwLock`, so writes to unrelated keys rarely wait on each other.
//! 2. **Generations**: Every `put` stamps the entry with a fresh generation
//!    drawn from an engine-wide counter. A scheduled removal only deletes the
//!    entry if the generation it was armed for is still the stored one.
//! 3. **Lazy Expiry**: `get` also treats past-deadline entries as absent, so
//!    expiry holds even when no expiry manager is running.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::expiry::Expiration;
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::trace;

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with its optional deadline.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Write generation that installed this entry
    pub generation: u64,
}

impl Entry {
    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // Poisoned locks are recovered: no writer leaves a partial entry behind.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}

/// The keyspace shared by all connections.
///
/// Wrap it in an `Arc` and hand a clone to every connection task.
///
/// # Example
///
/// ```
/// use pulsekv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// engine.put(Bytes::from("name"), Bytes::from("Nora"), None);
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Nora")));
///
/// engine.remove(&Bytes::from("name"));
/// assert_eq!(engine.get(&Bytes::from("name")), None);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    /// Source of write generations. Starts at 1 and only grows.
    next_generation: AtomicU64,

    /// Schedules for the expiry manager, set once it is started
    expirations: OnceLock<mpsc::UnboundedSender<Expiration>>,

    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("expiry_manager", &self.expirations.get().is_some())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            next_generation: AtomicU64::new(1),
            expirations: OnceLock::new(),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Connects the engine to a running expiry manager.
    ///
    /// Returns false if one was already attached.
    pub(crate) fn attach_expiry(&self, tx: mpsc::UnboundedSender<Expiration>) -> bool {
        self.expirations.set(tx).is_ok()
    }

    /// Supersedes any earlier write to a key by handing out a new generation.
    ///
    /// Generations come from one engine-wide counter, so a key that is
    /// deleted and written again can never reuse a generation that a stale
    /// timer is still holding.
    #[inline]
    fn supersede(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Inserts or replaces the entry for `key`.
    ///
    /// Any pending expiry for an earlier write to the same key becomes stale.
    /// With a `ttl`, a removal is scheduled for the new generation.
    ///
    /// Returns the generation installed.
    pub fn put(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> u64 {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        // A deadline too far out to represent never arrives; store it as none.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));

        let generation = {
            let mut data = self.get_shard(&key).write();
            let generation = self.supersede();
            let previous = data.insert(
                key.clone(),
                Entry {
                    value,
                    expires_at,
                    generation,
                },
            );
            if previous.is_none() {
                self.key_count.fetch_add(1, Ordering::Relaxed);
            }
            generation
        };

        if let (Some(deadline), Some(tx)) = (expires_at, self.expirations.get()) {
            // A closed channel means the manager stopped; lazy expiry still applies.
            let _ = tx.send(Expiration {
                deadline,
                key,
                generation,
            });
        }

        generation
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired
    /// entries found here are removed.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = shard.write();
        if let Some(entry) = data.get(key) {
            if entry.is_expired() {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            // Overwritten between the two locks
            return Some(entry.value.clone());
        }

        None
    }

    /// Gets the full entry for a key, or None if absent or expired.
    pub fn get_entry(&self, key: &Bytes) -> Option<Entry> {
        let data = self.get_shard(key).read();
        data.get(key).filter(|e| !e.is_expired()).cloned()
    }

    /// Deletes a key. Idempotent.
    ///
    /// Returns `true` if the key was present.
    pub fn remove(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(key).write();
        if data.remove(key).is_some() {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Deletes a key only if it still holds the entry written by `generation`.
    ///
    /// This is what a firing expiry calls. The check and the delete happen
    /// under one shard write lock, so a concurrent `put` either lands before
    /// (and the generation no longer matches) or after (and survives).
    pub fn remove_if_current(&self, key: &Bytes, generation: u64) -> bool {
        let mut data = self.get_shard(key).write();
        match data.get(key) {
            Some(entry) if entry.generation == generation => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                trace!(generation, "Expired key removed");
                true
            }
            _ => false,
        }
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &Bytes) -> bool {
        let data = self.get_shard(key).read();
        data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Returns the approximate number of stored keys, including expired
    /// entries not yet removed.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if the engine holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_and_get() {
        let engine = StorageEngine::new();

        engine.put(Bytes::from("key"), Bytes::from("value"), None);
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("value")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(&Bytes::from("nonexistent")), None);
    }

    #[test]
    fn test_put_replaces() {
        let engine = StorageEngine::new();

        engine.put(Bytes::from("key"), Bytes::from("v1"), None);
        engine.put(Bytes::from("key"), Bytes::from("v2"), None);

        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("v2")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let engine = StorageEngine::new();

        engine.put(Bytes::from("Key"), Bytes::from("upper"), None);
        engine.put(Bytes::from("key"), Bytes::from("lower"), None);

        assert_eq!(engine.get(&Bytes::from("Key")), Some(Bytes::from("upper")));
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("lower")));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let engine = StorageEngine::new();

        engine.put(Bytes::from("key"), Bytes::from("value"), None);
        assert!(engine.remove(&Bytes::from("key")));
        assert!(!engine.remove(&Bytes::from("key")));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_lazy_expiry() {
        let engine = StorageEngine::new();

        engine.put(
            Bytes::from("key"),
            Bytes::from("value"),
            Some(Duration::from_millis(50)),
        );
        assert!(engine.exists(&Bytes::from("key")));

        thread::sleep(Duration::from_millis(100));

        assert!(!engine.exists(&Bytes::from("key")));
        assert_eq!(engine.get(&Bytes::from("key")), None);
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_zero_ttl_is_immediately_absent() {
        let engine = StorageEngine::new();

        engine.put(Bytes::from("key"), Bytes::from("value"), Some(Duration::ZERO));
        assert_eq!(engine.get(&Bytes::from("key")), None);
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let engine = StorageEngine::new();

        engine.put(
            Bytes::from("key"),
            Bytes::from("value"),
            Some(Duration::from_millis(u64::MAX)),
        );
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("value")));
    }

    #[test]
    fn test_generations_increase() {
        let engine = StorageEngine::new();

        let g1 = engine.put(Bytes::from("a"), Bytes::from("1"), None);
        let g2 = engine.put(Bytes::from("b"), Bytes::from("2"), None);
        let g3 = engine.put(Bytes::from("a"), Bytes::from("3"), None);

        assert!(g1 < g2 && g2 < g3);
        assert_eq!(engine.get_entry(&Bytes::from("a")).unwrap().generation, g3);
    }

    #[test]
    fn test_remove_if_current() {
        let engine = StorageEngine::new();
        let key = Bytes::from("key");

        let stale = engine.put(key.clone(), Bytes::from("v1"), None);
        let current = engine.put(key.clone(), Bytes::from("v2"), None);

        // The first write's removal must not touch the second write
        assert!(!engine.remove_if_current(&key, stale));
        assert_eq!(engine.get(&key), Some(Bytes::from("v2")));

        assert!(engine.remove_if_current(&key, current));
        assert_eq!(engine.get(&key), None);

        // Nothing left to remove
        assert!(!engine.remove_if_current(&key, current));
    }

    #[test]
    fn test_rewrite_after_remove_gets_new_generation() {
        let engine = StorageEngine::new();
        let key = Bytes::from("key");

        let first = engine.put(key.clone(), Bytes::from("v1"), None);
        engine.remove(&key);
        engine.put(key.clone(), Bytes::from("v2"), None);

        assert!(!engine.remove_if_current(&key, first));
        assert_eq!(engine.get(&key), Some(Bytes::from("v2")));
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.put(Bytes::from("a"), Bytes::from("1"), None);
        engine.get(&Bytes::from("a"));
        engine.get(&Bytes::from("b"));
        engine.remove(&Bytes::from("a"));

        let stats = engine.stats();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.set_ops, 1);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for t in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let key = Bytes::from(format!("key:{}:{}", t, i));
                    let value = Bytes::from(format!("value:{}:{}", t, i));
                    engine.put(key.clone(), value.clone(), None);
                    assert_eq!(engine.get(&key), Some(value));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 10_000);
    }
}

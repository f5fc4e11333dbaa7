//! Background Expiry Manager
//!
//! Keys written with a TTL are removed by a single background task once
//! their deadline passes. This is "active expiry"; `StorageEngine::get`
//! additionally hides expired entries on access ("lazy expiry").
//!
//! ## Design
//!
//! The manager runs as one Tokio task that:
//! 1. Receives `(deadline, key, generation)` schedules from `StorageEngine::put`
//! 2. Keeps at most one per key, ordered by deadline
//! 3. Sleeps until the earliest deadline (or a new schedule arrives)
//! 4. Removes each due key only if its stored generation still matches
//!
//! ## Overwrites
//!
//! When a key is written again it gets a new generation. A newer schedule
//! for the key replaces the older one, so rewriting one key many times
//! keeps a single pending entry. A write without a TTL sends nothing; the
//! older schedule still fires, finds a different generation, and does
//! nothing. So `SET k v1 PX 50` followed by `SET k v2` keeps `v2` forever.

use crate::storage::StorageEngine;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// A scheduled removal for one write of one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiration {
    /// When the removal is due
    pub deadline: Instant,
    /// Generation of the write this removal belongs to
    pub generation: u64,
    /// The key to remove
    pub key: Bytes,
}

/// Pending removals, at most one per key.
#[derive(Debug, Default)]
struct Schedule {
    by_deadline: BTreeSet<Expiration>,
    by_key: HashMap<Bytes, (Instant, u64)>,
}

impl Schedule {
    /// Adds `expiration`, replacing any older one for the same key.
    ///
    /// Returns false if a newer generation is already scheduled; schedules
    /// from concurrent writers can arrive out of order.
    fn insert(&mut self, expiration: Expiration) -> bool {
        if let Some(&(deadline, generation)) = self.by_key.get(&expiration.key) {
            if generation >= expiration.generation {
                return false;
            }
            self.by_deadline.remove(&Expiration {
                deadline,
                generation,
                key: expiration.key.clone(),
            });
        }

        self.by_key.insert(
            expiration.key.clone(),
            (expiration.deadline, expiration.generation),
        );
        self.by_deadline.insert(expiration);
        true
    }

    /// Removes and returns the earliest schedule if it is due at `now`.
    fn pop_due(&mut self, now: Instant) -> Option<Expiration> {
        if self.by_deadline.first()?.deadline > now {
            return None;
        }
        let expiration = self.by_deadline.pop_first()?;
        self.by_key.remove(&expiration.key);
        Some(expiration)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.first().map(|e| e.deadline)
    }

    fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// A handle to the running expiry manager.
///
/// When this handle is dropped, the background task is stopped. Keys still
/// expire lazily on access afterwards.
#[derive(Debug)]
pub struct ExpiryManager {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpiryManager {
    /// Starts the expiry manager for `engine` as a background task.
    ///
    /// Must be called from within a Tokio runtime. An engine can only be
    /// attached to one manager; a second call logs a warning and returns a
    /// handle to a task that exits immediately.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use pulsekv::storage::{ExpiryManager, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let manager = ExpiryManager::start(Arc::clone(&engine));
    ///
    /// // Keys written with a TTL are now removed in the background...
    ///
    /// drop(manager);
    /// ```
    pub fn start(engine: Arc<StorageEngine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::unbounded_channel();

        if engine.attach_expiry(tx) {
            tokio::spawn(expiry_loop(Arc::downgrade(&engine), rx, shutdown_rx));
            info!("Background expiry manager started");
        } else {
            warn!("Storage engine already has an expiry manager attached");
        }

        Self { shutdown_tx }
    }

    /// Stops the expiry manager.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry manager stopped");
        }
    }
}

impl Drop for ExpiryManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main expiry loop.
///
/// Holds only a weak reference to the engine so it never keeps the
/// keyspace alive on its own.
async fn expiry_loop(
    engine: Weak<StorageEngine>,
    mut schedules: mpsc::UnboundedReceiver<Expiration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut pending = Schedule::default();

    loop {
        let wake_at = pending.next_deadline();

        tokio::select! {
            scheduled = schedules.recv() => match scheduled {
                Some(expiration) => {
                    let generation = expiration.generation;
                    if pending.insert(expiration) {
                        trace!(generation, pending = pending.len(), "Expiry scheduled");
                    }
                }
                None => {
                    debug!("Storage engine dropped, expiry manager exiting");
                    return;
                }
            },
            _ = sleep_until(wake_at) => {
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                let (fired, removed) = fire_due(&engine, &mut pending);
                if fired > 0 {
                    debug!(
                        fired = fired,
                        removed = removed,
                        stale = fired - removed,
                        keys_remaining = engine.len(),
                        "Expiry timers fired"
                    );
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry manager received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Pops every due schedule and removes keys whose generation is current.
///
/// Returns `(fired, removed)`.
fn fire_due(engine: &StorageEngine, pending: &mut Schedule) -> (usize, usize) {
    let now = Instant::now();
    let mut fired = 0;
    let mut removed = 0;

    while let Some(expiration) = pending.pop_due(now) {
        fired += 1;
        if engine.remove_if_current(&expiration.key, expiration.generation) {
            removed += 1;
        }
    }

    (fired, removed)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Starts the expiry manager.
///
/// Convenience wrapper around [`ExpiryManager::start`].
pub fn start_expiry_manager(engine: Arc<StorageEngine>) -> ExpiryManager {
    ExpiryManager::start(engine)
}

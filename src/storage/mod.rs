//! Storage Engine Module
//!
//! The in-memory keyspace and the background task that expires keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └──────────────┬──────────────────────────────▲───────────────┘
//!                │ (deadline, key, generation)  │ remove_if_current
//!                ▼                              │
//!              ┌────────────────────────────────┴──┐
//!              │          ExpiryManager            │
//!              │     (Background Tokio Task)       │
//!              └───────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use pulsekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.put(Bytes::from("name"), Bytes::from("Nora"), None);
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Nora")));
//!
//! // Expires after an hour
//! engine.put(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{start_expiry_manager, Expiration, ExpiryManager};

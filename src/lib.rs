//! # PulseKV - A Small In-Memory Key-Value Server
//!
//! PulseKV speaks a subset of the Redis Serialization Protocol over TCP and
//! keeps everything in memory. It supports four commands: `PING`, `ECHO`,
//! `GET` and `SET` with an optional `PX` expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PulseKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │              StorageEngine                   │   │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpiryManager                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pulsekv::storage::{StorageEngine, start_expiry_manager};
//! use pulsekv::connection::ConnectionStats;
//! use pulsekv::server::accept_loop;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _expiry = start_expiry_manager(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("0.0.0.0:6379").await.unwrap();
//!     accept_loop(listener, storage, stats).await;
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request parser and reply types
//! - [`storage`]: Sharded keyspace and the expiry manager
//! - [`commands`]: Command dispatch
//! - [`connection`]: Per-client connection loop
//! - [`server`]: TCP accept loop
//! - [`config`]: Command-line configuration
//!
//! ## Expiry
//!
//! Keys written with `PX` are removed by a background task when their
//! deadline passes and are hidden on access if the task has not got to them
//! yet. Rewriting a key gives it a new generation, so a removal scheduled
//! for an older write can never delete the newer value.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::{Config, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionError, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::{start_expiry_manager, ExpiryManager, StorageEngine};

/// Version of PulseKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

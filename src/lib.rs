// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! cachesync - Client-Side Data Synchronization & Caching Engine
//!
//! Keeps a local in-memory cache consistent with a remote system of record
//! under concurrent local and remote mutations. Four components:
//!
//! - [`cache::CacheStore`] - TTL- and tag-indexed key/value store
//! - [`resolver`] - pluggable conflict resolution (server wins, client wins,
//!   shallow merge, or an async ask-user hook)
//! - [`consistency::ConsistencyChecker`] - on-demand cache/remote audit
//! - [`coordinator::SyncRegistry`] - per-resource reconciliation cycles,
//!   periodic timers, and the pending-change queue
//!
//! The remote side is abstract: implement [`remote::RemoteDataSource`] over
//! whatever transport the application uses. State is process-memory only;
//! pending changes do not survive a restart.
//!
//! ```rust,ignore
//! use cachesync::{CacheStore, InMemoryRemote, SyncConfig, SyncRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SyncRegistry::new(
//!     Arc::new(CacheStore::new()),
//!     Arc::new(InMemoryRemote::new()),
//! ));
//! registry.init_sync(SyncConfig::new("orders", "id").with_poll_interval_ms(5000))?;
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod consistency;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod remote;
pub mod resolver;

// Re-export commonly used items
pub use cache::{CacheStats, CacheStore, ClockFn};
pub use consistency::ConsistencyChecker;
pub use coordinator::SyncRegistry;
pub use error::{Result, SyncError};
pub use models::{
    cache_key, ChangeOperation, Conflict, ConflictKind, ConflictStrategy, ConsistencyReport,
    Inconsistency, PendingChange, RemoteRecord, SyncConfig, SyncState, SyncStatus,
};
pub use remote::{FileRemote, InMemoryRemote, RemoteDataSource};
pub use resolver::ResolutionHook;

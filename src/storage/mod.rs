//! Storage backends for alarm definitions, the active set and history
//!
//! This module provides a trait-based abstraction over the durable side of
//! the alarm engine.
//!
//! ## Design
//!
//! - **Trait-based**: `AlarmStore` allows swapping implementations
//! - **Async**: all operations are async for compatibility with the
//!   evaluator actors
//! - **Transactional transitions**: an Activate/Clear and its history
//!   entry commit together, never separately
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database, durable across restarts
//! - **In-Memory**: no persistence, for tests and ephemeral deployments

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{AlarmStore, HealthStatus, HistoryQuery, MAX_HISTORY_PAGE_SIZE};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStore;

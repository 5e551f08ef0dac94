//! # rostersync-core
//!
//! Shared types for the roster/season synchronization engine: the error
//! taxonomy used across all sync crates, the sync/entity enums, and the
//! per-run counters and structured item errors.

pub mod error;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use types::{
    ConflictKind, EntityKind, ItemError, Resolution, RunStatus, SyncCounts, SyncType,
};

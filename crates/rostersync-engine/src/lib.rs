//! # rostersync-engine
//!
//! The sync engine proper: per-record reconciliation against the host's
//! roster tables, run orchestration with a persisted mutual-exclusion
//! guard, and the service surface the host application consumes.
//!
//! The engine depends only on seams: [`SyncStore`](rostersync_store::SyncStore)
//! for persistence, [`RegistryFactory`](rostersync_registry::RegistryFactory)
//! for remote access and [`LocalRoster`] for the host's own tables.

pub mod local;
pub mod orchestrator;
pub mod reconcile;
pub mod service;

pub use local::{normalize_name, LocalRecord, LocalRoster};
pub use orchestrator::{SyncOrchestrator, DEFAULT_RUN_TIMEOUT_SECS};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use service::{ConnectionTest, SyncService, SyncStatus, MAX_LOG_PAGE_SIZE};

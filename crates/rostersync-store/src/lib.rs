//! # rostersync-store
//!
//! Persistence for everything the sync engine owns: per-organization sync
//! configuration with encrypted credentials, local-to-remote identity
//! mappings, sync run history and quarantined conflicts.
//!
//! The engine consumes the [`SyncStore`] trait; [`PgSyncStore`] is the
//! Postgres implementation, built from the per-concern stores in this crate.
//! Schema DDL lives under `migrations/`.

pub mod config;
pub mod conflict;
pub mod crypto;
pub mod mapping;
pub mod run;
pub mod store;

pub use config::{ConfigStore, OrgSyncConfig, SaveConfig, SyncFrequency};
pub use conflict::{ConflictStore, NewConflict, SyncConflict};
pub use crypto::CredentialCipher;
pub use mapping::{EntityMapping, MappingStore};
pub use run::{RunStore, SyncRun};
pub use store::{PgSyncStore, SyncStore};

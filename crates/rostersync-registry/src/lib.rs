//! # rostersync-registry
//!
//! Low-level HTTP access to the remote organization registry: token-based
//! auth lifecycle, list/point lookups for groups, contacts and seasons,
//! paginated/batched contact resolution, response-shape normalization and
//! error classification.
//!
//! The registry speaks JSON but with loose shapes: point lookups come back
//! as one-element arrays, list endpoints sometimes return a bare object or
//! nothing at all, and the season field on membership rows goes by three
//! different names depending on the deployment. [`record`] normalizes all of
//! that in one place so the rest of the engine never sees raw payloads.
//!
//! [`RegistryClient`] is the real implementation; the [`RegistryApi`] trait
//! is the seam test doubles are substituted through, and
//! [`HttpRegistryFactory`] builds a client per organization from decrypted
//! credentials.

pub mod api;
pub mod client;
pub mod config;
pub mod record;
pub mod session;

pub use api::{HttpRegistryFactory, RegistryApi, RegistryFactory};
pub use client::{RegistryClient, CONTACT_BATCH_LIMIT};
pub use config::{RegistryConfig, RegistryCredentials};
pub use record::{ListPage, MembershipRow, RemoteContact, RemoteGroup, RemoteSeason};
pub use session::{Session, REFRESH_BUFFER_SECS};

// Re-export async_trait for api implementors
pub use async_trait::async_trait;

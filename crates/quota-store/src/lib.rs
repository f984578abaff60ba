//! Node storage boundary for tree quota accounting.
//!
//! The quota engine never owns the document tree. It talks to whatever hosts
//! the tree through the [`NodeStore`] trait: node lookups, parent links,
//! children, and per-node [`QuotaMetadata`](quota_types::QuotaMetadata).
//!
//! # Storage Backends
//!
//! - [`InMemoryNodeStore`] -- `HashMap`-based store for tests, embedding,
//!   and the CLI
//!
//! # Design Rules
//!
//! 1. Metadata is only readable and writable on quota-aware nodes; a node
//!    becomes quota-aware through the idempotent
//!    [`NodeStore::ensure_quota_capability`].
//! 2. Read-modify-write of one node's metadata is atomic
//!    ([`NodeStore::modify_quota_metadata`]). Nothing spans several nodes.
//! 3. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryNodeStore;
pub use snapshot::StoreSnapshot;
pub use traits::NodeStore;

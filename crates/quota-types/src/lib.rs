//! Foundation types for hierarchical quota accounting.
//!
//! This crate provides the identity, tree, and size-bookkeeping types shared
//! by the node store and the quota engine. Every other crate in the workspace
//! depends on `quota-types`.
//!
//! # Key Types
//!
//! - [`NodeId`] -- Opaque node identity (UUID v7 for freshly generated nodes)
//! - [`Node`] -- A tree node as seen by the quota engine
//! - [`QuotaMetadata`] -- Per-node inner/total/trash/versions sizes and limit
//! - [`SizeDelta`] -- Signed size change produced by one event
//! - [`OperationKind`] -- The abstract size-affecting operation
//! - [`QuotaExceeded`] -- The signal raised when a limit would be breached

pub mod delta;
pub mod error;
pub mod id;
pub mod metadata;
pub mod node;
pub mod signal;

pub use delta::{signed, OperationKind, SizeDelta};
pub use error::TypeError;
pub use id::NodeId;
pub use metadata::QuotaMetadata;
pub use node::Node;
pub use signal::QuotaExceeded;

//! # quota-engine
//!
//! Event-driven storage quota accounting for hierarchical document trees.
//!
//! The host repository reports lifecycle events (a document was created,
//! moved, modified, trashed, ...). [`QuotaEngine::process`] classifies each
//! event, turns it into a size delta, and applies that delta to the target
//! node and every ancestor below the root, enforcing each node's
//! `max_size` on the way. A change that would push any node past its limit
//! fails with [`QuotaError::QuotaExceeded`] so the host can abort it.
//!
//! ```
//! use std::sync::Arc;
//! use quota_engine::{LifecycleEvent, QuotaEngine};
//! use quota_store::{InMemoryNodeStore, NodeStore};
//! use quota_types::{Node, NodeId};
//!
//! let root = NodeId::parse("root").unwrap();
//! let folder = NodeId::parse("folder").unwrap();
//! let doc = NodeId::parse("doc").unwrap();
//!
//! let store = Arc::new(InMemoryNodeStore::with_root(root.clone()));
//! store.insert_node(Node::child(folder.clone(), root, "folder", 0)).unwrap();
//! store.set_max_size(&folder, Some(1000)).unwrap();
//!
//! let engine = QuotaEngine::new(store.clone());
//! store.insert_node(Node::child(doc.clone(), folder.clone(), "doc", 400)).unwrap();
//! engine.process(&LifecycleEvent::created(doc)).unwrap();
//!
//! let stats = store.read_quota_metadata(&folder).unwrap().unwrap();
//! assert_eq!(stats.total_size, 400);
//! ```

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
mod handlers;
pub mod hooks;
pub mod recompute;
pub mod updater;
pub mod walker;

pub use classify::{classify, QuotaOperation, TrashDirection};
pub use config::{QuotaConfig, TrackingScope};
pub use engine::{ProcessOutcome, QuotaEngine, SkipReason};
pub use error::{ErrorKind, QuotaError, QuotaResult};
pub use event::{names, EventContext, EventOrigin, LifecycleEvent};
pub use hooks::{LoggingHook, NoOpHook, QuotaExceededHook};
pub use recompute::{compute_subtree, recompute_subtree, RecomputeReport};
pub use updater::SizeUpdater;
pub use walker::{AncestorWalkError, AncestorWalker, WalkFailure};

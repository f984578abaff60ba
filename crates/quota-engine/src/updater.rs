//! Size propagation with limit enforcement.
//!
//! [`SizeUpdater::apply`] is the core algorithm: update the originating node,
//! then every ancestor root-ward, checking each node's limit as its metadata
//! is modified.
//!
//! # Failure model
//!
//! - The ancestor chain is read in full before the first write, so a broken
//!   walk fails the update with nothing written.
//! - The originating node is checked before anything is persisted. If its
//!   own limit is breached, no node changes.
//! - A breach at an ancestor stops the walk. Ancestors updated before it
//!   keep the delta; the caller aborts the triggering content change and
//!   the compensating event that follows restores consistency.

use quota_store::NodeStore;
use quota_types::{Node, NodeId, QuotaMetadata, QuotaExceeded, SizeDelta};
use tracing::{debug, warn};

use crate::error::QuotaResult;
use crate::walker::AncestorWalker;

/// Applies [`SizeDelta`]s to nodes and their ancestor chains.
pub struct SizeUpdater<'a, S: ?Sized> {
    store: &'a S,
    walker: AncestorWalker<'a, S>,
}

impl<'a, S: NodeStore + ?Sized> SizeUpdater<'a, S> {
    pub fn new(store: &'a S, max_walk_depth: usize) -> Self {
        Self {
            store,
            walker: AncestorWalker::new(store, max_walk_depth),
        }
    }

    /// The walker this updater resolves chains with.
    pub fn walker(&self) -> &AncestorWalker<'a, S> {
        &self.walker
    }

    /// Apply `delta` to `node` (inner and total) and to every ancestor
    /// (total only). Returns the touched nodes, originating node first.
    pub fn apply(&self, node: &NodeId, delta: &SizeDelta) -> QuotaResult<Vec<NodeId>> {
        let chain = self
            .walker
            .ancestors_of(node)
            .map_err(|e| e.into_quota_error(node))?;
        self.update_checked(node, delta)?;
        let mut touched = vec![node.clone()];
        touched.extend(self.propagate(&chain, delta)?);
        Ok(touched)
    }

    /// Apply `delta` to the ancestors of `node` only.
    pub fn apply_to_ancestors(&self, node: &NodeId, delta: &SizeDelta) -> QuotaResult<Vec<NodeId>> {
        let chain = self
            .walker
            .ancestors_of(node)
            .map_err(|e| e.into_quota_error(node))?;
        self.propagate(&chain, delta)
    }

    /// Apply the ancestor view of `delta` to each node of `chain`, in order.
    pub fn propagate(&self, chain: &[Node], delta: &SizeDelta) -> QuotaResult<Vec<NodeId>> {
        let ancestor_delta = delta.for_ancestor();
        let mut touched = Vec::with_capacity(chain.len());
        for ancestor in chain {
            self.update_checked(&ancestor.id, &ancestor_delta)?;
            touched.push(ancestor.id.clone());
        }
        Ok(touched)
    }

    /// Apply a correction along `chain` without checking limits.
    ///
    /// Used after recomputing statistics: the correction reconciles the
    /// books with content that already exists, so it is never rejected.
    pub fn adjust(&self, chain: &[Node], delta: &SizeDelta) -> QuotaResult<()> {
        let ancestor_delta = delta.for_ancestor();
        for ancestor in chain {
            self.store.ensure_quota_capability(&ancestor.id)?;
            let stored = self
                .store
                .modify_quota_metadata(&ancestor.id, &mut |meta: &mut QuotaMetadata| {
                    meta.apply(&ancestor_delta);
                    true
                })?;
            debug!(node = %ancestor.id, total = stored.total_size, "adjusted size");
        }
        Ok(())
    }

    /// Modify one node's metadata atomically, committing only if the node
    /// stays within its limit.
    fn update_checked(&self, id: &NodeId, delta: &SizeDelta) -> QuotaResult<QuotaMetadata> {
        self.store.ensure_quota_capability(id)?;

        let mut exceeded: Option<QuotaExceeded> = None;
        let mut clamped = false;
        let stored = self
            .store
            .modify_quota_metadata(id, &mut |meta: &mut QuotaMetadata| {
                exceeded = None;
                clamped = meta.apply(delta);
                match meta.check_limit(id, delta) {
                    Ok(()) => true,
                    Err(signal) => {
                        exceeded = Some(signal);
                        false
                    }
                }
            })?;

        if let Some(signal) = exceeded {
            debug!(node = %id, attempted = signal.attempted_total, limit = signal.limit, "limit check failed");
            return Err(signal.into());
        }
        if clamped {
            warn!(node = %id, delta = delta.total, "size bucket went negative; clamped to zero");
        }
        debug!(
            node = %id,
            operation = %delta.operation,
            delta = delta.total,
            total = stored.total_size,
            "applied size delta"
        );
        Ok(stored)
    }
}

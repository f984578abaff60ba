//! One handler per [`QuotaOperation`].
//!
//! Each handler turns the operation into a [`SizeDelta`] and hands it to the
//! [`SizeUpdater`](crate::updater::SizeUpdater). Everything a handler reads
//! is read before its first write.

use std::collections::HashSet;

use quota_store::NodeStore;
use quota_types::{signed, Node, NodeId, OperationKind, QuotaMetadata, SizeDelta};
use tracing::debug;

use crate::classify::{QuotaOperation, TrashDirection};
use crate::engine::QuotaEngine;
use crate::error::{QuotaError, QuotaResult};
use crate::event::names;
use crate::recompute::{compute_subtree, write_stats};

impl<S: NodeStore + ?Sized> QuotaEngine<S> {
    pub(crate) fn dispatch(&self, op: &QuotaOperation, node: &Node) -> QuotaResult<Vec<NodeId>> {
        match op {
            QuotaOperation::Created => self.on_created(node),
            QuotaOperation::Removed { version: false } => self.on_removed(node),
            QuotaOperation::Removed { version: true } => self.on_version_removed(node),
            QuotaOperation::Copied => self.on_copied(node),
            QuotaOperation::Moved { source_parent } => self.on_moved(node, source_parent),
            QuotaOperation::BeforeUpdate | QuotaOperation::BeforeRestore => {
                self.capture_size(node)
            }
            QuotaOperation::Updated => self.on_content_changed(node, OperationKind::Updated),
            QuotaOperation::Restored => self.on_content_changed(node, OperationKind::Restored),
            QuotaOperation::CheckedIn { version } => self.on_checked_in(node, version.as_ref()),
            QuotaOperation::CheckedOut => Ok(Vec::new()),
            QuotaOperation::TrashTransition(direction) => self.on_trash_transition(node, *direction),
        }
    }

    fn on_created(&self, node: &Node) -> QuotaResult<Vec<NodeId>> {
        let bytes = signed(node.content_size);
        let mut delta = SizeDelta::content(node.id.clone(), OperationKind::Created, bytes);
        if node.trashed {
            delta = delta.with_trash(bytes);
        }
        self.updater().apply(&node.id, &delta)
    }

    /// The node is still in the tree; its own metadata already covers the
    /// whole subtree, so only the ancestors need updating.
    fn on_removed(&self, node: &Node) -> QuotaResult<Vec<NodeId>> {
        self.release_captures(&node.id)?;
        let Some(meta) = self.store().read_quota_metadata(&node.id)? else {
            return Ok(Vec::new());
        };
        let delta = subtree_delta(&node.id, OperationKind::Removed, &meta).negated();
        self.updater().apply_to_ancestors(&node.id, &delta)
    }

    fn on_version_removed(&self, version: &Node) -> QuotaResult<Vec<NodeId>> {
        if !self.config().include_versions {
            return Ok(Vec::new());
        }
        let Some(live_id) = &version.version_of else {
            return Ok(Vec::new());
        };
        let live = match self.store().get_node(live_id)? {
            Some(live) if !live.is_root() => live,
            _ => {
                debug!(version = %version.id, live = %live_id, "live document gone; nothing to release");
                return Ok(Vec::new());
            }
        };
        let delta = SizeDelta::versions(
            live.id.clone(),
            OperationKind::Removed,
            -signed(version.content_size),
        );
        self.updater().apply(&live.id, &delta)
    }

    /// A copied subtree arrives with whatever metadata the copy carried
    /// over, so it is rebuilt from content before the ancestors see it.
    fn on_copied(&self, copy_root: &Node) -> QuotaResult<Vec<NodeId>> {
        self.adopt_subtree(copy_root, OperationKind::Copied)
    }

    /// Account for a subtree no ancestor has counted yet: rebuild its
    /// statistics, check every limit inside it, write them, then add the
    /// subtree total to the whole ancestor chain.
    fn adopt_subtree(&self, root: &Node, operation: OperationKind) -> QuotaResult<Vec<NodeId>> {
        let stats = compute_subtree(
            self.store().as_ref(),
            &root.id,
            self.config().include_versions,
        )?;
        let root_meta = stats.get(&root.id).cloned().unwrap_or_default();
        let delta = subtree_delta(&root.id, operation, &root_meta);
        root_meta.check_limit(&root.id, &delta)?;
        for (id, meta) in stats.iter().filter(|(id, _)| *id != &root.id) {
            meta.check_limit(id, &subtree_delta(id, operation, meta))?;
        }

        let updater = self.updater();
        let chain = updater
            .walker()
            .ancestors_of(&root.id)
            .map_err(|e| e.into_quota_error(&root.id))?;

        write_stats(self.store().as_ref(), &stats)?;
        let mut touched = vec![root.id.clone()];
        touched.extend(stats.keys().filter(|id| *id != &root.id).cloned());
        touched.extend(updater.propagate(&chain, &delta)?);
        Ok(touched)
    }

    /// The subtree is added to the new chain before it is released from the
    /// old one, so a rejected move never leaves space unaccounted.
    ///
    /// A subtree that was never tracked (it lived outside every quota-aware
    /// subtree) has nothing to release; it is adopted like a copy.
    fn on_moved(&self, node: &Node, source_parent: &NodeId) -> QuotaResult<Vec<NodeId>> {
        let Some(meta) = self.store().read_quota_metadata(&node.id)? else {
            return self.adopt_subtree(node, OperationKind::Moved);
        };
        let delta = subtree_delta(&node.id, OperationKind::Moved, &meta);

        let updater = self.updater();
        let walker = updater.walker();
        let new_chain = walker
            .ancestors_of(&node.id)
            .map_err(|e| e.into_quota_error(&node.id))?;
        let old_chain = walker
            .self_and_ancestors(source_parent)
            .map_err(|e| e.into_quota_error(source_parent))?;

        let new_ids: HashSet<&NodeId> = new_chain.iter().map(|n| &n.id).collect();
        let old_ids: HashSet<&NodeId> = old_chain.iter().map(|n| &n.id).collect();
        let gained: Vec<Node> = new_chain
            .iter()
            .filter(|n| !old_ids.contains(&n.id))
            .cloned()
            .collect();
        let lost: Vec<Node> = old_chain
            .iter()
            .filter(|n| !new_ids.contains(&n.id))
            .cloned()
            .collect();

        let mut touched = updater.propagate(&gained, &delta)?;
        touched.extend(updater.propagate(&lost, &delta.negated())?);
        Ok(touched)
    }

    fn capture_size(&self, node: &Node) -> QuotaResult<Vec<NodeId>> {
        self.pending()?.insert(node.id.clone(), node.content_size);
        debug!(node = %node.id, size = node.content_size, "captured size before change");
        Ok(Vec::new())
    }

    /// Drop captured sizes for a subtree that is going away.
    fn release_captures(&self, root: &NodeId) -> QuotaResult<()> {
        if self.pending()?.is_empty() {
            return Ok(());
        }
        let mut doomed = HashSet::from([root.clone()]);
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            for child in self.store().children(&id)? {
                if doomed.insert(child.id.clone()) {
                    stack.push(child.id);
                }
            }
        }
        let mut pending = self.pending()?;
        pending.retain(|id, _| !doomed.contains(id));
        Ok(())
    }

    fn on_content_changed(&self, node: &Node, operation: OperationKind) -> QuotaResult<Vec<NodeId>> {
        let captured = self.pending()?.remove(&node.id);
        let previous = match captured {
            Some(size) => size,
            None => self
                .store()
                .read_quota_metadata(&node.id)?
                .map(|meta| meta.inner_size)
                .unwrap_or(0),
        };
        let bytes = signed(node.content_size) - signed(previous);
        let mut delta = SizeDelta::content(node.id.clone(), operation, bytes);
        if node.trashed {
            delta = delta.with_trash(bytes);
        }
        self.updater().apply(&node.id, &delta)
    }

    fn on_checked_in(&self, node: &Node, version: Option<&NodeId>) -> QuotaResult<Vec<NodeId>> {
        if !self.config().include_versions {
            return Ok(Vec::new());
        }
        let version_id = version.ok_or_else(|| {
            QuotaError::invalid_event(names::DOCUMENT_CHECKED_IN, &node.id, "missing version node")
        })?;
        let version = self.store().node(version_id)?;
        let delta = SizeDelta::versions(
            node.id.clone(),
            OperationKind::CheckedIn,
            signed(version.content_size),
        );
        self.updater().apply(&node.id, &delta)
    }

    fn on_trash_transition(&self, node: &Node, direction: TrashDirection) -> QuotaResult<Vec<NodeId>> {
        let Some(meta) = self.store().read_quota_metadata(&node.id)? else {
            return Ok(Vec::new());
        };
        let bytes = signed(meta.inner_size);
        let bytes = match direction {
            TrashDirection::ToTrash => bytes,
            TrashDirection::FromTrash => -bytes,
        };
        let delta = SizeDelta::trash(node.id.clone(), OperationKind::TrashTransition, bytes);
        self.updater().apply(&node.id, &delta)
    }
}

/// The delta that carries a whole subtree, as summarised by its root's
/// metadata.
fn subtree_delta(root: &NodeId, operation: OperationKind, meta: &QuotaMetadata) -> SizeDelta {
    SizeDelta::subtree(
        root.clone(),
        operation,
        signed(meta.total_size),
        signed(meta.trash_size),
        signed(meta.versions_size),
    )
}

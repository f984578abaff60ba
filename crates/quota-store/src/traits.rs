use quota_types::{Node, NodeId, QuotaMetadata};

use crate::error::{StoreError, StoreResult};

/// The document tree as consumed by the quota engine.
///
/// All implementations must satisfy these invariants:
/// - Tree reads reflect the tree at call time. Callers never cache parent
///   links across calls.
/// - Metadata exists exactly on quota-aware nodes. Reading or writing the
///   metadata of a node without the capability fails with
///   [`StoreError::NotQuotaAware`].
/// - [`modify_quota_metadata`](Self::modify_quota_metadata) is atomic for a
///   single node (last writer wins at metadata granularity). There are no
///   multi-node transactions.
pub trait NodeStore: Send + Sync {
    /// Read a node by id.
    ///
    /// Returns `Ok(None)` if the node does not exist.
    fn get_node(&self, id: &NodeId) -> StoreResult<Option<Node>>;

    /// Direct children of a node, in a stable order.
    fn children(&self, id: &NodeId) -> StoreResult<Vec<Node>>;

    /// Version snapshots of a live document.
    fn versions(&self, id: &NodeId) -> StoreResult<Vec<Node>>;

    /// Read a node's quota metadata.
    ///
    /// Returns `Ok(None)` if the node is not quota-aware.
    fn read_quota_metadata(&self, id: &NodeId) -> StoreResult<Option<QuotaMetadata>>;

    /// Overwrite a quota-aware node's metadata.
    fn write_quota_metadata(&self, id: &NodeId, metadata: &QuotaMetadata) -> StoreResult<()>;

    /// Whether the node carries quota metadata.
    fn has_quota_capability(&self, id: &NodeId) -> StoreResult<bool>;

    /// Attach zeroed quota metadata to a node.
    ///
    /// Returns `true` if the capability was newly attached, `false` if the
    /// node was already quota-aware (existing metadata is left alone).
    fn attach_quota_capability(&self, id: &NodeId) -> StoreResult<bool>;

    /// Read a node that must exist.
    fn node(&self, id: &NodeId) -> StoreResult<Node> {
        self.get_node(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Read the parent of a node.
    ///
    /// Returns `Ok(None)` for nodes without a parent. A parent link that
    /// points at a missing node is a [`StoreError::DanglingParent`].
    fn get_parent(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        let node = self.node(id)?;
        let Some(parent_id) = node.parent else {
            return Ok(None);
        };
        match self.get_node(&parent_id)? {
            Some(parent) => Ok(Some(parent)),
            None => Err(StoreError::DanglingParent {
                node: node.id,
                parent: parent_id,
            }),
        }
    }

    /// Make a node quota-aware if it is not already. Idempotent.
    fn ensure_quota_capability(&self, id: &NodeId) -> StoreResult<()> {
        if !self.has_quota_capability(id)? {
            self.attach_quota_capability(id)?;
        }
        Ok(())
    }

    /// Atomically read, modify, and write one node's metadata.
    ///
    /// `update` receives the current metadata and returns `true` to commit
    /// its changes or `false` to discard them. Returns the metadata stored
    /// once the call completes.
    ///
    /// The default implementation is a plain read followed by a write;
    /// backends with concurrent writers must override it.
    fn modify_quota_metadata(
        &self,
        id: &NodeId,
        update: &mut dyn FnMut(&mut QuotaMetadata) -> bool,
    ) -> StoreResult<QuotaMetadata> {
        let current = self
            .read_quota_metadata(id)?
            .ok_or_else(|| StoreError::NotQuotaAware(id.clone()))?;
        let mut candidate = current.clone();
        if update(&mut candidate) {
            self.write_quota_metadata(id, &candidate)?;
            Ok(candidate)
        } else {
            Ok(current)
        }
    }
}

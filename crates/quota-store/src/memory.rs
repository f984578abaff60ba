use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use quota_types::{Node, NodeId, QuotaMetadata};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::snapshot::StoreSnapshot;
use crate::traits::NodeStore;

/// In-memory, HashMap-based node store.
///
/// Intended for tests, embedding, and the CLI. Nodes and metadata sit behind
/// separate `RwLock`s; metadata read-modify-write holds the metadata write
/// lock for the whole closure, which gives per-node atomicity.
///
/// Besides the [`NodeStore`] boundary it exposes host-side mutations
/// (insert, move, copy, remove, content changes) so callers can drive the
/// tree the way a document repository would before emitting events.
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<NodeId, Node>>,
    metadata: RwLock<HashMap<NodeId, QuotaMetadata>>,
}

impl InMemoryNodeStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store holding a single root node.
    pub fn with_root(root: NodeId) -> Self {
        let store = Self::new();
        store
            .nodes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(root.clone(), Node::root(root));
        store
    }

    /// Rebuild a store from a snapshot, validating parent links.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> StoreResult<Self> {
        snapshot.validate()?;
        let nodes = snapshot
            .nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        let metadata = snapshot.metadata.into_iter().collect();
        Ok(Self {
            nodes: RwLock::new(nodes),
            metadata: RwLock::new(metadata),
        })
    }

    /// Capture the full store contents, sorted by node id.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let mut nodes: Vec<Node> = self.nodes_read()?.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let metadata = self
            .metadata_read()?
            .iter()
            .map(|(id, meta)| (id.clone(), meta.clone()))
            .collect();
        Ok(StoreSnapshot { nodes, metadata })
    }

    /// Number of nodes, versions included.
    pub fn len(&self) -> usize {
        self.nodes_read().map(|nodes| nodes.len()).unwrap_or(0)
    }

    /// Returns `true` if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All tree roots, sorted by id.
    pub fn roots(&self) -> StoreResult<Vec<Node>> {
        let mut roots: Vec<Node> = self
            .nodes_read()?
            .values()
            .filter(|node| node.is_root())
            .cloned()
            .collect();
        roots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(roots)
    }

    // ---------------------------------------------------------------
    // Host-side mutation
    // ---------------------------------------------------------------

    /// Insert a node. Its parent (or live document, for versions) must exist.
    pub fn insert_node(&self, node: Node) -> StoreResult<()> {
        let mut nodes = self.nodes_write()?;
        if nodes.contains_key(&node.id) {
            return Err(StoreError::AlreadyExists(node.id));
        }
        if let Some(anchor) = node.parent.as_ref().or(node.version_of.as_ref()) {
            if !nodes.contains_key(anchor) {
                return Err(StoreError::DanglingParent {
                    node: node.id,
                    parent: anchor.clone(),
                });
            }
        }
        nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Replace a node's own content size.
    pub fn set_content_size(&self, id: &NodeId, content_size: u64) -> StoreResult<()> {
        let mut nodes = self.nodes_write()?;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        node.content_size = content_size;
        Ok(())
    }

    /// Move a node into or out of the trash.
    pub fn set_trashed(&self, id: &NodeId, trashed: bool) -> StoreResult<()> {
        let mut nodes = self.nodes_write()?;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        node.trashed = trashed;
        Ok(())
    }

    /// Re-parent a node. Returns the previous parent.
    pub fn move_node(&self, id: &NodeId, new_parent: &NodeId) -> StoreResult<Option<NodeId>> {
        let mut nodes = self.nodes_write()?;
        if !nodes.contains_key(new_parent) {
            return Err(StoreError::NotFound(new_parent.clone()));
        }
        // Refuse to move a node under itself or one of its descendants.
        let mut cursor = Some(new_parent.clone());
        while let Some(current) = cursor {
            if &current == id {
                return Err(StoreError::Cycle(id.clone()));
            }
            cursor = nodes.get(&current).and_then(|n| n.parent.clone());
        }
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(node.parent.replace(new_parent.clone()))
    }

    /// Deep-copy a subtree under `new_parent`, metadata included.
    ///
    /// Every copied node gets a freshly generated id. Versions are not
    /// copied. Returns the id of the new subtree root.
    pub fn copy_subtree(&self, source: &NodeId, new_parent: &NodeId) -> StoreResult<NodeId> {
        let mut nodes = self.nodes_write()?;
        let mut metadata = self.metadata_write()?;
        if !nodes.contains_key(new_parent) {
            return Err(StoreError::NotFound(new_parent.clone()));
        }
        let root = nodes
            .get(source)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(source.clone()))?;

        let mut copies = Vec::new();
        let mut pending = vec![(root, new_parent.clone())];
        let mut copy_root = None;
        while let Some((original, parent)) = pending.pop() {
            let copy_id = NodeId::generate();
            if copy_root.is_none() {
                copy_root = Some(copy_id.clone());
            }
            for child in nodes.values().filter(|n| n.parent.as_ref() == Some(&original.id)) {
                pending.push((child.clone(), copy_id.clone()));
            }
            if let Some(meta) = metadata.get(&original.id).cloned() {
                metadata.insert(copy_id.clone(), meta);
            }
            copies.push(Node {
                id: copy_id,
                parent: Some(parent),
                ..original
            });
        }
        for copy in copies {
            nodes.insert(copy.id.clone(), copy);
        }
        debug!(source = %source, parent = %new_parent, "copied subtree");
        copy_root.ok_or_else(|| StoreError::NotFound(source.clone()))
    }

    /// Remove a node, its descendants, their versions, and all their
    /// metadata. Returns the number of nodes removed.
    pub fn remove_subtree(&self, id: &NodeId) -> StoreResult<usize> {
        let mut nodes = self.nodes_write()?;
        let mut metadata = self.metadata_write()?;
        if !nodes.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let mut doomed = vec![id.clone()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor].clone();
            doomed.extend(
                nodes
                    .values()
                    .filter(|n| {
                        n.parent.as_ref() == Some(&current) || n.version_of.as_ref() == Some(&current)
                    })
                    .map(|n| n.id.clone()),
            );
            cursor += 1;
        }
        for doomed_id in &doomed {
            nodes.remove(doomed_id);
            metadata.remove(doomed_id);
        }
        debug!(node = %id, removed = doomed.len(), "removed subtree");
        Ok(doomed.len())
    }

    /// Remove a single node (typically a version) and its metadata.
    pub fn remove_node(&self, id: &NodeId) -> StoreResult<Node> {
        let mut nodes = self.nodes_write()?;
        let mut metadata = self.metadata_write()?;
        let node = nodes
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        metadata.remove(id);
        Ok(node)
    }

    /// Set or clear a node's limit, attaching the capability if needed.
    ///
    /// This is the administrative path; the quota engine itself never
    /// changes limits.
    pub fn set_max_size(&self, id: &NodeId, max_size: Option<u64>) -> StoreResult<()> {
        if !self.nodes_read()?.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let mut metadata = self.metadata_write()?;
        metadata.entry(id.clone()).or_default().max_size = max_size;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Lock helpers
    // ---------------------------------------------------------------

    fn nodes_read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<NodeId, Node>>> {
        self.nodes.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn nodes_write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<NodeId, Node>>> {
        self.nodes.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn metadata_read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<NodeId, QuotaMetadata>>> {
        self.metadata.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn metadata_write(
        &self,
    ) -> StoreResult<RwLockWriteGuard<'_, HashMap<NodeId, QuotaMetadata>>> {
        self.metadata.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn ensure_exists(&self, id: &NodeId) -> StoreResult<()> {
        if self.nodes_read()?.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for InMemoryNodeStore {
    fn get_node(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        Ok(self.nodes_read()?.get(id).cloned())
    }

    fn children(&self, id: &NodeId) -> StoreResult<Vec<Node>> {
        let nodes = self.nodes_read()?;
        if !nodes.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let mut children: Vec<Node> = nodes
            .values()
            .filter(|n| n.parent.as_ref() == Some(id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(children)
    }

    fn versions(&self, id: &NodeId) -> StoreResult<Vec<Node>> {
        let nodes = self.nodes_read()?;
        let mut versions: Vec<Node> = nodes
            .values()
            .filter(|n| n.version_of.as_ref() == Some(id))
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(versions)
    }

    fn read_quota_metadata(&self, id: &NodeId) -> StoreResult<Option<QuotaMetadata>> {
        self.ensure_exists(id)?;
        Ok(self.metadata_read()?.get(id).cloned())
    }

    fn write_quota_metadata(&self, id: &NodeId, metadata: &QuotaMetadata) -> StoreResult<()> {
        self.ensure_exists(id)?;
        let mut map = self.metadata_write()?;
        let slot = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotQuotaAware(id.clone()))?;
        *slot = metadata.clone();
        Ok(())
    }

    fn has_quota_capability(&self, id: &NodeId) -> StoreResult<bool> {
        self.ensure_exists(id)?;
        Ok(self.metadata_read()?.contains_key(id))
    }

    fn attach_quota_capability(&self, id: &NodeId) -> StoreResult<bool> {
        self.ensure_exists(id)?;
        let mut map = self.metadata_write()?;
        if map.contains_key(id) {
            return Ok(false);
        }
        map.insert(id.clone(), QuotaMetadata::new());
        Ok(true)
    }

    fn modify_quota_metadata(
        &self,
        id: &NodeId,
        update: &mut dyn FnMut(&mut QuotaMetadata) -> bool,
    ) -> StoreResult<QuotaMetadata> {
        self.ensure_exists(id)?;
        let mut map = self.metadata_write()?;
        let slot = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotQuotaAware(id.clone()))?;
        let mut candidate = slot.clone();
        if update(&mut candidate) {
            *slot = candidate;
        }
        Ok(slot.clone())
    }
}

impl std::fmt::Debug for InMemoryNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let quota_aware = self.metadata_read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryNodeStore")
            .field("node_count", &self.len())
            .field("quota_aware_count", &quota_aware)
            .finish()
    }
}

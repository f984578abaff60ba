use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// A tree node as the quota engine sees it.
///
/// Nodes are owned by the hosting document store. The engine only reads
/// them: identity and parent link for the tree shape, `content_size` for the
/// bytes the node contributes itself, and the lifecycle flags that decide
/// which bucket (trash, versions) those bytes belong to.
///
/// Version nodes live outside the tree: they have no parent and point at the
/// live document through `version_of`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub name: String,
    /// Bytes of this node's own content, excluding descendants.
    #[serde(default)]
    pub content_size: u64,
    /// Whether the node is in the trash (lifecycle state "deleted").
    #[serde(default)]
    pub trashed: bool,
    /// For version nodes: the live document this version snapshots.
    #[serde(default)]
    pub version_of: Option<NodeId>,
}

impl Node {
    /// A tree root: no parent, no content.
    pub fn root(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            name: String::new(),
            content_size: 0,
            trashed: false,
            version_of: None,
        }
    }

    /// A regular node placed under `parent`.
    pub fn child(id: NodeId, parent: NodeId, name: impl Into<String>, content_size: u64) -> Self {
        Self {
            id,
            parent: Some(parent),
            name: name.into(),
            content_size,
            trashed: false,
            version_of: None,
        }
    }

    /// A version snapshot of `live`, holding `content_size` bytes.
    pub fn version(id: NodeId, live: NodeId, content_size: u64) -> Self {
        Self {
            id,
            parent: None,
            name: String::new(),
            content_size,
            trashed: false,
            version_of: Some(live),
        }
    }

    /// Mark the node as trashed.
    pub fn in_trash(mut self) -> Self {
        self.trashed = true;
        self
    }

    /// Returns `true` for the tree root (no parent and not a version).
    pub fn is_root(&self) -> bool {
        self.parent.is_none() && self.version_of.is_none()
    }

    /// Returns `true` for version snapshots.
    pub fn is_version(&self) -> bool {
        self.version_of.is_some()
    }
}

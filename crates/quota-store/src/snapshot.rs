use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use quota_types::{Node, NodeId, QuotaMetadata};

use crate::error::{StoreError, StoreResult};

/// Serializable image of a node store: every node plus the metadata of the
/// quota-aware ones.
///
/// Snapshots are how trees are loaded into and saved out of an
/// [`InMemoryNodeStore`](crate::InMemoryNodeStore), in JSON or TOML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub metadata: BTreeMap<NodeId, QuotaMetadata>,
}

impl StoreSnapshot {
    /// Check that ids are unique, that every parent and live-document link
    /// resolves, and that metadata only names known nodes.
    pub fn validate(&self) -> StoreResult<()> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(&node.id) {
                return Err(StoreError::AlreadyExists(node.id.clone()));
            }
        }
        for node in &self.nodes {
            if let Some(anchor) = node.parent.as_ref().or(node.version_of.as_ref()) {
                if !ids.contains(anchor) {
                    return Err(StoreError::DanglingParent {
                        node: node.id.clone(),
                        parent: anchor.clone(),
                    });
                }
            }
        }
        for id in self.metadata.keys() {
            if !ids.contains(id) {
                return Err(StoreError::NotFound(id.clone()));
            }
        }
        Ok(())
    }
}

//! Bottom-up statistics for whole subtrees.
//!
//! Incremental deltas keep metadata consistent only if it started out
//! consistent. These functions derive it from scratch: for trees that
//! existed before tracking began, and for subtrees that arrive by copy.

use std::collections::{BTreeMap, HashMap, HashSet};

use quota_store::{NodeStore, StoreError};
use quota_types::{NodeId, QuotaMetadata};
use tracing::debug;

use crate::error::QuotaResult;

/// Summary of a recompute run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecomputeReport {
    /// Number of nodes whose metadata was rewritten.
    pub nodes: usize,
    /// Nodes whose recomputed total exceeds their limit.
    pub over_limit: Vec<NodeId>,
}

impl RecomputeReport {
    pub(crate) fn record(&mut self, stats: &BTreeMap<NodeId, QuotaMetadata>) {
        self.nodes += stats.len();
        self.over_limit.extend(
            stats
                .iter()
                .filter(|(_, meta)| meta.is_over_limit())
                .map(|(id, _)| id.clone()),
        );
    }
}

#[derive(Default)]
struct ChildSums {
    total: u64,
    trash: u64,
    versions: u64,
}

/// Compute metadata for `root` and all its descendants without writing.
///
/// Limits are carried over from existing metadata. A node's own versions
/// count only when `include_versions` is set.
pub fn compute_subtree<S: NodeStore + ?Sized>(
    store: &S,
    root: &NodeId,
    include_versions: bool,
) -> QuotaResult<BTreeMap<NodeId, QuotaMetadata>> {
    // Breadth-first listing; walking it backwards visits children first.
    let mut order = vec![store.node(root)?];
    let mut seen = HashSet::from([root.clone()]);
    let mut cursor = 0;
    while cursor < order.len() {
        let children = store.children(&order[cursor].id)?;
        for child in children {
            if !seen.insert(child.id.clone()) {
                return Err(StoreError::Cycle(child.id).into());
            }
            order.push(child);
        }
        cursor += 1;
    }

    let mut sums: HashMap<NodeId, ChildSums> = HashMap::new();
    let mut stats = BTreeMap::new();
    for node in order.iter().rev() {
        let children = sums.remove(&node.id).unwrap_or_default();
        let own_versions = if include_versions {
            store
                .versions(&node.id)?
                .iter()
                .fold(0u64, |acc, v| acc.saturating_add(v.content_size))
        } else {
            0
        };
        let own_trash = if node.trashed { node.content_size } else { 0 };
        let max_size = store
            .read_quota_metadata(&node.id)?
            .and_then(|existing| existing.max_size);

        let meta = QuotaMetadata {
            inner_size: node.content_size,
            total_size: node
                .content_size
                .saturating_add(own_versions)
                .saturating_add(children.total),
            max_size,
            trash_size: own_trash.saturating_add(children.trash),
            versions_size: own_versions.saturating_add(children.versions),
        };

        if &node.id != root {
            if let Some(parent) = &node.parent {
                let entry = sums.entry(parent.clone()).or_default();
                entry.total = entry.total.saturating_add(meta.total_size);
                entry.trash = entry.trash.saturating_add(meta.trash_size);
                entry.versions = entry.versions.saturating_add(meta.versions_size);
            }
        }
        stats.insert(node.id.clone(), meta);
    }
    Ok(stats)
}

/// Compute and persist metadata for a subtree. Ancestors are not touched.
pub fn recompute_subtree<S: NodeStore + ?Sized>(
    store: &S,
    root: &NodeId,
    include_versions: bool,
) -> QuotaResult<BTreeMap<NodeId, QuotaMetadata>> {
    let stats = compute_subtree(store, root, include_versions)?;
    write_stats(store, &stats)?;
    Ok(stats)
}

/// Persist computed metadata, making every node quota-aware.
pub fn write_stats<S: NodeStore + ?Sized>(
    store: &S,
    stats: &BTreeMap<NodeId, QuotaMetadata>,
) -> QuotaResult<()> {
    for (id, meta) in stats {
        store.ensure_quota_capability(id)?;
        store.write_quota_metadata(id, meta)?;
        debug!(node = %id, total = meta.total_size, "wrote recomputed size");
    }
    Ok(())
}

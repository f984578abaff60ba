use serde::{Deserialize, Serialize};

use crate::delta::SizeDelta;
use crate::id::NodeId;
use crate::signal::QuotaExceeded;

/// Size statistics attached to a quota-aware node.
///
/// # Invariants
///
/// - `total_size = inner_size + own versions + Σ total_size(child)`.
/// - `trash_size` and `versions_size` are cumulative over the subtree and
///   are both included in `total_size`.
/// - After any successful update, `total_size <= max_size` when a limit is
///   set. The limit is inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaMetadata {
    /// Bytes of the node's own content.
    #[serde(default)]
    pub inner_size: u64,
    /// Bytes of the node plus every descendant.
    #[serde(default)]
    pub total_size: u64,
    /// Optional limit on `total_size`; `None` means unlimited.
    #[serde(default)]
    pub max_size: Option<u64>,
    /// Bytes of trashed content in the subtree.
    #[serde(default)]
    pub trash_size: u64,
    /// Bytes of version snapshots in the subtree.
    #[serde(default)]
    pub versions_size: u64,
}

impl QuotaMetadata {
    /// Zeroed, unlimited metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed metadata with a limit.
    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            max_size: Some(max_size),
            ..Self::default()
        }
    }

    /// Apply every component of `delta`.
    ///
    /// Callers pass [`SizeDelta::for_ancestor`] when updating an ancestor.
    /// Returns `true` if any bucket would have gone negative and was clamped
    /// to zero, which only happens on already-inconsistent metadata.
    pub fn apply(&mut self, delta: &SizeDelta) -> bool {
        let mut clamped = false;
        for (value, change) in [
            (&mut self.inner_size, delta.inner),
            (&mut self.total_size, delta.total),
            (&mut self.trash_size, delta.trash),
            (&mut self.versions_size, delta.versions),
        ] {
            let (next, underflow) = add_signed(*value, change);
            *value = next;
            clamped |= underflow;
        }
        clamped
    }

    /// Check the limit after a delta has been applied.
    ///
    /// Deltas that release space are never rejected, so a node that is
    /// already over its limit (for instance after an administrator lowered
    /// it) can still be cleaned up. A zero delta is checked.
    pub fn check_limit(&self, node: &NodeId, delta: &SizeDelta) -> Result<(), QuotaExceeded> {
        if delta.total < 0 {
            return Ok(());
        }
        match self.max_size {
            Some(limit) if self.total_size > limit => Err(QuotaExceeded {
                node_id: node.clone(),
                attempted_total: self.total_size,
                limit,
                delta: delta.total,
                operation: delta.operation,
            }),
            _ => Ok(()),
        }
    }

    /// Bytes still available before the limit, or `None` when unlimited.
    pub fn headroom(&self) -> Option<u64> {
        self.max_size
            .map(|limit| limit.saturating_sub(self.total_size))
    }

    /// Returns `true` if the node is currently over its limit.
    pub fn is_over_limit(&self) -> bool {
        matches!(self.max_size, Some(limit) if self.total_size > limit)
    }
}

/// Add a signed change to an unsigned size, clamping at zero.
fn add_signed(value: u64, change: i64) -> (u64, bool) {
    if change >= 0 {
        (value.saturating_add(change.unsigned_abs()), false)
    } else {
        let magnitude = change.unsigned_abs();
        match value.checked_sub(magnitude) {
            Some(next) => (next, false),
            None => (0, true),
        }
    }
}

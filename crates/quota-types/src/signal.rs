use serde::{Deserialize, Serialize};

use crate::delta::OperationKind;
use crate::id::NodeId;

/// Raised when applying a delta would push a node past its `max_size`.
///
/// The signal is a plain value: it is carried unchanged from the node where
/// the check failed to the caller that dispatched the triggering event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error(
    "quota exceeded on {node_id}: total would reach {attempted_total}, limit {limit} (delta {delta:+}, {operation})"
)]
pub struct QuotaExceeded {
    /// The node whose limit would be breached.
    pub node_id: NodeId,
    /// The total the node would have reached.
    pub attempted_total: u64,
    /// The node's configured `max_size`.
    pub limit: u64,
    /// The signed total delta that was being applied.
    pub delta: i64,
    /// The operation that produced the delta.
    pub operation: OperationKind,
}

impl QuotaExceeded {
    /// Bytes over the limit.
    pub fn overflow(&self) -> u64 {
        self.attempted_total.saturating_sub(self.limit)
    }
}

use quota_types::NodeId;

/// Errors from node store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested node was not found.
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// A node with this id already exists.
    #[error("node already exists: {0}")]
    AlreadyExists(NodeId),

    /// A node references a parent that does not exist.
    #[error("dangling parent reference: node {node} references missing parent {parent}")]
    DanglingParent { node: NodeId, parent: NodeId },

    /// Metadata was read or written on a node without the quota capability.
    #[error("node is not quota-aware: {0}")]
    NotQuotaAware(NodeId),

    /// A move would place a node inside its own subtree, or a parent chain
    /// loops back on itself.
    #[error("cycle in tree at node {0}")]
    Cycle(NodeId),

    /// The backend cannot serve the request right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

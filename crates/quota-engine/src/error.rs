use quota_store::StoreError;
use quota_types::{NodeId, QuotaExceeded};

use crate::walker::WalkFailure;

/// The two failure families callers must tell apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A limit would be breached. Retrying the same input fails the same way.
    QuotaExceeded,
    /// The store, the tree, the event, or the configuration is broken.
    /// Retrying may succeed once the cause is fixed.
    Infrastructure,
}

/// Errors produced while processing lifecycle events.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// A node's total would exceed its configured limit.
    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    /// A node or its metadata could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The ancestor walk broke off before reaching the root.
    #[error("ancestor walk from {node} stopped after {} ancestors: {failure}", .partial.len())]
    AncestorWalk {
        node: NodeId,
        /// Ancestors collected before the failure, nearest first.
        partial: Vec<NodeId>,
        #[source]
        failure: WalkFailure,
    },

    /// The event lacks context its operation needs.
    #[error("invalid {event} event for {node}: {reason}")]
    InvalidEvent {
        event: String,
        node: NodeId,
        reason: String,
    },

    /// Configuration is invalid or unreadable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl QuotaError {
    /// Classify the error for recovery decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            _ => ErrorKind::Infrastructure,
        }
    }

    /// Returns `true` for quota violations.
    pub fn is_quota_exceeded(&self) -> bool {
        self.kind() == ErrorKind::QuotaExceeded
    }

    /// The quota signal, if this is a quota violation.
    pub fn as_quota_exceeded(&self) -> Option<&QuotaExceeded> {
        match self {
            Self::QuotaExceeded(signal) => Some(signal),
            _ => None,
        }
    }

    pub(crate) fn invalid_event(
        event: impl Into<String>,
        node: &NodeId,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidEvent {
            event: event.into(),
            node: node.clone(),
            reason: reason.into(),
        }
    }
}

/// Result alias for quota operations.
pub type QuotaResult<T> = Result<T, QuotaError>;

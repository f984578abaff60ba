use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// The abstract size-affecting operation an inbound event was classified as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Created,
    Removed,
    Copied,
    Moved,
    Updated,
    BeforeUpdate,
    CheckedIn,
    CheckedOut,
    Restored,
    BeforeRestore,
    TrashTransition,
    /// Correction applied after statistics were rebuilt from content.
    Recomputed,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Removed => "removed",
            Self::Copied => "copied",
            Self::Moved => "moved",
            Self::Updated => "updated",
            Self::BeforeUpdate => "before-update",
            Self::CheckedIn => "checked-in",
            Self::CheckedOut => "checked-out",
            Self::Restored => "restored",
            Self::BeforeRestore => "before-restore",
            Self::TrashTransition => "trash-transition",
            Self::Recomputed => "recomputed",
        };
        write!(f, "{s}")
    }
}

/// A signed size change produced while handling one event.
///
/// `total` is the headline byte count: it is what limits are checked
/// against. The other components route the same bytes into the matching
/// buckets of [`QuotaMetadata`](crate::QuotaMetadata):
///
/// - `inner` only applies at the originating node; ancestors never see it.
/// - `trash` and `versions` are cumulative and travel up the chain with
///   `total`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeDelta {
    pub origin: NodeId,
    pub operation: OperationKind,
    pub total: i64,
    pub inner: i64,
    pub trash: i64,
    pub versions: i64,
}

impl SizeDelta {
    /// A change to the node's own content: `inner` and `total` move together.
    pub fn content(origin: NodeId, operation: OperationKind, bytes: i64) -> Self {
        Self {
            origin,
            operation,
            total: bytes,
            inner: bytes,
            trash: 0,
            versions: 0,
        }
    }

    /// A whole subtree entering (positive) or leaving (negative) a chain.
    pub fn subtree(
        origin: NodeId,
        operation: OperationKind,
        total: i64,
        trash: i64,
        versions: i64,
    ) -> Self {
        Self {
            origin,
            operation,
            total,
            inner: 0,
            trash,
            versions,
        }
    }

    /// Bytes moving in or out of the trash bucket; the total is unchanged.
    pub fn trash(origin: NodeId, operation: OperationKind, bytes: i64) -> Self {
        Self {
            origin,
            operation,
            total: 0,
            inner: 0,
            trash: bytes,
            versions: 0,
        }
    }

    /// Version bytes added to or released from a live document.
    pub fn versions(origin: NodeId, operation: OperationKind, bytes: i64) -> Self {
        Self {
            origin,
            operation,
            total: bytes,
            inner: 0,
            trash: 0,
            versions: bytes,
        }
    }

    /// Also count the content bytes of this delta as trash.
    pub fn with_trash(mut self, trash: i64) -> Self {
        self.trash = trash;
        self
    }

    /// The same delta as seen by an ancestor (inner size untouched).
    pub fn for_ancestor(&self) -> Self {
        Self {
            inner: 0,
            ..self.clone()
        }
    }

    /// The opposite delta.
    pub fn negated(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            operation: self.operation,
            total: -self.total,
            inner: -self.inner,
            trash: -self.trash,
            versions: -self.versions,
        }
    }

    /// Returns `true` when no bucket changes.
    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.inner == 0 && self.trash == 0 && self.versions == 0
    }
}

/// Convert an unsigned byte count to a signed delta component, saturating
/// at `i64::MAX`.
pub fn signed(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

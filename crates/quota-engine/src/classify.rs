//! Mapping inbound events to abstract operations.
//!
//! Classification looks at the event alone. Whether the target node should
//! be processed at all is decided afterwards by the engine, which has the
//! store at hand.

use quota_types::{NodeId, OperationKind};

use crate::error::{QuotaError, QuotaResult};
use crate::event::{names, LifecycleEvent};

/// Direction of a trash transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrashDirection {
    ToTrash,
    FromTrash,
}

/// The size-affecting operation an event stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaOperation {
    Created,
    /// The target is about to be removed. `version` is set when the target
    /// is a version snapshot rather than a tree node.
    Removed { version: bool },
    Copied,
    Moved { source_parent: NodeId },
    Updated,
    BeforeUpdate,
    CheckedIn { version: Option<NodeId> },
    CheckedOut,
    Restored,
    BeforeRestore,
    TrashTransition(TrashDirection),
}

impl QuotaOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Created => OperationKind::Created,
            Self::Removed { .. } => OperationKind::Removed,
            Self::Copied => OperationKind::Copied,
            Self::Moved { .. } => OperationKind::Moved,
            Self::Updated => OperationKind::Updated,
            Self::BeforeUpdate => OperationKind::BeforeUpdate,
            Self::CheckedIn { .. } => OperationKind::CheckedIn,
            Self::CheckedOut => OperationKind::CheckedOut,
            Self::Restored => OperationKind::Restored,
            Self::BeforeRestore => OperationKind::BeforeRestore,
            Self::TrashTransition(_) => OperationKind::TrashTransition,
        }
    }

    /// Returns `true` for the version-removal variant.
    pub fn is_version_removal(&self) -> bool {
        matches!(self, Self::Removed { version: true })
    }
}

/// Classify an event.
///
/// Returns `Ok(None)` for names outside the vocabulary and for lifecycle
/// transitions other than `delete`/`undelete`. Fails only when a known
/// event lacks context its operation cannot do without.
pub fn classify(event: &LifecycleEvent) -> QuotaResult<Option<QuotaOperation>> {
    let op = match event.name.as_str() {
        names::DOCUMENT_CREATED => QuotaOperation::Created,
        names::ABOUT_TO_REMOVE => QuotaOperation::Removed { version: false },
        names::ABOUT_TO_REMOVE_VERSION => QuotaOperation::Removed { version: true },
        names::DOCUMENT_CREATED_BY_COPY => QuotaOperation::Copied,
        names::DOCUMENT_MOVED => {
            let source_parent = event.context.source_parent.clone().ok_or_else(|| {
                QuotaError::invalid_event(&event.name, &event.target, "missing source parent")
            })?;
            QuotaOperation::Moved { source_parent }
        }
        names::DOCUMENT_MODIFIED => QuotaOperation::Updated,
        names::BEFORE_DOCUMENT_MODIFICATION => QuotaOperation::BeforeUpdate,
        names::DOCUMENT_CHECKED_IN => QuotaOperation::CheckedIn {
            version: event.context.version.clone(),
        },
        names::DOCUMENT_CHECKED_OUT => QuotaOperation::CheckedOut,
        names::DOCUMENT_RESTORED => QuotaOperation::Restored,
        names::BEFORE_DOCUMENT_RESTORE => QuotaOperation::BeforeRestore,
        names::LIFECYCLE_TRANSITION => match event.context.transition.as_deref() {
            Some(names::TRANSITION_DELETE) => {
                QuotaOperation::TrashTransition(TrashDirection::ToTrash)
            }
            Some(names::TRANSITION_UNDELETE) => {
                QuotaOperation::TrashTransition(TrashDirection::FromTrash)
            }
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(op))
}

use serde::{Deserialize, Serialize};

use quota_types::NodeId;

/// Wire names of the lifecycle events the engine understands.
pub mod names {
    pub const DOCUMENT_CREATED: &str = "document_created";
    pub const ABOUT_TO_REMOVE: &str = "about_to_remove";
    pub const ABOUT_TO_REMOVE_VERSION: &str = "about_to_remove_version";
    pub const DOCUMENT_CREATED_BY_COPY: &str = "document_created_by_copy";
    pub const DOCUMENT_MOVED: &str = "document_moved";
    pub const DOCUMENT_MODIFIED: &str = "document_modified";
    pub const BEFORE_DOCUMENT_MODIFICATION: &str = "before_document_modification";
    pub const LIFECYCLE_TRANSITION: &str = "lifecycle_transition";
    pub const DOCUMENT_CHECKED_IN: &str = "document_checked_in";
    pub const DOCUMENT_CHECKED_OUT: &str = "document_checked_out";
    pub const DOCUMENT_RESTORED: &str = "document_restored";
    pub const BEFORE_DOCUMENT_RESTORE: &str = "before_document_restore";

    /// Lifecycle transition into the trash.
    pub const TRANSITION_DELETE: &str = "delete";
    /// Lifecycle transition out of the trash.
    pub const TRANSITION_UNDELETE: &str = "undelete";
}

/// Who emitted an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// The hosting document repository.
    #[default]
    Host,
    /// The quota engine itself, e.g. while it writes metadata. Never
    /// processed, so the engine cannot recurse on its own writes.
    QuotaEngine,
}

/// Operation-specific context carried with an event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Parent the node was moved away from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_parent: Option<NodeId>,
    /// Version node created by a check-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<NodeId>,
    /// Lifecycle transition name (`delete`, `undelete`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
    #[serde(default)]
    pub origin: EventOrigin,
}

/// An inbound notification from the document repository.
///
/// ```json
/// {"name": "document_moved", "target": "doc-1", "context": {"source_parent": "inbox"}}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub name: String,
    pub target: NodeId,
    #[serde(default)]
    pub context: EventContext,
}

impl LifecycleEvent {
    /// An event with an empty context.
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            context: EventContext::default(),
        }
    }

    pub fn created(target: NodeId) -> Self {
        Self::new(names::DOCUMENT_CREATED, target)
    }

    pub fn about_to_remove(target: NodeId) -> Self {
        Self::new(names::ABOUT_TO_REMOVE, target)
    }

    pub fn about_to_remove_version(version: NodeId) -> Self {
        Self::new(names::ABOUT_TO_REMOVE_VERSION, version)
    }

    pub fn copied(copy_root: NodeId) -> Self {
        Self::new(names::DOCUMENT_CREATED_BY_COPY, copy_root)
    }

    pub fn moved(target: NodeId, source_parent: NodeId) -> Self {
        let mut event = Self::new(names::DOCUMENT_MOVED, target);
        event.context.source_parent = Some(source_parent);
        event
    }

    pub fn before_modification(target: NodeId) -> Self {
        Self::new(names::BEFORE_DOCUMENT_MODIFICATION, target)
    }

    pub fn modified(target: NodeId) -> Self {
        Self::new(names::DOCUMENT_MODIFIED, target)
    }

    pub fn checked_in(target: NodeId, version: NodeId) -> Self {
        let mut event = Self::new(names::DOCUMENT_CHECKED_IN, target);
        event.context.version = Some(version);
        event
    }

    pub fn checked_out(target: NodeId) -> Self {
        Self::new(names::DOCUMENT_CHECKED_OUT, target)
    }

    pub fn before_restore(target: NodeId) -> Self {
        Self::new(names::BEFORE_DOCUMENT_RESTORE, target)
    }

    pub fn restored(target: NodeId) -> Self {
        Self::new(names::DOCUMENT_RESTORED, target)
    }

    /// A lifecycle transition such as `delete` or `undelete`.
    pub fn transition(target: NodeId, transition: impl Into<String>) -> Self {
        let mut event = Self::new(names::LIFECYCLE_TRANSITION, target);
        event.context.transition = Some(transition.into());
        event
    }

    /// Mark the event as emitted by the quota engine.
    pub fn from_quota_engine(mut self) -> Self {
        self.context.origin = EventOrigin::QuotaEngine;
        self
    }

    /// Returns `true` if the quota engine emitted this event.
    pub fn is_self_triggered(&self) -> bool {
        self.context.origin == EventOrigin::QuotaEngine
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    #[test]
    fn constructors_fill_context() {
        let moved = LifecycleEvent::moved(id("doc"), id("inbox"));
        assert_eq!(moved.name, names::DOCUMENT_MOVED);
        assert_eq!(moved.context.source_parent, Some(id("inbox")));

        let checkin = LifecycleEvent::checked_in(id("doc"), id("v1"));
        assert_eq!(checkin.context.version, Some(id("v1")));

        let trash = LifecycleEvent::transition(id("doc"), names::TRANSITION_DELETE);
        assert_eq!(trash.context.transition.as_deref(), Some("delete"));
    }

    #[test]
    fn origin_defaults_to_host() {
        let event = LifecycleEvent::created(id("doc"));
        assert!(!event.is_self_triggered());
        assert!(event.from_quota_engine().is_self_triggered());
    }

    #[test]
    fn deserialize_without_context() {
        let event: LifecycleEvent =
            serde_json::from_str(r#"{"name": "document_created", "target": "doc"}"#).unwrap();
        assert_eq!(event, LifecycleEvent::created(id("doc")));
    }

    #[test]
    fn deserialize_with_context() {
        let event: LifecycleEvent = serde_json::from_str(
            r#"{"name": "document_moved", "target": "doc",
                "context": {"source_parent": "inbox", "origin": "quota_engine"}}"#,
        )
        .unwrap();
        assert_eq!(event.context.source_parent, Some(id("inbox")));
        assert!(event.is_self_triggered());
    }

    #[test]
    fn display() {
        assert_eq!(
            LifecycleEvent::modified(id("doc")).to_string(),
            "document_modified(doc)"
        );
    }
}

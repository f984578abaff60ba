use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use quota_engine::{LifecycleEvent, ProcessOutcome, QuotaEngine, QuotaError};
use quota_store::InMemoryNodeStore;
use quota_types::{Node, NodeId};

/// A change the host repository makes to its tree.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostChange {
    Insert { node: Node },
    SetSize { id: NodeId, content_size: u64 },
    SetTrashed { id: NodeId, trashed: bool },
    Move { id: NodeId, parent: NodeId },
    Remove { id: NodeId },
    RemoveVersion { id: NodeId },
    SetLimit { id: NodeId, max_size: Option<u64> },
}

/// One entry of a replay script: either a tree change or an event.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReplayStep {
    Change(HostChange),
    Event(LifecycleEvent),
}

/// Result of one replayed step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Changed,
    Applied,
    Skipped,
    Ignored,
    QuotaExceeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub label: String,
    pub status: StepStatus,
    pub detail: String,
}

pub fn load_steps(path: &Path) -> anyhow::Result<Vec<ReplayStep>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn apply_change(store: &InMemoryNodeStore, change: &HostChange) -> anyhow::Result<String> {
    let detail = match change {
        HostChange::Insert { node } => {
            store.insert_node(node.clone())?;
            format!("inserted {} ({} bytes)", node.id, node.content_size)
        }
        HostChange::SetSize { id, content_size } => {
            store.set_content_size(id, *content_size)?;
            format!("{id} now {content_size} bytes")
        }
        HostChange::SetTrashed { id, trashed } => {
            store.set_trashed(id, *trashed)?;
            format!("{id} trashed={trashed}")
        }
        HostChange::Move { id, parent } => {
            let previous = store.move_node(id, parent)?;
            match previous {
                Some(previous) => format!("moved {id} from {previous} to {parent}"),
                None => format!("moved {id} to {parent}"),
            }
        }
        HostChange::Remove { id } => {
            let removed = store.remove_subtree(id)?;
            format!("removed {id} ({removed} nodes)")
        }
        HostChange::RemoveVersion { id } => {
            store.remove_node(id)?;
            format!("removed version {id}")
        }
        HostChange::SetLimit { id, max_size } => {
            store.set_max_size(id, *max_size)?;
            match max_size {
                Some(limit) => format!("{id} limited to {limit} bytes"),
                None => format!("{id} unlimited"),
            }
        }
    };
    Ok(detail)
}

fn change_label(change: &HostChange) -> String {
    let op = match change {
        HostChange::Insert { .. } => "insert",
        HostChange::SetSize { .. } => "set_size",
        HostChange::SetTrashed { .. } => "set_trashed",
        HostChange::Move { .. } => "move",
        HostChange::Remove { .. } => "remove",
        HostChange::RemoveVersion { .. } => "remove_version",
        HostChange::SetLimit { .. } => "set_limit",
    };
    format!("host {op}")
}

/// Run every step in order. Failures are recorded and the replay goes on,
/// the way a host keeps running after it aborts one operation.
pub fn replay(engine: &QuotaEngine<InMemoryNodeStore>, steps: &[ReplayStep]) -> Vec<StepReport> {
    let mut reports = Vec::with_capacity(steps.len());
    for (step, entry) in steps.iter().enumerate() {
        let report = match entry {
            ReplayStep::Change(change) => {
                let (status, detail) = match apply_change(engine.store(), change) {
                    Ok(detail) => (StepStatus::Changed, detail),
                    Err(e) => (StepStatus::Failed, format!("{e:#}")),
                };
                StepReport {
                    step,
                    label: change_label(change),
                    status,
                    detail,
                }
            }
            ReplayStep::Event(event) => {
                let (status, detail) = match engine.process(event) {
                    Ok(ProcessOutcome::Applied { operation, touched }) => (
                        StepStatus::Applied,
                        format!("{operation}, {} nodes updated", touched.len()),
                    ),
                    Ok(ProcessOutcome::Skipped(reason)) => (StepStatus::Skipped, reason.to_string()),
                    Ok(ProcessOutcome::Ignored) => (StepStatus::Ignored, String::new()),
                    Err(QuotaError::QuotaExceeded(signal)) => {
                        (StepStatus::QuotaExceeded, signal.to_string())
                    }
                    Err(e) => (StepStatus::Failed, e.to_string()),
                };
                StepReport {
                    step,
                    label: event.to_string(),
                    status,
                    detail,
                }
            }
        };
        reports.push(report);
    }
    reports
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use quota_store::NodeStore;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    fn engine() -> QuotaEngine<InMemoryNodeStore> {
        let store = InMemoryNodeStore::with_root(id("root"));
        store
            .insert_node(Node::child(id("folder"), id("root"), "folder", 0))
            .unwrap();
        store.set_max_size(&id("folder"), Some(1000)).unwrap();
        QuotaEngine::new(Arc::new(store))
    }

    const SCRIPT: &str = r#"[
        {"op": "insert", "node": {"id": "a", "parent": "folder", "name": "a", "content_size": 950}},
        {"name": "document_created", "target": "a"},
        {"op": "insert", "node": {"id": "b", "parent": "folder", "name": "b", "content_size": 100}},
        {"name": "document_created", "target": "b"},
        {"name": "document_locked", "target": "a"},
        {"name": "document_created", "target": "root"},
        {"op": "move", "id": "a", "parent": "ghost"}
    ]"#;

    #[test]
    fn script_parses_changes_and_events() {
        let steps: Vec<ReplayStep> = serde_json::from_str(SCRIPT).unwrap();
        assert_eq!(steps.len(), 7);
        assert!(matches!(steps[0], ReplayStep::Change(HostChange::Insert { .. })));
        assert!(matches!(steps[1], ReplayStep::Event(_)));
    }

    #[test]
    fn replay_reports_each_step() {
        let engine = engine();
        let steps: Vec<ReplayStep> = serde_json::from_str(SCRIPT).unwrap();
        let reports = replay(&engine, &steps);

        let statuses: Vec<StepStatus> = reports.iter().map(|r| r.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Changed,
                StepStatus::Applied,
                StepStatus::Changed,
                StepStatus::QuotaExceeded,
                StepStatus::Ignored,
                StepStatus::Skipped,
                StepStatus::Failed,
            ]
        );
        assert!(reports[3].detail.contains("limit 1000"));
        assert_eq!(reports[5].detail, "root node");

        let folder = engine.store().read_quota_metadata(&id("folder")).unwrap().unwrap();
        assert_eq!(folder.total_size, 950);
    }

    #[test]
    fn load_steps_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, SCRIPT).unwrap();
        assert_eq!(load_steps(&path).unwrap().len(), 7);
    }
}

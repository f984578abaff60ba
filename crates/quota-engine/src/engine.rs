use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use quota_store::{NodeStore, StoreError};
use quota_types::{signed, Node, NodeId, OperationKind, SizeDelta};
use tracing::{debug, info};

use crate::classify::{classify, QuotaOperation};
use crate::config::{QuotaConfig, TrackingScope};
use crate::error::{QuotaError, QuotaResult};
use crate::event::LifecycleEvent;
use crate::hooks::{LoggingHook, QuotaExceededHook};
use crate::recompute::{recompute_subtree, RecomputeReport};
use crate::updater::SizeUpdater;

/// Why an event was accepted but not processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Emitted by the engine itself.
    SelfTriggered,
    /// The target is the tree root, which is never accounted.
    Root,
    /// The target is a version snapshot and the event is not a version
    /// removal.
    VersionNode,
    /// A version removal that targets a regular node.
    NotAVersion,
    /// No quota-aware node on the target's path to the root.
    OutsideQuotaScope,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SelfTriggered => "self-triggered",
            Self::Root => "root node",
            Self::VersionNode => "version node",
            Self::NotAVersion => "not a version",
            Self::OutsideQuotaScope => "outside quota scope",
        };
        write!(f, "{s}")
    }
}

/// What processing an event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event name is outside the vocabulary.
    Ignored,
    /// The event was classified but needs no processing.
    Skipped(SkipReason),
    /// The handler ran. `touched` lists the nodes whose metadata changed,
    /// and is empty for operations with no size effect.
    Applied {
        operation: OperationKind,
        touched: Vec<NodeId>,
    },
}

/// The quota accounting engine.
///
/// Consumes [`LifecycleEvent`]s, keeps every tracked node's
/// [`QuotaMetadata`](quota_types::QuotaMetadata) consistent, and rejects
/// changes that would push a node past its limit.
///
/// Events are processed synchronously on the calling thread. The engine is
/// `Send + Sync`; share it behind an `Arc` to process events concurrently.
pub struct QuotaEngine<S: NodeStore + ?Sized> {
    store: Arc<S>,
    config: QuotaConfig,
    hooks: Vec<Box<dyn QuotaExceededHook>>,
    /// Content sizes captured by before-update/before-restore events.
    pending: Mutex<HashMap<NodeId, u64>>,
}

impl<S: NodeStore + ?Sized> QuotaEngine<S> {
    /// An engine with the default configuration and the logging hook.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: QuotaConfig::default(),
            hooks: vec![Box::new(LoggingHook)],
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// An engine with a validated configuration and the logging hook.
    pub fn with_config(store: Arc<S>, config: QuotaConfig) -> QuotaResult<Self> {
        config.validate()?;
        let mut engine = Self::new(store);
        engine.config = config;
        Ok(engine)
    }

    /// Register an additional quota-exceeded hook.
    pub fn with_hook(mut self, hook: impl QuotaExceededHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Replace every registered hook.
    pub fn with_hooks(mut self, hooks: Vec<Box<dyn QuotaExceededHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Process one lifecycle event.
    ///
    /// A quota violation is reported to every hook and then returned as
    /// [`QuotaError::QuotaExceeded`]; the caller is expected to abort the
    /// triggering operation. Every other error is an infrastructure failure.
    pub fn process(&self, event: &LifecycleEvent) -> QuotaResult<ProcessOutcome> {
        if event.is_self_triggered() {
            debug!(event = %event, "skipping self-triggered event");
            return Ok(ProcessOutcome::Skipped(SkipReason::SelfTriggered));
        }
        let Some(op) = classify(event)? else {
            debug!(event = %event, "ignoring unclassified event");
            return Ok(ProcessOutcome::Ignored);
        };

        let node = self.store.node(&event.target)?;
        if let Some(reason) = self.skip_reason(&node, &op)? {
            debug!(event = %event, reason = %reason, "skipping event");
            return Ok(ProcessOutcome::Skipped(reason));
        }

        match self.dispatch(&op, &node) {
            Ok(touched) => {
                debug!(event = %event, touched = touched.len(), "processed event");
                Ok(ProcessOutcome::Applied {
                    operation: op.kind(),
                    touched,
                })
            }
            Err(QuotaError::QuotaExceeded(signal)) => {
                for hook in &self.hooks {
                    hook.on_quota_exceeded(&signal, event);
                }
                Err(QuotaError::QuotaExceeded(signal))
            }
            Err(e) => Err(e),
        }
    }

    /// Rebuild statistics below `start` from content sizes.
    ///
    /// For the tree root every top-level subtree is rebuilt. For any other
    /// node its subtree is rebuilt and the difference is carried to its
    /// ancestors without limit checks. Nodes left over their limit are
    /// listed in the report.
    pub fn recompute(&self, start: &NodeId) -> QuotaResult<RecomputeReport> {
        let node = self.store.node(start)?;
        if node.is_version() {
            return Err(QuotaError::invalid_event(
                "recompute",
                start,
                "version nodes are outside the tree",
            ));
        }

        let include_versions = self.config.include_versions;
        let mut report = RecomputeReport::default();
        if node.is_root() {
            for child in self.store.children(start)? {
                report.record(&recompute_subtree(self.store.as_ref(), &child.id, include_versions)?);
            }
        } else {
            let updater = self.updater();
            let chain = updater
                .walker()
                .ancestors_of(start)
                .map_err(|e| e.into_quota_error(start))?;
            let before = self.store.read_quota_metadata(start)?.unwrap_or_default();
            let stats = recompute_subtree(self.store.as_ref(), start, include_versions)?;
            if let Some(after) = stats.get(start) {
                let correction = SizeDelta::subtree(
                    start.clone(),
                    OperationKind::Recomputed,
                    signed(after.total_size) - signed(before.total_size),
                    signed(after.trash_size) - signed(before.trash_size),
                    signed(after.versions_size) - signed(before.versions_size),
                );
                if !correction.is_zero() {
                    updater.adjust(&chain, &correction)?;
                }
            }
            report.record(&stats);
        }

        info!(
            start = %start,
            nodes = report.nodes,
            over_limit = report.over_limit.len(),
            "recomputed quota statistics"
        );
        Ok(report)
    }

    /// Number of captured content sizes waiting for their after-event.
    pub fn pending_captures(&self) -> usize {
        self.pending().map(|p| p.len()).unwrap_or(0)
    }

    pub(crate) fn updater(&self) -> SizeUpdater<'_, S> {
        SizeUpdater::new(self.store.as_ref(), self.config.max_walk_depth)
    }

    pub(crate) fn pending(&self) -> QuotaResult<MutexGuard<'_, HashMap<NodeId, u64>>> {
        self.pending
            .lock()
            .map_err(|_| QuotaError::Store(StoreError::LockPoisoned))
    }

    fn skip_reason(&self, node: &Node, op: &QuotaOperation) -> QuotaResult<Option<SkipReason>> {
        if node.is_root() {
            return Ok(Some(SkipReason::Root));
        }
        if op.is_version_removal() != node.is_version() {
            return Ok(Some(if node.is_version() {
                SkipReason::VersionNode
            } else {
                SkipReason::NotAVersion
            }));
        }
        if self.config.scope == TrackingScope::QuotaAwareSubtrees {
            let anchor = node.version_of.as_ref().unwrap_or(&node.id);
            if !self.in_quota_scope(anchor)? {
                return Ok(Some(SkipReason::OutsideQuotaScope));
            }
        }
        Ok(None)
    }

    fn in_quota_scope(&self, id: &NodeId) -> QuotaResult<bool> {
        if self.store.get_node(id)?.is_none() {
            return Ok(false);
        }
        let path = self
            .updater()
            .walker()
            .self_and_ancestors(id)
            .map_err(|e| e.into_quota_error(id))?;
        for node in &path {
            if self.store.has_quota_capability(&node.id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<S: NodeStore + ?Sized> std::fmt::Debug for QuotaEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaEngine")
            .field("config", &self.config)
            .field("hooks", &self.hooks.len())
            .field("pending_captures", &self.pending_captures())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use quota_store::InMemoryNodeStore;
    use quota_types::{QuotaExceeded, QuotaMetadata};

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    fn meta(store: &InMemoryNodeStore, s: &str) -> QuotaMetadata {
        store
            .read_quota_metadata(&id(s))
            .unwrap()
            .unwrap_or_default()
    }

    /// Records every signal it sees.
    #[derive(Clone, Default)]
    struct RecordingHook {
        seen: Arc<Mutex<Vec<(QuotaExceeded, String)>>>,
    }

    impl QuotaExceededHook for RecordingHook {
        fn on_quota_exceeded(&self, signal: &QuotaExceeded, event: &LifecycleEvent) {
            self.seen
                .lock()
                .unwrap()
                .push((signal.clone(), event.name.clone()));
        }
    }

    /// root -> folder (max 1000) -> existing (800)
    fn folder_store() -> Arc<InMemoryNodeStore> {
        let store = InMemoryNodeStore::with_root(id("root"));
        store
            .insert_node(Node::child(id("folder"), id("root"), "folder", 0))
            .unwrap();
        store
            .insert_node(Node::child(id("existing"), id("folder"), "existing", 800))
            .unwrap();
        store.set_max_size(&id("folder"), Some(1000)).unwrap();
        Arc::new(store)
    }

    fn add_doc(store: &InMemoryNodeStore, node: &str, parent: &str, size: u64) -> LifecycleEvent {
        store
            .insert_node(Node::child(id(node), id(parent), node, size))
            .unwrap();
        LifecycleEvent::created(id(node))
    }

    // ---------------------------------------------------------------
    // Scenarios
    // ---------------------------------------------------------------

    #[test]
    fn folder_limit_scenario() {
        let store = folder_store();
        let hook = RecordingHook::default();
        let engine = QuotaEngine::new(store.clone()).with_hook(hook.clone());
        engine.process(&LifecycleEvent::created(id("existing"))).unwrap();
        assert_eq!(meta(&store, "folder").total_size, 800);

        engine.process(&add_doc(&store, "a", "folder", 150)).unwrap();
        assert_eq!(meta(&store, "folder").total_size, 950);

        let err = engine.process(&add_doc(&store, "b", "folder", 100)).unwrap_err();
        let signal = err.as_quota_exceeded().unwrap();
        assert_eq!(
            signal,
            &QuotaExceeded {
                node_id: id("folder"),
                attempted_total: 1050,
                limit: 1000,
                delta: 100,
                operation: OperationKind::Created,
            }
        );
        assert_eq!(meta(&store, "folder").total_size, 950);

        let seen = hook.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0].0, signal);
        assert_eq!(seen[0].1, "document_created");
    }

    #[test]
    fn reaching_the_limit_exactly_is_allowed() {
        let store = folder_store();
        let engine = QuotaEngine::new(store.clone());
        engine.process(&LifecycleEvent::created(id("existing"))).unwrap();
        engine.process(&add_doc(&store, "a", "folder", 200)).unwrap();
        assert_eq!(meta(&store, "folder").total_size, 1000);

        let err = engine.process(&add_doc(&store, "b", "folder", 1)).unwrap_err();
        assert_eq!(err.as_quota_exceeded().unwrap().attempted_total, 1001);
    }

    #[test]
    fn ancestor_violation_keeps_lower_updates() {
        // root -> A(max 2000) -> B -> target
        let store = InMemoryNodeStore::with_root(id("root"));
        store.insert_node(Node::child(id("A"), id("root"), "A", 0)).unwrap();
        store.insert_node(Node::child(id("B"), id("A"), "B", 0)).unwrap();
        store.set_max_size(&id("A"), Some(2000)).unwrap();
        let store = Arc::new(store);
        let engine = QuotaEngine::new(store.clone());
        engine.process(&add_doc(&store, "filler", "B", 1900)).unwrap();
        assert_eq!(meta(&store, "A").total_size, 1900);
        assert_eq!(meta(&store, "B").total_size, 1900);

        let err = engine.process(&add_doc(&store, "target", "B", 200)).unwrap_err();
        let signal = err.as_quota_exceeded().unwrap();
        assert_eq!(signal.node_id, id("A"));
        assert_eq!(signal.attempted_total, 2100);
        assert_eq!(meta(&store, "B").total_size, 2100);
        assert_eq!(meta(&store, "A").total_size, 1900);
    }

    #[test]
    fn hooks_cannot_suppress_the_signal() {
        let store = folder_store();
        let engine = QuotaEngine::new(store.clone())
            .with_hooks(vec![Box::new(crate::hooks::NoOpHook)]);
        engine.process(&LifecycleEvent::created(id("existing"))).unwrap();
        let err = engine.process(&add_doc(&store, "big", "folder", 500)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    }

    // ---------------------------------------------------------------
    // Predicate
    // ---------------------------------------------------------------

    #[test]
    fn skipped_events_change_nothing() {
        let store = folder_store();
        let engine = QuotaEngine::new(store.clone());
        engine.process(&LifecycleEvent::created(id("existing"))).unwrap();
        let before = store.snapshot().unwrap();

        let self_triggered = LifecycleEvent::created(id("existing")).from_quota_engine();
        assert_eq!(
            engine.process(&self_triggered).unwrap(),
            ProcessOutcome::Skipped(SkipReason::SelfTriggered)
        );
        assert_eq!(
            engine.process(&LifecycleEvent::created(id("root"))).unwrap(),
            ProcessOutcome::Skipped(SkipReason::Root)
        );
        assert_eq!(
            engine
                .process(&LifecycleEvent::new("document_locked", id("existing")))
                .unwrap(),
            ProcessOutcome::Ignored
        );
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn self_triggered_events_skip_before_any_read() {
        let store = folder_store();
        let engine = QuotaEngine::new(store);
        let ghost = LifecycleEvent::created(id("ghost")).from_quota_engine();
        assert_eq!(
            engine.process(&ghost).unwrap(),
            ProcessOutcome::Skipped(SkipReason::SelfTriggered)
        );
        assert_eq!(
            engine.process(&LifecycleEvent::new("unknown", id("ghost"))).unwrap(),
            ProcessOutcome::Ignored
        );
    }

    #[test]
    fn quota_aware_scope_skips_untracked_subtrees() {
        let store = folder_store();
        store
            .insert_node(Node::child(id("scratch"), id("root"), "scratch", 0))
            .unwrap();
        let config = QuotaConfig {
            scope: TrackingScope::QuotaAwareSubtrees,
            ..QuotaConfig::default()
        };
        let engine = QuotaEngine::with_config(store.clone(), config).unwrap();

        assert_eq!(
            engine.process(&add_doc(&store, "loose", "scratch", 10)).unwrap(),
            ProcessOutcome::Skipped(SkipReason::OutsideQuotaScope)
        );
        assert!(!store.has_quota_capability(&id("scratch")).unwrap());

        engine.process(&add_doc(&store, "kept", "folder", 10)).unwrap();
        assert_eq!(meta(&store, "folder").total_size, 10);
    }

    // ---------------------------------------------------------------
    // Infrastructure failures
    // ---------------------------------------------------------------

    #[test]
    fn missing_target_is_infrastructure_error() {
        let engine = QuotaEngine::new(folder_store());
        let err = engine.process(&LifecycleEvent::created(id("ghost"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(matches!(err, QuotaError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn broken_parent_link_writes_nothing() {
        // root -> top -> mid -> leaf, then mid disappears
        let store = InMemoryNodeStore::with_root(id("root"));
        store.insert_node(Node::child(id("top"), id("root"), "top", 0)).unwrap();
        store.insert_node(Node::child(id("mid"), id("top"), "mid", 0)).unwrap();
        store.insert_node(Node::child(id("leaf"), id("mid"), "leaf", 10)).unwrap();
        store.remove_node(&id("mid")).unwrap();
        let store = Arc::new(store);
        let engine = QuotaEngine::new(store.clone());

        let err = engine.process(&LifecycleEvent::created(id("leaf"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(matches!(err, QuotaError::AncestorWalk { .. }));
        assert!(!store.has_quota_capability(&id("leaf")).unwrap());
        assert!(!store.has_quota_capability(&id("top")).unwrap());
    }

    #[test]
    fn move_without_source_parent_is_invalid() {
        let store = folder_store();
        let engine = QuotaEngine::new(store.clone());
        let event = LifecycleEvent::new(crate::event::names::DOCUMENT_MOVED, id("existing"));
        let err = engine.process(&event).unwrap_err();
        assert!(matches!(err, QuotaError::InvalidEvent { .. }));
    }

    #[test]
    fn zero_walk_depth_is_rejected() {
        let config = QuotaConfig {
            max_walk_depth: 0,
            ..QuotaConfig::default()
        };
        assert!(QuotaEngine::with_config(folder_store(), config).is_err());
    }

    // ---------------------------------------------------------------
    // Recompute
    // ---------------------------------------------------------------

    #[test]
    fn recompute_from_root_initialises_existing_tree() {
        let store = folder_store();
        let engine = QuotaEngine::new(store.clone());
        let report = engine.recompute(&id("root")).unwrap();
        assert_eq!(report.nodes, 2);
        assert!(report.over_limit.is_empty());
        assert_eq!(meta(&store, "folder").total_size, 800);
        assert!(!store.has_quota_capability(&id("root")).unwrap());
    }

    #[test]
    fn recompute_subtree_corrects_ancestors() {
        let store = folder_store();
        store
            .insert_node(Node::child(id("sub"), id("folder"), "sub", 0))
            .unwrap();
        store
            .insert_node(Node::child(id("x"), id("sub"), "x", 300))
            .unwrap();
        let engine = QuotaEngine::new(store.clone());
        engine.process(&LifecycleEvent::created(id("existing"))).unwrap();
        assert_eq!(meta(&store, "folder").total_size, 800);

        let report = engine.recompute(&id("sub")).unwrap();
        assert_eq!(report.nodes, 2);
        assert_eq!(meta(&store, "sub").total_size, 300);
        // Corrections are not checked: folder ends up over its limit.
        assert_eq!(meta(&store, "folder").total_size, 1100);
        assert!(meta(&store, "folder").is_over_limit());
    }

    #[test]
    fn recompute_reports_over_limit_nodes() {
        let store = folder_store();
        store.set_max_size(&id("folder"), Some(500)).unwrap();
        let engine = QuotaEngine::new(store);
        let report = engine.recompute(&id("root")).unwrap();
        assert_eq!(report.over_limit, vec![id("folder")]);
    }

    // ---------------------------------------------------------------
    // Concurrency
    // ---------------------------------------------------------------

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuotaEngine<InMemoryNodeStore>>();
        assert_send_sync::<QuotaEngine<dyn NodeStore>>();
    }

    #[test]
    fn concurrent_creates_sum_exactly() {
        let store = folder_store();
        store.set_max_size(&id("folder"), None).unwrap();
        let engine = Arc::new(QuotaEngine::new(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let name = format!("doc-{t}-{i}");
                        let event = add_doc(engine.store(), &name, "folder", 4);
                        engine.process(&event).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(meta(&store, "folder").total_size, 8 * 25 * 4);
    }

    // ---------------------------------------------------------------
    // Property: incremental updates match a full recompute
    // ---------------------------------------------------------------

    mod props {
        use super::*;
        use crate::recompute::compute_subtree;
        use proptest::prelude::*;

        const FOLDERS: [&str; 4] = ["f0", "f1", "f2", "f3"];

        #[derive(Clone, Debug)]
        enum Step {
            Create { folder: usize, size: u64 },
            Update { doc: usize, size: u64 },
            Remove { doc: usize },
            Move { doc: usize, folder: usize },
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0..FOLDERS.len(), 0u64..10_000)
                    .prop_map(|(folder, size)| Step::Create { folder, size }),
                (any::<usize>(), 0u64..10_000).prop_map(|(doc, size)| Step::Update { doc, size }),
                any::<usize>().prop_map(|doc| Step::Remove { doc }),
                (any::<usize>(), 0..FOLDERS.len())
                    .prop_map(|(doc, folder)| Step::Move { doc, folder }),
            ]
        }

        /// root -> f0 -> (f1 -> f3, f2)
        fn folders() -> Arc<InMemoryNodeStore> {
            let store = InMemoryNodeStore::with_root(id("root"));
            for (folder, parent) in [("f0", "root"), ("f1", "f0"), ("f2", "f0"), ("f3", "f1")] {
                store
                    .insert_node(Node::child(id(folder), id(parent), folder, 0))
                    .unwrap();
            }
            Arc::new(store)
        }

        proptest! {
            #[test]
            fn totals_match_recompute(steps in proptest::collection::vec(step(), 1..40)) {
                let store = folders();
                let engine = QuotaEngine::new(store.clone());
                let mut docs: Vec<NodeId> = Vec::new();

                for (n, step) in steps.into_iter().enumerate() {
                    match step {
                        Step::Create { folder, size } => {
                            let doc = id(&format!("doc{n}"));
                            store.insert_node(Node::child(doc.clone(), id(FOLDERS[folder]), "d", size)).unwrap();
                            engine.process(&LifecycleEvent::created(doc.clone())).unwrap();
                            docs.push(doc);
                        }
                        Step::Update { doc, size } if !docs.is_empty() => {
                            let doc = &docs[doc % docs.len()];
                            engine.process(&LifecycleEvent::before_modification(doc.clone())).unwrap();
                            store.set_content_size(doc, size).unwrap();
                            engine.process(&LifecycleEvent::modified(doc.clone())).unwrap();
                        }
                        Step::Remove { doc } if !docs.is_empty() => {
                            let doc = docs.remove(doc % docs.len());
                            engine.process(&LifecycleEvent::about_to_remove(doc.clone())).unwrap();
                            store.remove_subtree(&doc).unwrap();
                        }
                        Step::Move { doc, folder } if !docs.is_empty() => {
                            let doc = &docs[doc % docs.len()];
                            let previous = store.move_node(doc, &id(FOLDERS[folder])).unwrap().unwrap();
                            engine.process(&LifecycleEvent::moved(doc.clone(), previous)).unwrap();
                        }
                        _ => {}
                    }
                }

                let expected = compute_subtree(store.as_ref(), &id("f0"), false).unwrap();
                for (node, stats) in expected {
                    let actual = meta(&store, node.as_str());
                    prop_assert_eq!(actual.total_size, stats.total_size, "total of {}", node);
                    prop_assert_eq!(actual.inner_size, stats.inner_size, "inner of {}", node);
                }
            }
        }
    }
}

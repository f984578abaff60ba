//! Root-exclusive ancestor chains.
//!
//! [`AncestorWalker`] climbs parent links one store read at a time. Nothing
//! is cached between calls: a move between two events changes the chain the
//! next walk sees.

use std::collections::HashSet;

use quota_store::{NodeStore, StoreError};
use quota_types::{Node, NodeId};

use crate::error::QuotaError;

/// Why a walk stopped before reaching the root.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WalkFailure {
    /// A parent could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The parent links loop.
    #[error("parent chain loops back to {0}")]
    Cycle(NodeId),
    /// The chain is longer than the configured maximum depth.
    #[error("parent chain deeper than {0} levels")]
    TooDeep(usize),
}

/// A walk that broke off, with the ancestors collected so far.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("ancestor walk stopped after {} nodes: {failure}", .partial.len())]
pub struct AncestorWalkError {
    /// Ancestors collected before the failure, nearest first.
    pub partial: Vec<Node>,
    #[source]
    pub failure: WalkFailure,
}

impl AncestorWalkError {
    /// Convert into an engine error for the walk that started at `node`.
    pub fn into_quota_error(self, node: &NodeId) -> QuotaError {
        QuotaError::AncestorWalk {
            node: node.clone(),
            partial: self.partial.into_iter().map(|n| n.id).collect(),
            failure: self.failure,
        }
    }
}

/// Produces ancestor chains from a [`NodeStore`].
pub struct AncestorWalker<'a, S: ?Sized> {
    store: &'a S,
    max_depth: usize,
}

impl<'a, S: NodeStore + ?Sized> AncestorWalker<'a, S> {
    pub fn new(store: &'a S, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// Ancestors of `id`, from its parent up to the last node below the
    /// root.
    ///
    /// Empty for the root itself and for direct children of the root.
    pub fn ancestors_of(&self, id: &NodeId) -> Result<Vec<Node>, AncestorWalkError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.clone());

        let mut current = self.parent_of(id, &chain)?;
        while let Some(parent) = current {
            if parent.is_root() {
                break;
            }
            if !visited.insert(parent.id.clone()) {
                return Err(AncestorWalkError {
                    partial: chain,
                    failure: WalkFailure::Cycle(parent.id),
                });
            }
            if chain.len() >= self.max_depth {
                return Err(AncestorWalkError {
                    partial: chain,
                    failure: WalkFailure::TooDeep(self.max_depth),
                });
            }
            let parent_id = parent.id.clone();
            chain.push(parent);
            // Re-read the link from the store instead of trusting `parent`.
            current = self.parent_of(&parent_id, &chain)?;
        }
        Ok(chain)
    }

    /// `id` itself (unless it is the root) followed by its ancestors.
    pub fn self_and_ancestors(&self, id: &NodeId) -> Result<Vec<Node>, AncestorWalkError> {
        let node = self.store.node(id).map_err(|e| AncestorWalkError {
            partial: Vec::new(),
            failure: e.into(),
        })?;
        if node.is_root() {
            return Ok(Vec::new());
        }
        let mut chain = vec![node];
        match self.ancestors_of(id) {
            Ok(ancestors) => {
                chain.extend(ancestors);
                Ok(chain)
            }
            Err(mut err) => {
                chain.append(&mut err.partial);
                err.partial = chain;
                Err(err)
            }
        }
    }

    fn parent_of(&self, id: &NodeId, chain: &[Node]) -> Result<Option<Node>, AncestorWalkError> {
        self.store.get_parent(id).map_err(|e| AncestorWalkError {
            partial: chain.to_vec(),
            failure: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quota_store::InMemoryNodeStore;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    /// root -> a -> b -> c
    fn chain_store() -> InMemoryNodeStore {
        let store = InMemoryNodeStore::with_root(id("root"));
        store.insert_node(Node::child(id("a"), id("root"), "a", 0)).unwrap();
        store.insert_node(Node::child(id("b"), id("a"), "b", 0)).unwrap();
        store.insert_node(Node::child(id("c"), id("b"), "c", 0)).unwrap();
        store
    }

    fn ids(nodes: &[Node]) -> Vec<String> {
        nodes.iter().map(|n| n.id.to_string()).collect()
    }

    #[test]
    fn ancestors_are_nearest_first_and_root_exclusive() {
        let store = chain_store();
        let walker = AncestorWalker::new(&store, 16);
        assert_eq!(ids(&walker.ancestors_of(&id("c")).unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn root_and_its_children_have_no_ancestors() {
        let store = chain_store();
        let walker = AncestorWalker::new(&store, 16);
        assert!(walker.ancestors_of(&id("root")).unwrap().is_empty());
        assert!(walker.ancestors_of(&id("a")).unwrap().is_empty());
    }

    #[test]
    fn walk_reflects_moves_between_calls() {
        let store = chain_store();
        let walker = AncestorWalker::new(&store, 16);
        assert_eq!(walker.ancestors_of(&id("c")).unwrap().len(), 2);
        store.move_node(&id("c"), &id("a")).unwrap();
        assert_eq!(ids(&walker.ancestors_of(&id("c")).unwrap()), vec!["a"]);
    }

    #[test]
    fn self_and_ancestors_includes_start() {
        let store = chain_store();
        let walker = AncestorWalker::new(&store, 16);
        assert_eq!(
            ids(&walker.self_and_ancestors(&id("b")).unwrap()),
            vec!["b", "a"]
        );
        assert!(walker.self_and_ancestors(&id("root")).unwrap().is_empty());
    }

    #[test]
    fn missing_start_node_fails_with_empty_partial() {
        let store = chain_store();
        let walker = AncestorWalker::new(&store, 16);
        let err = walker.ancestors_of(&id("ghost")).unwrap_err();
        assert!(err.partial.is_empty());
        assert_eq!(
            err.failure,
            WalkFailure::Store(StoreError::NotFound(id("ghost")))
        );
    }

    #[test]
    fn depth_limit_returns_partial_chain() {
        let store = chain_store();
        let walker = AncestorWalker::new(&store, 1);
        let err = walker.ancestors_of(&id("c")).unwrap_err();
        assert_eq!(ids(&err.partial), vec!["b"]);
        assert_eq!(err.failure, WalkFailure::TooDeep(1));
    }

    /// A store whose tree reads fail for one node, to break walks midway.
    struct BrokenLink {
        inner: InMemoryNodeStore,
        broken: NodeId,
    }

    impl NodeStore for BrokenLink {
        fn get_node(&self, id: &NodeId) -> quota_store::StoreResult<Option<Node>> {
            if id == &self.broken {
                return Err(StoreError::Unavailable("disk error".into()));
            }
            self.inner.get_node(id)
        }
        fn children(&self, id: &NodeId) -> quota_store::StoreResult<Vec<Node>> {
            self.inner.children(id)
        }
        fn versions(&self, id: &NodeId) -> quota_store::StoreResult<Vec<Node>> {
            self.inner.versions(id)
        }
        fn read_quota_metadata(
            &self,
            id: &NodeId,
        ) -> quota_store::StoreResult<Option<quota_types::QuotaMetadata>> {
            self.inner.read_quota_metadata(id)
        }
        fn write_quota_metadata(
            &self,
            id: &NodeId,
            metadata: &quota_types::QuotaMetadata,
        ) -> quota_store::StoreResult<()> {
            self.inner.write_quota_metadata(id, metadata)
        }
        fn has_quota_capability(&self, id: &NodeId) -> quota_store::StoreResult<bool> {
            self.inner.has_quota_capability(id)
        }
        fn attach_quota_capability(&self, id: &NodeId) -> quota_store::StoreResult<bool> {
            self.inner.attach_quota_capability(id)
        }
    }

    #[test]
    fn unreachable_parent_returns_partial_chain() {
        let store = BrokenLink {
            inner: chain_store(),
            broken: id("a"),
        };
        let walker = AncestorWalker::new(&store, 16);
        let err = walker.ancestors_of(&id("c")).unwrap_err();
        assert_eq!(ids(&err.partial), vec!["b"]);
        assert!(matches!(err.failure, WalkFailure::Store(StoreError::Unavailable(_))));

        let quota_err = err.into_quota_error(&id("c"));
        assert!(quota_err.to_string().contains("after 1 ancestors"));
    }
}

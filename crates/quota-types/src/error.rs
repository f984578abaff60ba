use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid node id {0:?}: must be non-empty and contain no whitespace")]
    InvalidNodeId(String),
}

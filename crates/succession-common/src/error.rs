//! Error types for Succession
//!
//! `CoordinationError` mirrors the failure codes a hierarchical coordination store
//! reports, plus the local misuse and wrapped failures raised around it.

/// Error type for coordination operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("node does not exist: {0}")]
    NoNode(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("version mismatch on {path}: expected={expected}, actual={actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("ephemeral node cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    #[error("session expired")]
    SessionExpired,

    #[error("connection loss")]
    ConnectionLoss,

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CoordinationError {
    /// True when the error reports a missing node.
    pub fn is_no_node(&self) -> bool {
        matches!(self, CoordinationError::NoNode(_))
    }

    /// True when the error reports that the node was already there.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, CoordinationError::NodeExists(_))
    }
}

pub type Result<T> = std::result::Result<T, CoordinationError>;

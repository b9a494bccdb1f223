use crate::snapshot::SnapshotError;
use crate::wal::WalError;
use hybridgraph_core::error::{CodedError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Edge => write!(f, "edge"),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Source => write!(f, "source"),
            Endpoint::Target => write!(f, "target"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("id already exists: {0}")]
    DuplicateId(String),
    #[error("edge {endpoint} node {id} does not exist")]
    InvalidReference { endpoint: Endpoint, id: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
}

impl StoreError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind: EntityKind::Node,
            id: id.into(),
        }
    }

    pub fn edge_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind: EntityKind::Edge,
            id: id.into(),
        }
    }

    /// Snapshot and log failures, i.e. anything that went wrong talking to disk.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, StoreError::Snapshot(_) | StoreError::Wal(_))
    }
}

impl CodedError for StoreError {
    fn error_code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound { .. } => ErrorCode::NotFound,
            StoreError::DuplicateId(_) => ErrorCode::AlreadyExists,
            StoreError::InvalidReference { .. } => ErrorCode::InvalidArgument,
            StoreError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            StoreError::Snapshot(_) => ErrorCode::Internal,
            StoreError::Wal(_) => ErrorCode::Internal,
        }
    }
}

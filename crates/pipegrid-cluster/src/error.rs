//! Cluster error types.

use thiserror::Error;

/// Errors returned by `NodeManager` operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node {0} is dead")]
    NodeUnavailable(String),

    #[error("insufficient capacity on {node_id}: requested {requested_mb} MB, available {available_mb} MB")]
    InsufficientCapacity {
        node_id: String,
        requested_mb: u64,
        available_mb: u64,
    },

    #[error("node {node_id} cannot shrink to {memory_mb} MB: {reserved_mb} MB already reserved")]
    CapacityBelowReserved {
        node_id: String,
        memory_mb: u64,
        reserved_mb: u64,
    },

    #[error("component {component} already holds a reservation on {node_id}")]
    AlreadyReserved { component: String, node_id: String },
}

pub type ClusterResult<T> = Result<T, ClusterError>;

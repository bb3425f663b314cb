//! Error types for cairn-node

use thiserror::Error;

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors that can occur while talking to a node
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    /// The node could not be reached, timed out, or answered with an error
    #[error("cannot reach node at {endpoint}: {message}")]
    Connectivity { endpoint: String, message: String },

    /// Node connection config is missing or unusable
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot file could not be loaded
    #[error("invalid snapshot {path}: {message}")]
    Snapshot { path: String, message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    pub fn connectivity(endpoint: impl Into<String>, message: impl ToString) -> Self {
        NodeError::Connectivity {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, NodeError::Connectivity { .. })
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for NodeError {
    fn from(e: serde_yaml::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}

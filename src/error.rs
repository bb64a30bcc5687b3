//! Engine error taxonomy.
//!
//! Findings such as cycles or orphans are not errors: they are reported
//! inside a [`ValidationReport`](crate::graph::ValidationReport). Only
//! unresolvable references, bad arguments, structurally impossible data and
//! cancellation surface as [`EngineError`].

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the knowledge graph engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A graph, node, learner or path reference does not resolve.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// An argument is outside its accepted domain (zero limit, bad type name, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored data is structurally impossible (e.g. a dangling relation endpoint).
    #[error("Inconsistent graph data: {0}")]
    Inconsistent(String),

    /// The caller's cancellation token fired or the call deadline passed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Failure reported by a store or learner-history port.
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn graph_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "graph", id }
    }

    pub fn node_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "node", id }
    }

    pub fn learner_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "learner", id }
    }

    pub fn relation_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "relation", id }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }

    /// True for the `NotFound` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let id = Uuid::nil();
        let err = EngineError::node_not_found(id);
        assert_eq!(err.to_string(), format!("node not found: {}", id));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_store_error_from_anyhow() {
        let err: EngineError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, EngineError::Store(_)));
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Store error: connection reset");
    }

    #[test]
    fn test_invalid_and_inconsistent_messages() {
        assert_eq!(
            EngineError::invalid("limit must be > 0").to_string(),
            "Invalid argument: limit must be > 0"
        );
        assert_eq!(
            EngineError::inconsistent("dangling").to_string(),
            "Inconsistent graph data: dangling"
        );
        assert_eq!(EngineError::Cancelled.to_string(), "Operation cancelled");
    }
}

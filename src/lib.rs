//! Knowledge Graph Engine
//!
//! Analytics and recommendations over educational knowledge graphs:
//! - Structural validation (orphans, bounded prerequisite cycles, duplicates)
//! - Connectivity and complexity metrics
//! - Per-learner difficulty prediction
//! - Next-node and learning-path recommendations
//! - Bounded concept-map extraction
//!
//! Graph data and learner progress are read through the
//! [`GraphStore`](store::GraphStore) and [`LearnerHistory`](store::LearnerHistory)
//! ports. An in-memory implementation of both ships with the crate.

pub mod config;
pub mod error;
pub mod graph;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use graph::{GraphKnowledgeEngine, KnowledgeEngine};
pub use store::{GraphSnapshot, GraphStore, InMemoryGraphStore, InMemoryLearnerHistory, LearnerHistory};

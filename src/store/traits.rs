//! Store port definitions.
//!
//! The engine never talks to a database directly: it reads graphs through
//! [`GraphStore`] and learner progress through [`LearnerHistory`]. Both are
//! read-only from the engine's point of view, which lets a database adapter
//! or the in-memory reference store back the same analyses.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use super::models::{KnowledgeGraph, KnowledgeNode, KnowledgeRelation, LearningPath};

/// Read access to knowledge graphs, their nodes, relations and stored paths.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Graphs
    // ========================================================================

    /// Get a graph by ID
    async fn get_graph(&self, id: Uuid) -> Result<Option<KnowledgeGraph>>;

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Get a node by ID
    async fn get_node(&self, id: Uuid) -> Result<Option<KnowledgeNode>>;

    /// List all nodes of a graph
    async fn list_nodes(&self, graph_id: Uuid) -> Result<Vec<KnowledgeNode>>;

    // ========================================================================
    // Relations
    // ========================================================================

    /// Relations whose source is `node_id`
    async fn get_relations_from(&self, node_id: Uuid) -> Result<Vec<KnowledgeRelation>>;

    /// Relations whose target is `node_id`
    async fn get_relations_to(&self, node_id: Uuid) -> Result<Vec<KnowledgeRelation>>;

    /// List all relations of a graph
    async fn list_relations(&self, graph_id: Uuid) -> Result<Vec<KnowledgeRelation>>;

    // ========================================================================
    // Learning paths
    // ========================================================================

    /// List the stored learning paths of a graph
    async fn list_learning_paths(&self, graph_id: Uuid) -> Result<Vec<LearningPath>>;
}

/// Read access to learner progress. Never mutated by the engine.
#[async_trait]
pub trait LearnerHistory: Send + Sync {
    /// Node ids the learner has mastered in a graph.
    ///
    /// Returns `None` when the learner is unknown, `Some(empty)` for a known
    /// learner with no progress in this graph.
    async fn get_mastered_nodes(
        &self,
        learner_id: Uuid,
        graph_id: Uuid,
    ) -> Result<Option<HashSet<Uuid>>>;

    /// Learning path ids the learner has completed in a graph.
    async fn get_completed_paths(&self, learner_id: Uuid, graph_id: Uuid) -> Result<HashSet<Uuid>>;

    /// Attempt scores (0-100) the learner obtained on a node.
    async fn get_attempt_scores(&self, learner_id: Uuid, node_id: Uuid) -> Result<Vec<f64>>;
}

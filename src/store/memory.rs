//! In-memory reference implementation of the store ports.
//!
//! Every collection sits behind its own `tokio::sync::RwLock`, so each read
//! observes a consistent snapshot of that collection. Writers that touch
//! several collections always lock in the order graphs, nodes, relations,
//! paths.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{KnowledgeGraph, KnowledgeNode, KnowledgeRelation, LearningPath};
use super::traits::{GraphStore, LearnerHistory};
use crate::error::{EngineError, Result as EngineResult};

// ============================================================================
// Graph store
// ============================================================================

/// In-memory graph store with the authoring write path.
///
/// # Example
///
/// ```
/// use knowledge_graph_engine::store::{
///     DifficultyLevel, GraphStore, InMemoryGraphStore, KnowledgeGraph, KnowledgeNode,
///     KnowledgeRelation, RelationType,
/// };
///
/// # tokio_test::block_on(async {
/// let store = InMemoryGraphStore::new();
/// let graph = KnowledgeGraph::new("Algebra", "mathematics");
/// let g = graph.id;
/// store.create_graph(graph).await.unwrap();
///
/// let a = KnowledgeNode::new(g, "Variables", DifficultyLevel::Beginner);
/// let b = KnowledgeNode::new(g, "Equations", DifficultyLevel::Elementary);
/// let (a_id, b_id) = (a.id, b.id);
/// store.add_node(a).await.unwrap();
/// store.add_node(b).await.unwrap();
/// store
///     .add_relation(KnowledgeRelation::new(g, a_id, b_id, RelationType::Prerequisite))
///     .await
///     .unwrap();
///
/// assert_eq!(store.get_relations_to(b_id).await.unwrap().len(), 1);
///
/// // Removing a node drops every relation touching it
/// store.remove_node(a_id).await.unwrap();
/// assert!(store.list_relations(g).await.unwrap().is_empty());
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryGraphStore {
    pub graphs: RwLock<HashMap<Uuid, KnowledgeGraph>>,
    pub nodes: RwLock<HashMap<Uuid, KnowledgeNode>>,
    pub relations: RwLock<HashMap<Uuid, KnowledgeRelation>>,
    pub learning_paths: RwLock<HashMap<Uuid, LearningPath>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Graph write path
    // ========================================================================

    /// Create a graph. Fails if the id is already taken.
    pub async fn create_graph(&self, graph: KnowledgeGraph) -> EngineResult<()> {
        let mut graphs = self.graphs.write().await;
        if graphs.contains_key(&graph.id) {
            return Err(EngineError::invalid(format!("graph {} already exists", graph.id)));
        }
        tracing::debug!(graph_id = %graph.id, name = %graph.name, "Created graph");
        graphs.insert(graph.id, graph);
        Ok(())
    }

    /// Replace a graph's metadata.
    pub async fn update_graph(&self, mut graph: KnowledgeGraph) -> EngineResult<()> {
        let mut graphs = self.graphs.write().await;
        let existing = graphs
            .get(&graph.id)
            .ok_or_else(|| EngineError::graph_not_found(graph.id))?;
        graph.created_at = existing.created_at;
        graph.updated_at = Utc::now();
        graphs.insert(graph.id, graph);
        Ok(())
    }

    /// Delete a graph together with its nodes, relations and learning paths.
    pub async fn delete_graph(&self, id: Uuid) -> EngineResult<()> {
        let mut graphs = self.graphs.write().await;
        if graphs.remove(&id).is_none() {
            return Err(EngineError::graph_not_found(id));
        }
        let mut nodes = self.nodes.write().await;
        let mut relations = self.relations.write().await;
        let mut paths = self.learning_paths.write().await;

        let before = nodes.len();
        nodes.retain(|_, n| n.graph_id != id);
        relations.retain(|_, r| r.graph_id != id);
        paths.retain(|_, p| p.graph_id != id);

        tracing::debug!(graph_id = %id, removed_nodes = before - nodes.len(), "Deleted graph");
        Ok(())
    }

    // ========================================================================
    // Node write path
    // ========================================================================

    /// Add a node to an existing graph after validating its invariants.
    pub async fn add_node(&self, node: KnowledgeNode) -> EngineResult<()> {
        node.validate()?;
        let graphs = self.graphs.read().await;
        if !graphs.contains_key(&node.graph_id) {
            return Err(EngineError::graph_not_found(node.graph_id));
        }
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&node.id) {
            return Err(EngineError::invalid(format!("node {} already exists", node.id)));
        }
        nodes.insert(node.id, node);
        Ok(())
    }

    /// Replace a node. The node cannot move to another graph.
    pub async fn update_node(&self, mut node: KnowledgeNode) -> EngineResult<()> {
        node.validate()?;
        let mut nodes = self.nodes.write().await;
        let existing = nodes
            .get(&node.id)
            .ok_or_else(|| EngineError::node_not_found(node.id))?;
        if existing.graph_id != node.graph_id {
            return Err(EngineError::invalid(format!(
                "node {} cannot move from graph {} to {}",
                node.id, existing.graph_id, node.graph_id
            )));
        }
        node.created_at = existing.created_at;
        node.updated_at = Utc::now();
        nodes.insert(node.id, node);
        Ok(())
    }

    /// Remove a node, every relation touching it and its learning path steps.
    pub async fn remove_node(&self, id: Uuid) -> EngineResult<()> {
        let mut nodes = self.nodes.write().await;
        if nodes.remove(&id).is_none() {
            return Err(EngineError::node_not_found(id));
        }
        let mut relations = self.relations.write().await;
        let mut paths = self.learning_paths.write().await;

        let before = relations.len();
        relations.retain(|_, r| r.source_id != id && r.target_id != id);
        for path in paths.values_mut() {
            path.steps.retain(|s| s.node_id != id);
        }

        tracing::debug!(node_id = %id, removed_relations = before - relations.len(), "Removed node");
        Ok(())
    }

    // ========================================================================
    // Relation write path
    // ========================================================================

    /// Both endpoints must exist in the relation's graph. Callers keep the
    /// nodes guard until the relation is stored so `remove_node` cannot slip
    /// in between.
    fn check_endpoints(
        nodes: &HashMap<Uuid, KnowledgeNode>,
        relation: &KnowledgeRelation,
    ) -> EngineResult<()> {
        for endpoint in [relation.source_id, relation.target_id] {
            let node = nodes
                .get(&endpoint)
                .ok_or_else(|| EngineError::node_not_found(endpoint))?;
            if node.graph_id != relation.graph_id {
                return Err(EngineError::invalid(format!(
                    "relation {}: node {} belongs to graph {}, not {}",
                    relation.id, endpoint, node.graph_id, relation.graph_id
                )));
            }
        }
        Ok(())
    }

    /// Add a relation. Both endpoints must exist in the relation's graph.
    pub async fn add_relation(&self, relation: KnowledgeRelation) -> EngineResult<()> {
        relation.validate()?;
        let nodes = self.nodes.read().await;
        Self::check_endpoints(&nodes, &relation)?;
        let mut relations = self.relations.write().await;
        if relations.contains_key(&relation.id) {
            return Err(EngineError::invalid(format!(
                "relation {} already exists",
                relation.id
            )));
        }
        relations.insert(relation.id, relation);
        Ok(())
    }

    /// Replace a relation, re-checking its endpoints.
    pub async fn update_relation(&self, mut relation: KnowledgeRelation) -> EngineResult<()> {
        relation.validate()?;
        let nodes = self.nodes.read().await;
        Self::check_endpoints(&nodes, &relation)?;
        let mut relations = self.relations.write().await;
        let existing = relations
            .get(&relation.id)
            .ok_or_else(|| EngineError::relation_not_found(relation.id))?;
        relation.created_at = existing.created_at;
        relation.updated_at = Utc::now();
        relations.insert(relation.id, relation);
        Ok(())
    }

    pub async fn remove_relation(&self, id: Uuid) -> EngineResult<()> {
        self.relations
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::relation_not_found(id))
    }

    // ========================================================================
    // Learning path write path
    // ========================================================================

    /// Store a learning path. Every step must reference a node of the path's graph.
    pub async fn add_learning_path(&self, path: LearningPath) -> EngineResult<()> {
        if !self.graphs.read().await.contains_key(&path.graph_id) {
            return Err(EngineError::graph_not_found(path.graph_id));
        }
        let nodes = self.nodes.read().await;
        for step in &path.steps {
            match nodes.get(&step.node_id) {
                Some(n) if n.graph_id == path.graph_id => {}
                Some(_) => {
                    return Err(EngineError::invalid(format!(
                        "learning path {}: node {} is outside graph {}",
                        path.id, step.node_id, path.graph_id
                    )))
                }
                None => return Err(EngineError::node_not_found(step.node_id)),
            }
        }
        self.learning_paths.write().await.insert(path.id, path);
        Ok(())
    }

    // ========================================================================
    // Raw seeding (no validation)
    // ========================================================================

    /// Insert a relation without checking its endpoints.
    ///
    /// Lets adapters and tests reproduce data a real database may hold, such
    /// as relations whose endpoint was deleted out of band.
    pub async fn seed_relation(&self, relation: KnowledgeRelation) {
        self.relations.write().await.insert(relation.id, relation);
    }

    /// Insert a node without validation.
    pub async fn seed_node(&self, node: KnowledgeNode) {
        self.nodes.write().await.insert(node.id, node);
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_graph(&self, id: Uuid) -> Result<Option<KnowledgeGraph>> {
        Ok(self.graphs.read().await.get(&id).cloned())
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<KnowledgeNode>> {
        Ok(self.nodes.read().await.get(&id).cloned())
    }

    async fn list_nodes(&self, graph_id: Uuid) -> Result<Vec<KnowledgeNode>> {
        let mut nodes: Vec<KnowledgeNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.graph_id == graph_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn get_relations_from(&self, node_id: Uuid) -> Result<Vec<KnowledgeRelation>> {
        let mut rels: Vec<KnowledgeRelation> = self
            .relations
            .read()
            .await
            .values()
            .filter(|r| r.source_id == node_id)
            .cloned()
            .collect();
        rels.sort_by_key(|r| r.id);
        Ok(rels)
    }

    async fn get_relations_to(&self, node_id: Uuid) -> Result<Vec<KnowledgeRelation>> {
        let mut rels: Vec<KnowledgeRelation> = self
            .relations
            .read()
            .await
            .values()
            .filter(|r| r.target_id == node_id)
            .cloned()
            .collect();
        rels.sort_by_key(|r| r.id);
        Ok(rels)
    }

    async fn list_relations(&self, graph_id: Uuid) -> Result<Vec<KnowledgeRelation>> {
        let mut rels: Vec<KnowledgeRelation> = self
            .relations
            .read()
            .await
            .values()
            .filter(|r| r.graph_id == graph_id)
            .cloned()
            .collect();
        rels.sort_by_key(|r| r.id);
        Ok(rels)
    }

    async fn list_learning_paths(&self, graph_id: Uuid) -> Result<Vec<LearningPath>> {
        let mut paths: Vec<LearningPath> = self
            .learning_paths
            .read()
            .await
            .values()
            .filter(|p| p.graph_id == graph_id)
            .cloned()
            .collect();
        paths.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paths)
    }
}

// ============================================================================
// Learner history
// ============================================================================

/// In-memory learner progress keyed by (learner, graph) and (learner, node).
#[derive(Default)]
pub struct InMemoryLearnerHistory {
    pub learners: RwLock<HashSet<Uuid>>,
    pub mastered: RwLock<HashMap<(Uuid, Uuid), HashSet<Uuid>>>,
    pub completed_paths: RwLock<HashMap<(Uuid, Uuid), HashSet<Uuid>>>,
    pub attempts: RwLock<HashMap<(Uuid, Uuid), Vec<f64>>>,
}

impl InMemoryLearnerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a learner known without recording any progress.
    pub async fn register_learner(&self, learner_id: Uuid) {
        self.learners.write().await.insert(learner_id);
    }

    pub async fn mark_mastered(&self, learner_id: Uuid, graph_id: Uuid, node_id: Uuid) {
        self.register_learner(learner_id).await;
        self.mastered
            .write()
            .await
            .entry((learner_id, graph_id))
            .or_default()
            .insert(node_id);
    }

    pub async fn mark_path_completed(&self, learner_id: Uuid, graph_id: Uuid, path_id: Uuid) {
        self.register_learner(learner_id).await;
        self.completed_paths
            .write()
            .await
            .entry((learner_id, graph_id))
            .or_default()
            .insert(path_id);
    }

    /// Record an attempt score on the 0-100 scale.
    pub async fn record_attempt(
        &self,
        learner_id: Uuid,
        node_id: Uuid,
        score: f64,
    ) -> EngineResult<()> {
        if !(0.0..=100.0).contains(&score) {
            return Err(EngineError::invalid(format!(
                "attempt score must be within [0, 100], got {}",
                score
            )));
        }
        self.register_learner(learner_id).await;
        self.attempts
            .write()
            .await
            .entry((learner_id, node_id))
            .or_default()
            .push(score);
        Ok(())
    }
}

#[async_trait]
impl LearnerHistory for InMemoryLearnerHistory {
    async fn get_mastered_nodes(
        &self,
        learner_id: Uuid,
        graph_id: Uuid,
    ) -> Result<Option<HashSet<Uuid>>> {
        if !self.learners.read().await.contains(&learner_id) {
            return Ok(None);
        }
        Ok(Some(
            self.mastered
                .read()
                .await
                .get(&(learner_id, graph_id))
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn get_completed_paths(&self, learner_id: Uuid, graph_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .completed_paths
            .read()
            .await
            .get(&(learner_id, graph_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_attempt_scores(&self, learner_id: Uuid, node_id: Uuid) -> Result<Vec<f64>> {
        Ok(self
            .attempts
            .read()
            .await
            .get(&(learner_id, node_id))
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================

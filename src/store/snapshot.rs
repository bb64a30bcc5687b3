//! File snapshots of graphs and learner progress.
//!
//! A snapshot is a JSON or YAML document listing graphs, nodes, relations,
//! learning paths and learners. Loading goes through the in-memory write
//! path, so a snapshot with an invalid node or a dangling relation is
//! rejected instead of being half-loaded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use super::memory::{InMemoryGraphStore, InMemoryLearnerHistory};
use super::models::{KnowledgeGraph, KnowledgeNode, KnowledgeRelation, LearningPath};

/// One attempt score (0-100) on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub node_id: Uuid,
    pub score: f64,
}

/// Progress of one learner across graphs.
///
/// Mastered nodes and completed paths are attributed to the graph that
/// owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerRecord {
    pub id: Uuid,
    #[serde(default)]
    pub mastered: Vec<Uuid>,
    #[serde(default)]
    pub completed_paths: Vec<Uuid>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSnapshot {
    pub graphs: Vec<KnowledgeGraph>,
    pub nodes: Vec<KnowledgeNode>,
    pub relations: Vec<KnowledgeRelation>,
    pub learning_paths: Vec<LearningPath>,
    pub learners: Vec<LearnerRecord>,
}

impl GraphSnapshot {
    /// Read a snapshot file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let snapshot: Self = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON snapshot {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML snapshot {}", path.display()))?
        };
        tracing::info!(
            path = %path.display(),
            graphs = snapshot.graphs.len(),
            nodes = snapshot.nodes.len(),
            relations = snapshot.relations.len(),
            learners = snapshot.learners.len(),
            "Loaded graph snapshot"
        );
        Ok(snapshot)
    }

    /// Populate fresh in-memory stores through the validated write path.
    pub async fn into_stores(self) -> Result<(InMemoryGraphStore, InMemoryLearnerHistory)> {
        let store = InMemoryGraphStore::new();
        let history = InMemoryLearnerHistory::new();

        for graph in self.graphs {
            store.create_graph(graph).await?;
        }
        let mut node_graph = std::collections::HashMap::new();
        for node in self.nodes {
            node_graph.insert(node.id, node.graph_id);
            store.add_node(node).await?;
        }
        for relation in self.relations {
            store.add_relation(relation).await?;
        }
        let mut path_graph = std::collections::HashMap::new();
        for path in self.learning_paths {
            path_graph.insert(path.id, path.graph_id);
            store.add_learning_path(path).await?;
        }

        for learner in self.learners {
            history.register_learner(learner.id).await;
            for node_id in &learner.mastered {
                let graph_id = node_graph
                    .get(node_id)
                    .with_context(|| format!("learner {}: unknown mastered node {}", learner.id, node_id))?;
                history.mark_mastered(learner.id, *graph_id, *node_id).await;
            }
            for path_id in &learner.completed_paths {
                let graph_id = path_graph
                    .get(path_id)
                    .with_context(|| format!("learner {}: unknown completed path {}", learner.id, path_id))?;
                history.mark_path_completed(learner.id, *graph_id, *path_id).await;
            }
            for attempt in &learner.attempts {
                history
                    .record_attempt(learner.id, attempt.node_id, attempt.score)
                    .await?;
            }
        }

        Ok((store, history))
    }
}

//! Test helper factories for graphs, nodes and learner history.
#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::graph::GraphKnowledgeEngine;
use crate::store::{
    DifficultyLevel, InMemoryGraphStore, InMemoryLearnerHistory, KnowledgeGraph, KnowledgeNode,
    KnowledgeRelation, RelationType,
};

// ============================================================================
// Factories
// ============================================================================

pub fn node(graph_id: Uuid, name: &str, level: DifficultyLevel) -> KnowledgeNode {
    KnowledgeNode::new(graph_id, name, level)
}

/// Store with one empty graph.
pub async fn empty_graph() -> (InMemoryGraphStore, Uuid) {
    let store = InMemoryGraphStore::new();
    let graph = KnowledgeGraph::new("Test graph", "testing");
    let id = graph.id;
    store.create_graph(graph).await.expect("create graph");
    (store, id)
}

/// Add nodes with the given names and levels, returning their ids in order.
pub async fn add_nodes(
    store: &InMemoryGraphStore,
    graph_id: Uuid,
    specs: &[(&str, DifficultyLevel)],
) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(specs.len());
    for (name, level) in specs {
        let n = node(graph_id, name, *level);
        ids.push(n.id);
        store.add_node(n).await.expect("add node");
    }
    ids
}

pub async fn link(
    store: &InMemoryGraphStore,
    graph_id: Uuid,
    source: Uuid,
    target: Uuid,
    relation_type: RelationType,
) -> Uuid {
    let rel = KnowledgeRelation::new(graph_id, source, target, relation_type);
    let id = rel.id;
    store.add_relation(rel).await.expect("add relation");
    id
}

/// A (beginner) → B (intermediate) → C (advanced), prerequisite chain.
pub async fn chain_graph() -> (InMemoryGraphStore, Uuid, Vec<Uuid>) {
    let (store, g) = empty_graph().await;
    let ids = add_nodes(
        &store,
        g,
        &[
            ("A", DifficultyLevel::Beginner),
            ("B", DifficultyLevel::Intermediate),
            ("C", DifficultyLevel::Advanced),
        ],
    )
    .await;
    link(&store, g, ids[0], ids[1], RelationType::Prerequisite).await;
    link(&store, g, ids[1], ids[2], RelationType::Prerequisite).await;
    (store, g, ids)
}

/// `n` beginner nodes linked in a line by `related_to` relations.
pub async fn related_chain(n: usize) -> (InMemoryGraphStore, Uuid, Vec<Uuid>) {
    let (store, g) = empty_graph().await;
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let n = node(g, &format!("N{i}"), DifficultyLevel::Beginner);
        ids.push(n.id);
        store.add_node(n).await.expect("add node");
    }
    for pair in ids.windows(2) {
        link(&store, g, pair[0], pair[1], RelationType::RelatedTo).await;
    }
    (store, g, ids)
}

/// Learner history with one learner who mastered `mastered` in `graph_id`.
pub async fn learner_with(graph_id: Uuid, mastered: &[Uuid]) -> (InMemoryLearnerHistory, Uuid) {
    let history = InMemoryLearnerHistory::new();
    let learner = Uuid::new_v4();
    history.register_learner(learner).await;
    for id in mastered {
        history.mark_mastered(learner, graph_id, *id).await;
    }
    (history, learner)
}

pub fn engine_for(
    store: InMemoryGraphStore,
    history: InMemoryLearnerHistory,
) -> GraphKnowledgeEngine {
    engine_with(store, history, EngineConfig::default())
}

pub fn engine_with(
    store: InMemoryGraphStore,
    history: InMemoryLearnerHistory,
    config: EngineConfig,
) -> GraphKnowledgeEngine {
    GraphKnowledgeEngine::new(Arc::new(store), Arc::new(history), config)
}

//! End-to-end tests for the knowledge engine public API.
//!
//! Everything runs against the in-memory store; no external services needed.

use knowledge_graph_engine::graph::{PathSource, RiskFactor, Severity};
use knowledge_graph_engine::store::{
    DifficultyLevel, InMemoryGraphStore, InMemoryLearnerHistory, KnowledgeGraph, KnowledgeNode,
    KnowledgeRelation, LearnerRecord, LearningPath, RelationType,
};
use knowledge_graph_engine::{
    EngineConfig, EngineError, GraphKnowledgeEngine, GraphSnapshot, KnowledgeEngine,
};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    store: InMemoryGraphStore,
    graph_id: Uuid,
    a: Uuid,
    b: Uuid,
    c: Uuid,
}

/// A (beginner) → B (intermediate) → C (advanced), prerequisite relations.
async fn calculus_chain() -> Fixture {
    let store = InMemoryGraphStore::new();
    let graph = KnowledgeGraph::new("Calculus", "mathematics");
    let graph_id = graph.id;
    store.create_graph(graph).await.unwrap();

    let a = KnowledgeNode::new(graph_id, "Limits", DifficultyLevel::Beginner);
    let b = KnowledgeNode::new(graph_id, "Derivatives", DifficultyLevel::Intermediate);
    let c = KnowledgeNode::new(graph_id, "Integrals", DifficultyLevel::Advanced);
    let (a_id, b_id, c_id) = (a.id, b.id, c.id);
    for node in [a, b, c] {
        store.add_node(node).await.unwrap();
    }
    for (src, tgt) in [(a_id, b_id), (b_id, c_id)] {
        store
            .add_relation(KnowledgeRelation::new(
                graph_id,
                src,
                tgt,
                RelationType::Prerequisite,
            ))
            .await
            .unwrap();
    }

    Fixture {
        store,
        graph_id,
        a: a_id,
        b: b_id,
        c: c_id,
    }
}

async fn learner(graph_id: Uuid, mastered: &[Uuid]) -> (InMemoryLearnerHistory, Uuid) {
    let history = InMemoryLearnerHistory::new();
    let id = Uuid::new_v4();
    history.register_learner(id).await;
    for node in mastered {
        history.mark_mastered(id, graph_id, *node).await;
    }
    (history, id)
}

fn engine(store: InMemoryGraphStore, history: InMemoryLearnerHistory) -> GraphKnowledgeEngine {
    GraphKnowledgeEngine::new(Arc::new(store), Arc::new(history), EngineConfig::default())
}

/// Engine over `n` nodes in one line of `related_to` relations, with every
/// metric computed exactly.
async fn long_related_line(
    n: usize,
    call_timeout_ms: Option<u64>,
) -> (GraphKnowledgeEngine, Uuid) {
    let store = InMemoryGraphStore::new();
    let graph = KnowledgeGraph::new("Long line", "testing");
    let graph_id = graph.id;
    store.create_graph(graph).await.unwrap();

    let mut previous: Option<Uuid> = None;
    for i in 0..n {
        let node = KnowledgeNode::new(graph_id, &format!("Topic {i}"), DifficultyLevel::Beginner);
        let id = node.id;
        store.add_node(node).await.unwrap();
        if let Some(prev) = previous {
            store
                .add_relation(KnowledgeRelation::new(
                    graph_id,
                    prev,
                    id,
                    RelationType::RelatedTo,
                ))
                .await
                .unwrap();
        }
        previous = Some(id);
    }

    let mut config = EngineConfig::default();
    config.metrics.exact_metrics_node_limit = 100_000;
    config.engine.call_timeout_ms = call_timeout_ms;
    let engine = GraphKnowledgeEngine::new(
        Arc::new(store),
        Arc::new(InMemoryLearnerHistory::new()),
        config,
    );
    (engine, graph_id)
}

// ============================================================================
// Recommendations and prediction
// ============================================================================

#[tokio::test]
async fn test_next_node_after_mastering_first_step() {
    let fx = calculus_chain().await;
    let (history, learner_id) = learner(fx.graph_id, &[fx.a]).await;
    let engine = engine(fx.store, history);

    let recs = engine
        .recommend_next(fx.graph_id, fx.a, learner_id, 10, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(recs.len(), 1);
    let rec = &recs[0];
    assert_eq!(rec.node_id, fx.b);
    assert!(rec.prerequisites_met);
    assert!((rec.difficulty_match - 0.7).abs() < 1e-9);
    assert!((rec.score - 1.71).abs() < 1e-9, "score = {}", rec.score);
    assert_eq!(rec.estimated_minutes, 60);
    assert!(recs.iter().all(|r| r.node_id != fx.a && r.node_id != fx.c));
}

#[tokio::test]
async fn test_prediction_without_mastered_prerequisites() {
    let fx = calculus_chain().await;
    let (history, learner_id) = learner(fx.graph_id, &[]).await;
    let engine = engine(fx.store, history);

    let prediction = engine
        .predict(fx.b, learner_id, &CancellationToken::new())
        .await
        .unwrap();

    assert!((prediction.base_difficulty - 0.5).abs() < 1e-9);
    assert!((prediction.predicted_difficulty - 0.8625).abs() < 1e-9);
    assert!((prediction.confidence - 0.8).abs() < 1e-9);
    assert!(prediction
        .risk_factors
        .contains(&RiskFactor::WeakPrerequisites));
    assert_eq!(prediction.recommended_preparation, vec![fx.a]);
}

#[tokio::test]
async fn test_prediction_improves_with_mastered_prerequisites() {
    let fx = calculus_chain().await;
    let history = InMemoryLearnerHistory::new();
    let fresh = Uuid::new_v4();
    let prepared = Uuid::new_v4();
    history.register_learner(fresh).await;
    history.register_learner(prepared).await;
    history.mark_mastered(prepared, fx.graph_id, fx.a).await;
    let engine = engine(fx.store, history);
    let cancel = CancellationToken::new();

    let cold = engine.predict(fx.b, fresh, &cancel).await.unwrap();
    let warm = engine.predict(fx.b, prepared, &cancel).await.unwrap();
    assert!(warm.predicted_difficulty <= cold.predicted_difficulty);
    assert!(warm.success_probability >= cold.success_probability);
}

#[tokio::test]
async fn test_recommend_paths_stored_and_derived() {
    let fx = calculus_chain().await;
    let stored = LearningPath::from_nodes(
        fx.graph_id,
        "Differential calculus",
        DifficultyLevel::Intermediate,
        &[fx.a, fx.b],
    );
    let stored_id = stored.id;
    fx.store.add_learning_path(stored).await.unwrap();
    let (history, learner_id) = learner(fx.graph_id, &[fx.a]).await;
    let engine = engine(fx.store, history);

    let paths = engine
        .recommend_paths(
            fx.graph_id,
            learner_id,
            &["Integrals".to_string()],
            5,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(paths.len(), 2);
    let stored = paths
        .iter()
        .find(|p| p.source == PathSource::Stored)
        .unwrap();
    assert_eq!(stored.path_id, Some(stored_id));

    let derived = paths
        .iter()
        .find(|p| p.source == PathSource::Derived)
        .unwrap();
    assert_eq!(derived.node_ids, vec![fx.b, fx.c]);
    assert_eq!(derived.skill_coverage.get("Integrals"), Some(&1.0));
    assert!(paths.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_completed_paths_are_excluded() {
    let fx = calculus_chain().await;
    let path = LearningPath::from_nodes(
        fx.graph_id,
        "Everything",
        DifficultyLevel::Beginner,
        &[fx.a, fx.b, fx.c],
    );
    let path_id = path.id;
    fx.store.add_learning_path(path).await.unwrap();
    let (history, learner_id) = learner(fx.graph_id, &[]).await;
    history
        .mark_path_completed(learner_id, fx.graph_id, path_id)
        .await;
    let engine = engine(fx.store, history);

    let paths = engine
        .recommend_paths(fx.graph_id, learner_id, &[], 5, &CancellationToken::new())
        .await
        .unwrap();
    assert!(paths.iter().all(|p| p.path_id != Some(path_id)));
}

// ============================================================================
// Structure
// ============================================================================

#[tokio::test]
async fn test_back_edge_flips_validity() {
    let fx = calculus_chain().await;
    let store = Arc::new(fx.store);
    let engine = GraphKnowledgeEngine::new(
        store.clone(),
        Arc::new(InMemoryLearnerHistory::new()),
        EngineConfig::default(),
    );
    let cancel = CancellationToken::new();

    let report = engine.validate(fx.graph_id, &cancel).await.unwrap();
    assert!(report.is_valid);
    assert!(report.errors.is_empty());

    store
        .add_relation(KnowledgeRelation::new(
            fx.graph_id,
            fx.c,
            fx.a,
            RelationType::Prerequisite,
        ))
        .await
        .unwrap();

    let report = engine.validate(fx.graph_id, &cancel).await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .errors
        .iter()
        .any(|e| e.severity == Severity::Critical));
    assert_eq!(report.statistics.circular_dependencies, 3);
}

#[tokio::test]
async fn test_components_partition_nodes() {
    let fx = calculus_chain().await;
    for name in ["Series", "Vectors"] {
        fx.store
            .add_node(KnowledgeNode::new(
                fx.graph_id,
                name,
                DifficultyLevel::Elementary,
            ))
            .await
            .unwrap();
    }
    let engine = engine(fx.store, InMemoryLearnerHistory::new());

    let components = engine
        .components(fx.graph_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(components.len(), 3);
    assert_eq!(components[0].size, 3);
    assert!(components[0].is_main);
    let mut seen = HashSet::new();
    for component in &components {
        for member in &component.members {
            assert!(seen.insert(*member), "node {} in two components", member);
        }
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_dangling_relation_is_inconsistent_except_in_validate() {
    let fx = calculus_chain().await;
    fx.store
        .seed_relation(KnowledgeRelation::new(
            fx.graph_id,
            fx.c,
            Uuid::new_v4(),
            RelationType::RelatedTo,
        ))
        .await;
    let engine = engine(fx.store, InMemoryLearnerHistory::new());
    let cancel = CancellationToken::new();

    let report = engine.validate(fx.graph_id, &cancel).await.unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.statistics.dangling_relations, 1);

    assert!(matches!(
        engine.complexity(fx.graph_id, &cancel).await,
        Err(EngineError::Inconsistent(_))
    ));
}

#[tokio::test]
async fn test_concept_map_respects_bounds() {
    let fx = calculus_chain().await;
    let engine = engine(fx.store, InMemoryLearnerHistory::new());
    let cancel = CancellationToken::new();

    for max_nodes in 1..=4 {
        let map = engine.extract(fx.b, 3, max_nodes, &cancel).await.unwrap();
        assert!(map.nodes.len() <= max_nodes);
        let ids: HashSet<Uuid> = map.nodes.iter().map(|n| n.id).collect();
        for rel in &map.relations {
            assert!(ids.contains(&rel.source_id) && ids.contains(&rel.target_id));
        }
    }

    assert!(matches!(
        engine.extract(fx.b, 3, 0, &cancel).await,
        Err(EngineError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fx = calculus_chain().await;
    let engine = engine(fx.store, InMemoryLearnerHistory::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        engine.components(fx.graph_id, &cancel).await,
        Err(EngineError::Cancelled)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_while_complexity_runs() {
    let (engine, graph_id) = long_related_line(4000, None).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = engine.complexity(graph_id, &cancel).await;
    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert!(
        started.elapsed() < Duration::from_millis(250),
        "complexity kept running {:?} after cancellation",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_call_timeout_bounds_complexity() {
    let (engine, graph_id) = long_related_line(4000, Some(1)).await;
    let cancel = CancellationToken::new();

    let started = Instant::now();
    assert!(matches!(
        engine.complexity(graph_id, &cancel).await,
        Err(EngineError::Cancelled)
    ));
    assert!(started.elapsed() < Duration::from_millis(250));
    // The deadline cancels the per-call child token, never the caller's.
    assert!(!cancel.is_cancelled());
}

// ============================================================================
// Snapshot loading
// ============================================================================

#[tokio::test]
async fn test_snapshot_file_drives_engine() {
    let graph = KnowledgeGraph::new("Chemistry", "science");
    let g = graph.id;
    let atoms = KnowledgeNode::new(g, "Atoms", DifficultyLevel::Beginner);
    let bonds = KnowledgeNode::new(g, "Bonds", DifficultyLevel::Elementary);
    let (atoms_id, bonds_id) = (atoms.id, bonds.id);
    let learner_id = Uuid::new_v4();
    let snapshot = GraphSnapshot {
        graphs: vec![graph],
        nodes: vec![atoms, bonds],
        relations: vec![KnowledgeRelation::new(
            g,
            atoms_id,
            bonds_id,
            RelationType::Prerequisite,
        )],
        learning_paths: vec![],
        learners: vec![LearnerRecord {
            id: learner_id,
            mastered: vec![atoms_id],
            completed_paths: vec![],
            attempts: vec![],
        }],
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chemistry.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(serde_json::to_string(&snapshot).unwrap().as_bytes())
        .unwrap();

    let (store, history) = GraphSnapshot::from_path(&path)
        .unwrap()
        .into_stores()
        .await
        .unwrap();
    let engine = engine(store, history);

    let recs = engine
        .recommend_next(g, atoms_id, learner_id, 3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].node_id, bonds_id);
    assert!(recs[0].prerequisites_met);
}

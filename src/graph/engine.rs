//! Knowledge engine facade.
//!
//! [`KnowledgeEngine`] is the public async API. [`GraphKnowledgeEngine`]
//! composes extraction, validation, metrics, prediction, recommendation and
//! concept-map extraction over the store and learner-history ports, and
//! applies the optional per-call deadline from [`RuntimeConfig`].

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::algorithms::{compute_complexity, connected_components};
use super::concept_map::ConceptMapExtractor;
use super::difficulty::DifficultyPredictor;
use super::extraction::GraphExtractor;
use super::models::{
    ComponentInfo, ConceptMap, DifficultyPrediction, GraphComplexity, PathRecommendation,
    Recommendation, ValidationReport,
};
use super::paths::PathRecommender;
use super::recommend::NextNodeRecommender;
use super::validation::validate_structure;
use super::with_deadline_scope;
use crate::config::{EngineConfig, RuntimeConfig};
use crate::error::{EngineError, Result};
use crate::store::{GraphStore, LearnerHistory};

// ============================================================================
// Trait
// ============================================================================

/// Read-only analytics and recommendations over knowledge graphs.
///
/// Every call takes a cancellation token and fails with
/// [`EngineError::Cancelled`] once it fires.
#[async_trait]
pub trait KnowledgeEngine: Send + Sync {
    /// Structural validation report. Dangling relations are reported as
    /// critical findings rather than errors.
    async fn validate(&self, graph_id: Uuid, cancel: &CancellationToken)
        -> Result<ValidationReport>;

    /// Connected components over all relation types, largest first.
    async fn components(
        &self,
        graph_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<ComponentInfo>>;

    async fn complexity(&self, graph_id: Uuid, cancel: &CancellationToken)
        -> Result<GraphComplexity>;

    async fn predict(
        &self,
        node_id: Uuid,
        learner_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<DifficultyPrediction>;

    async fn recommend_next(
        &self,
        graph_id: Uuid,
        current_node_id: Uuid,
        learner_id: Uuid,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recommendation>>;

    async fn recommend_paths(
        &self,
        graph_id: Uuid,
        learner_id: Uuid,
        target_skills: &[String],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathRecommendation>>;

    /// Bounded concept map around a center node.
    async fn extract(
        &self,
        center_node_id: Uuid,
        depth: usize,
        max_nodes: usize,
        cancel: &CancellationToken,
    ) -> Result<ConceptMap>;
}

// ============================================================================
// Implementation
// ============================================================================

/// Engine over a [`GraphStore`] and a [`LearnerHistory`].
pub struct GraphKnowledgeEngine {
    extractor: GraphExtractor,
    predictor: DifficultyPredictor,
    recommender: NextNodeRecommender,
    paths: PathRecommender,
    concept_maps: ConceptMapExtractor,
    config: EngineConfig,
}

impl GraphKnowledgeEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        history: Arc<dyn LearnerHistory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            extractor: GraphExtractor::new(store.clone()),
            predictor: DifficultyPredictor::new(
                store.clone(),
                history.clone(),
                config.difficulty.clone(),
            ),
            recommender: NextNodeRecommender::new(
                store.clone(),
                history.clone(),
                config.recommendation.clone(),
            ),
            paths: PathRecommender::new(store.clone(), history, config.paths.clone()),
            concept_maps: ConceptMapExtractor::new(store),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one operation under a child token, with the configured deadline.
    async fn run<T, F, Fut>(&self, op: &'static str, cancel: &CancellationToken, f: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let token = cancel.child_token();
        let result = with_deadline(&self.config.engine, token.clone(), f(token)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Err(EngineError::Cancelled) => {
                tracing::warn!(op, elapsed_ms, "Engine operation cancelled");
            }
            Err(EngineError::Inconsistent(msg)) => {
                tracing::warn!(op, elapsed_ms, error = %msg, "Inconsistent graph data");
            }
            Err(e) => {
                tracing::debug!(op, elapsed_ms, error = %e, "Engine operation failed");
            }
            Ok(_) => {}
        }
        result
    }
}

/// Apply the configured per-call deadline.
///
/// The deadline is checked by every traversal through `ensure_active`, so
/// CPU-bound analyses stop at their next check; the outer timeout covers
/// awaits on slow ports.
async fn with_deadline<T, Fut>(
    runtime: &RuntimeConfig,
    token: CancellationToken,
    fut: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let Some(ms) = runtime.call_timeout_ms else {
        return fut.await;
    };
    let limit = Duration::from_millis(ms);
    let deadline = Instant::now() + limit;
    match tokio::time::timeout(limit, with_deadline_scope(deadline, fut)).await {
        Ok(result) => result,
        Err(_) => {
            token.cancel();
            Err(EngineError::Cancelled)
        }
    }
}

#[async_trait]
impl KnowledgeEngine for GraphKnowledgeEngine {
    async fn validate(
        &self,
        graph_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport> {
        let started = Instant::now();
        let report = self
            .run("validate", cancel, |token| async move {
                let view = self.extractor.extract(graph_id, &token).await?;
                validate_structure(&view, &self.config.validation, &token)
            })
            .await?;
        tracing::info!(
            graph_id = %graph_id,
            is_valid = report.is_valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Validated graph"
        );
        Ok(report)
    }

    async fn components(
        &self,
        graph_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<ComponentInfo>> {
        let started = Instant::now();
        let components = self
            .run("components", cancel, |token| async move {
                let view = self.extractor.extract_consistent(graph_id, &token).await?;
                connected_components(&view, &token)
            })
            .await?;
        tracing::info!(
            graph_id = %graph_id,
            components = components.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Computed connected components"
        );
        Ok(components)
    }

    async fn complexity(
        &self,
        graph_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<GraphComplexity> {
        let started = Instant::now();
        let complexity = self
            .run("complexity", cancel, |token| async move {
                let view = self.extractor.extract_consistent(graph_id, &token).await?;
                compute_complexity(&view, &self.config.metrics, &token)
            })
            .await?;
        tracing::info!(
            graph_id = %graph_id,
            nodes = complexity.node_count,
            relations = complexity.relation_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Computed graph complexity"
        );
        Ok(complexity)
    }

    async fn predict(
        &self,
        node_id: Uuid,
        learner_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<DifficultyPrediction> {
        let started = Instant::now();
        let prediction = self
            .run("predict", cancel, |token| async move {
                self.predictor.predict(node_id, learner_id, &token).await
            })
            .await?;
        tracing::info!(
            node_id = %node_id,
            learner_id = %learner_id,
            predicted = prediction.predicted_difficulty,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Predicted difficulty"
        );
        Ok(prediction)
    }

    async fn recommend_next(
        &self,
        graph_id: Uuid,
        current_node_id: Uuid,
        learner_id: Uuid,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recommendation>> {
        let started = Instant::now();
        let recommendations = self
            .run("recommend_next", cancel, |token| async move {
                self.recommender
                    .recommend(graph_id, current_node_id, learner_id, limit, &token)
                    .await
            })
            .await?;
        tracing::info!(
            graph_id = %graph_id,
            current = %current_node_id,
            count = recommendations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommended next nodes"
        );
        Ok(recommendations)
    }

    async fn recommend_paths(
        &self,
        graph_id: Uuid,
        learner_id: Uuid,
        target_skills: &[String],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathRecommendation>> {
        let started = Instant::now();
        let paths = self
            .run("recommend_paths", cancel, |token| async move {
                self.paths
                    .recommend(graph_id, learner_id, target_skills, limit, &token)
                    .await
            })
            .await?;
        tracing::info!(
            graph_id = %graph_id,
            learner_id = %learner_id,
            count = paths.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommended learning paths"
        );
        Ok(paths)
    }

    async fn extract(
        &self,
        center_node_id: Uuid,
        depth: usize,
        max_nodes: usize,
        cancel: &CancellationToken,
    ) -> Result<ConceptMap> {
        let started = Instant::now();
        let map = self
            .run("extract", cancel, |token| async move {
                self.concept_maps
                    .extract(center_node_id, depth, max_nodes, &token)
                    .await
            })
            .await?;
        tracing::info!(
            center = %center_node_id,
            nodes = map.nodes.len(),
            relations = map.relations.len(),
            truncated = map.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extracted concept map"
        );
        Ok(map)
    }
}

// ============================================================================
// Tests
// ============================================================================

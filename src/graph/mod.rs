//! Knowledge graph analytics and recommendation engine.
//!
//! All analyses are read-only queries against the [`GraphStore`](crate::store::GraphStore)
//! and [`LearnerHistory`](crate::store::LearnerHistory) ports.
//!
//! ## Architecture
//!
//! ```text
//! GraphStore ──► extraction ──► petgraph::DiGraph (KnowledgeGraphView)
//!                                    │
//!                  ┌─────────────────┼──────────────────┐
//!             validation        algorithms            paths
//!                  │                 │                  │
//!                  └────── GraphKnowledgeEngine ────────┘
//!                                    │
//!          difficulty / recommend / concept_map (port-level traversals)
//! ```
//!
//! ## Modules
//!
//! - [`models`] - Graph view and the value objects returned by the engine
//! - [`extraction`] - Store → petgraph conversion, dangling relation detection
//! - [`validation`] - Orphans, bounded prerequisite cycles, duplicates, difficulty jumps
//! - [`algorithms`] - Components, clustering, path metrics, shortest path
//! - [`difficulty`] - Per-learner difficulty prediction
//! - [`recommend`] - Next-node recommendations
//! - [`paths`] - Stored and derived learning path recommendations
//! - [`concept_map`] - Bounded neighborhood extraction
//! - [`engine`] - `KnowledgeEngine` trait and `GraphKnowledgeEngine` facade

pub mod algorithms;
pub mod concept_map;
pub mod difficulty;
pub mod engine;
pub mod extraction;
pub mod models;
pub mod paths;
pub mod recommend;
pub mod validation;

use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

pub use concept_map::ConceptMapExtractor;
pub use difficulty::{DifficultyInputs, DifficultyPredictor};
pub use engine::{GraphKnowledgeEngine, KnowledgeEngine};
pub use extraction::GraphExtractor;
pub use models::{
    ComponentInfo, ConceptMap, DifficultyPrediction, GraphComplexity, HistorySource, IssueKind,
    KnowledgeGraphView, Metric, PathRecommendation, PathSource, Recommendation, RiskFactor,
    Severity, ValidationIssue, ValidationReport, ValidationStatistics, ValidationWarning,
    WarningKind,
};
pub use paths::PathRecommender;
pub use recommend::NextNodeRecommender;

tokio::task_local! {
    /// Deadline of the engine call currently being polled.
    static DEADLINE: Instant;
}

/// Poll `fut` with a deadline visible to every [`ensure_active`] check it reaches.
pub(crate) async fn with_deadline_scope<F: Future>(deadline: Instant, fut: F) -> F::Output {
    DEADLINE.scope(deadline, fut).await
}

/// Fail with [`EngineError::Cancelled`] once the token has fired or the
/// call deadline has passed. An expired deadline also cancels the token.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    let expired = DEADLINE
        .try_with(|deadline| Instant::now() >= *deadline)
        .unwrap_or(false);
    if expired {
        cancel.cancel();
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

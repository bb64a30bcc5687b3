//! Learner-specific difficulty prediction.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ensure_active;
use super::models::{DifficultyPrediction, HistorySource, RiskFactor};
use crate::config::DifficultyConfig;
use crate::error::{EngineError, Result};
use crate::store::{GraphStore, KnowledgeNode, LearnerHistory, RelationType};

/// Signals gathered from the ports for one (node, learner) pair.
#[derive(Debug, Clone, Default)]
pub struct DifficultyInputs {
    /// Direct prerequisite node ids (sources of incoming prerequisite relations)
    pub prerequisites: Vec<Uuid>,
    /// Direct prerequisites the learner has mastered
    pub mastered_prerequisites: Vec<Uuid>,
    /// Learner's attempt scores on the node itself, 0-100
    pub direct_scores: Vec<f64>,
    /// Learner's attempt scores on directly related nodes, 0-100
    pub related_scores: Vec<f64>,
}

fn mean_normalized(scores: &[f64]) -> f64 {
    scores.iter().sum::<f64>() / scores.len() as f64 / 100.0
}

/// Combine the gathered signals into a prediction.
pub fn predict_difficulty(
    node: &KnowledgeNode,
    learner_id: Uuid,
    inputs: &DifficultyInputs,
    config: &DifficultyConfig,
) -> DifficultyPrediction {
    let mut notes = Vec::new();

    let base = match node.difficulty_score {
        Some(score) => {
            notes.push(format!("base difficulty taken from explicit score {:.2}", score));
            score
        }
        None => config.base_for(node.difficulty),
    };

    let prereq = if inputs.prerequisites.is_empty() {
        1.0
    } else {
        inputs.mastered_prerequisites.len() as f64 / inputs.prerequisites.len() as f64
    };

    let (history, source) = if !inputs.direct_scores.is_empty() {
        (mean_normalized(&inputs.direct_scores), HistorySource::Direct)
    } else if !inputs.related_scores.is_empty() {
        notes.push(format!(
            "no attempts on this node; history averaged over {} attempt(s) on related nodes",
            inputs.related_scores.len()
        ));
        (mean_normalized(&inputs.related_scores), HistorySource::Related)
    } else {
        notes.push(format!(
            "no attempts on this node or related nodes; neutral history {} used",
            config.neutral_history
        ));
        (config.neutral_history, HistorySource::Neutral)
    };

    let raw = base
        * (1.0 + (1.0 - prereq) * config.prerequisite_penalty)
        * (1.0 + (1.0 - history) * config.history_penalty);
    let predicted = raw.clamp(0.0, 1.0);
    if (predicted - raw).abs() > f64::EPSILON {
        notes.push(format!("predicted difficulty {:.4} clamped to {:.4}", raw, predicted));
    }

    let mut confidence = config.base_confidence;
    if !inputs.direct_scores.is_empty() {
        confidence += config.attempts_confidence_bonus;
    }
    if !inputs.prerequisites.is_empty() {
        confidence += config.prerequisites_confidence_bonus;
    }
    if confidence > 1.0 {
        if confidence - 1.0 > 1e-9 {
            notes.push(format!("confidence {:.2} capped at 1.0", confidence));
        }
        confidence = 1.0;
    }

    let mut risk_factors = Vec::new();
    if prereq < config.weak_prerequisite_threshold {
        risk_factors.push(RiskFactor::WeakPrerequisites);
    }
    if history < config.weak_history_threshold {
        risk_factors.push(RiskFactor::WeakHistory);
    }
    if prereq < config.compounded_risk_threshold && history < config.compounded_risk_threshold {
        risk_factors.push(RiskFactor::CompoundedRisk);
    }

    let mastered: HashSet<&Uuid> = inputs.mastered_prerequisites.iter().collect();
    let recommended_preparation: Vec<Uuid> = inputs
        .prerequisites
        .iter()
        .filter(|id| !mastered.contains(id))
        .copied()
        .collect();

    DifficultyPrediction {
        node_id: node.id,
        learner_id,
        base_difficulty: base,
        predicted_difficulty: predicted,
        confidence,
        success_probability: 1.0 - predicted * config.success_factor,
        prerequisite_satisfaction: prereq,
        historical_performance: history,
        history_source: source,
        estimated_minutes: config.base_minutes * (1.0 + predicted),
        recommended_preparation,
        risk_factors,
        notes,
    }
}

// ============================================================================
// Predictor
// ============================================================================

/// Gathers prediction inputs through the store and history ports.
pub struct DifficultyPredictor {
    store: Arc<dyn GraphStore>,
    history: Arc<dyn LearnerHistory>,
    config: DifficultyConfig,
}

impl DifficultyPredictor {
    pub fn new(
        store: Arc<dyn GraphStore>,
        history: Arc<dyn LearnerHistory>,
        config: DifficultyConfig,
    ) -> Self {
        Self {
            store,
            history,
            config,
        }
    }

    pub async fn predict(
        &self,
        node_id: Uuid,
        learner_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<DifficultyPrediction> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or_else(|| EngineError::node_not_found(node_id))?;
        let mastered = self
            .history
            .get_mastered_nodes(learner_id, node.graph_id)
            .await?
            .ok_or_else(|| EngineError::learner_not_found(learner_id))?;
        ensure_active(cancel)?;

        let incoming = self.store.get_relations_to(node_id).await?;
        let outgoing = self.store.get_relations_from(node_id).await?;

        let mut prerequisites = BTreeSet::new();
        let mut related = BTreeSet::new();
        for rel in incoming.iter().chain(outgoing.iter()) {
            if rel.graph_id != node.graph_id {
                continue;
            }
            let Some(other) = rel.other_end(node_id) else {
                continue;
            };
            if other == node_id {
                continue;
            }
            self.resolve(other, node.graph_id, rel.id).await?;
            if rel.relation_type == RelationType::Prerequisite && rel.target_id == node_id {
                prerequisites.insert(other);
            }
            related.insert(other);
        }
        ensure_active(cancel)?;

        let direct_scores = self.history.get_attempt_scores(learner_id, node_id).await?;
        let mut related_scores = Vec::new();
        if direct_scores.is_empty() {
            for id in &related {
                ensure_active(cancel)?;
                related_scores.extend(self.history.get_attempt_scores(learner_id, *id).await?);
            }
        }

        let inputs = DifficultyInputs {
            mastered_prerequisites: prerequisites
                .iter()
                .filter(|id| mastered.contains(*id))
                .copied()
                .collect(),
            prerequisites: prerequisites.into_iter().collect(),
            direct_scores,
            related_scores,
        };

        let prediction = predict_difficulty(&node, learner_id, &inputs, &self.config);
        tracing::debug!(
            node_id = %node_id,
            learner_id = %learner_id,
            predicted = prediction.predicted_difficulty,
            "Predicted difficulty"
        );
        Ok(prediction)
    }

    /// Fail with `Inconsistent` if a relation endpoint does not resolve in the graph.
    async fn resolve(&self, id: Uuid, graph_id: Uuid, relation_id: Uuid) -> Result<()> {
        match self.store.get_node(id).await? {
            Some(n) if n.graph_id == graph_id => Ok(()),
            _ => Err(EngineError::inconsistent(format!(
                "relation {} references node {} outside graph {}",
                relation_id, id, graph_id
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Next-node recommendation.
//!
//! Candidates are the targets of the current node's outgoing learning
//! relations. Each is scored as
//! `relation × 0.4 + prerequisite gate × 0.3 + difficulty match × 0.3`
//! (factors from [`RecommendationConfig`]).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ensure_active;
use super::models::Recommendation;
use crate::config::RecommendationConfig;
use crate::error::{EngineError, Result};
use crate::store::{DifficultyLevel, GraphStore, KnowledgeNode, LearnerHistory, RelationType};

/// Difficulty match by ordinal distance: ≤1 → 1.0, 2 → 0.7, otherwise 0.4.
pub fn difficulty_match(current: DifficultyLevel, candidate: DifficultyLevel) -> f64 {
    match current.distance(candidate) {
        0 | 1 => 1.0,
        2 => 0.7,
        _ => 0.4,
    }
}

pub fn priority_for(score: f64, config: &RecommendationConfig) -> u8 {
    if score >= config.high_priority_score {
        1
    } else if score >= config.medium_priority_score {
        2
    } else {
        3
    }
}

/// Scores the neighbors of a node for a learner.
pub struct NextNodeRecommender {
    store: Arc<dyn GraphStore>,
    history: Arc<dyn LearnerHistory>,
    config: RecommendationConfig,
}

impl NextNodeRecommender {
    pub fn new(
        store: Arc<dyn GraphStore>,
        history: Arc<dyn LearnerHistory>,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            store,
            history,
            config,
        }
    }

    pub async fn recommend(
        &self,
        graph_id: Uuid,
        current_node_id: Uuid,
        learner_id: Uuid,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recommendation>> {
        if limit == 0 {
            return Err(EngineError::invalid("limit must be greater than 0"));
        }
        self.store
            .get_graph(graph_id)
            .await?
            .ok_or_else(|| EngineError::graph_not_found(graph_id))?;
        let current = self
            .store
            .get_node(current_node_id)
            .await?
            .filter(|n| n.graph_id == graph_id)
            .ok_or_else(|| EngineError::node_not_found(current_node_id))?;
        let mastered = self
            .history
            .get_mastered_nodes(learner_id, graph_id)
            .await?
            .ok_or_else(|| EngineError::learner_not_found(learner_id))?;
        ensure_active(cancel)?;

        // Best relation per candidate: highest score, then fixed type ordering.
        let mut best: BTreeMap<Uuid, RelationType> = BTreeMap::new();
        for rel in self.store.get_relations_from(current_node_id).await? {
            if rel.graph_id != graph_id || !rel.relation_type.is_learning_edge() {
                continue;
            }
            let target = rel.target_id;
            if target == current_node_id || mastered.contains(&target) {
                continue;
            }
            best.entry(target)
                .and_modify(|existing| {
                    if self.better(rel.relation_type, *existing) {
                        *existing = rel.relation_type;
                    }
                })
                .or_insert(rel.relation_type);
        }

        let mut results = Vec::with_capacity(best.len());
        for (candidate_id, relation_type) in best {
            ensure_active(cancel)?;
            let candidate = self.resolve(candidate_id, graph_id).await?;
            let unmet = self.unmet_prerequisites(&candidate, &mastered).await?;
            results.push(self.score(&current, &candidate, relation_type, unmet));
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.relation_type.rank().cmp(&b.relation_type.rank()))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        let truncated = results.len() > limit;
        results.truncate(limit);

        tracing::debug!(
            current = %current_node_id,
            learner = %learner_id,
            returned = results.len(),
            truncated,
            "Scored next-node candidates"
        );
        Ok(results)
    }

    fn better(&self, candidate: RelationType, existing: RelationType) -> bool {
        let (c, e) = (
            self.config.relation_score(candidate),
            self.config.relation_score(existing),
        );
        c > e || ((c - e).abs() < f64::EPSILON && candidate.rank() < existing.rank())
    }

    async fn resolve(&self, id: Uuid, graph_id: Uuid) -> Result<KnowledgeNode> {
        self.store
            .get_node(id)
            .await?
            .filter(|n| n.graph_id == graph_id)
            .ok_or_else(|| {
                EngineError::inconsistent(format!(
                    "relation target {} does not resolve in graph {}",
                    id, graph_id
                ))
            })
    }

    /// Number of direct prerequisites of `node` the learner has not mastered.
    async fn unmet_prerequisites(
        &self,
        node: &KnowledgeNode,
        mastered: &HashSet<Uuid>,
    ) -> Result<usize> {
        let mut unmet = HashSet::new();
        for rel in self.store.get_relations_to(node.id).await? {
            if rel.graph_id != node.graph_id || rel.relation_type != RelationType::Prerequisite {
                continue;
            }
            if rel.source_id == node.id {
                continue;
            }
            self.resolve(rel.source_id, node.graph_id).await?;
            if !mastered.contains(&rel.source_id) {
                unmet.insert(rel.source_id);
            }
        }
        Ok(unmet.len())
    }

    fn score(
        &self,
        current: &KnowledgeNode,
        candidate: &KnowledgeNode,
        relation_type: RelationType,
        unmet: usize,
    ) -> Recommendation {
        let cfg = &self.config;
        let relation_score = cfg.relation_score(relation_type);
        let prerequisites_met = unmet == 0;
        let gate = if prerequisites_met {
            1.0
        } else {
            cfg.unmet_prerequisite_score
        };
        let matched = difficulty_match(current.difficulty, candidate.difficulty);
        let score = relation_score * cfg.relation_factor
            + gate * cfg.prerequisite_factor
            + matched * cfg.difficulty_factor;

        let mut reasoning = vec![format!(
            "Reached from '{}' through a {} relation",
            current.name, relation_type
        )];
        reasoning.push(if prerequisites_met {
            "All prerequisites are mastered".to_string()
        } else {
            format!("{} prerequisite(s) not yet mastered", unmet)
        });
        let distance = current.difficulty.distance(candidate.difficulty);
        reasoning.push(match distance {
            0 => format!("Same difficulty level ({})", candidate.difficulty),
            1 => format!("Close difficulty level ({})", candidate.difficulty),
            d => format!(
                "Difficulty {} is {} levels away from the current node",
                candidate.difficulty, d
            ),
        });

        let mut notes = Vec::new();
        if !prerequisites_met {
            notes.push(format!(
                "prerequisite component lowered to {} because prerequisites are not met",
                cfg.unmet_prerequisite_score
            ));
        }

        Recommendation {
            node_id: candidate.id,
            name: candidate.name.clone(),
            node_type: candidate.node_type,
            difficulty: candidate.difficulty,
            relation_type,
            score,
            relation_score,
            prerequisites_met,
            difficulty_match: matched,
            estimated_minutes: cfg.minutes_for(candidate.difficulty),
            priority: priority_for(score, cfg),
            reasoning,
            notes,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Learning-path recommendation.
//!
//! Ranks the stored learning paths a learner has not completed, plus paths
//! derived on the fly for target skills that no stored path covers.

use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::algorithms::shortest_path;
use super::ensure_active;
use super::extraction::GraphExtractor;
use super::models::{KnowledgeGraphView, PathRecommendation, PathSource};
use crate::config::PathsConfig;
use crate::error::{EngineError, Result};
use crate::store::{DifficultyLevel, GraphStore, LearnerHistory, LearningPath, RelationType};

/// A stored or derived path before scoring.
#[derive(Debug, Clone)]
pub struct PathCandidate {
    pub name: String,
    pub path_id: Option<Uuid>,
    pub source: PathSource,
    pub node_ids: Vec<Uuid>,
    pub difficulty: DifficultyLevel,
}

/// Score, hours, coverage and reasoning for one candidate path.
pub fn score_path(
    candidate: PathCandidate,
    view: &KnowledgeGraphView,
    target_skills: &[String],
    config: &PathsConfig,
) -> PathRecommendation {
    let PathCandidate {
        name,
        path_id,
        source,
        node_ids,
        difficulty,
    } = candidate;
    let names: HashSet<&str> = node_ids
        .iter()
        .filter_map(|id| view.get_node(*id).map(|n| n.name.as_str()))
        .collect();
    let matched_nodes = node_ids
        .iter()
        .filter_map(|id| view.get_node(*id))
        .filter(|n| target_skills.iter().any(|s| *s == n.name))
        .count();

    let adjustment = match difficulty {
        DifficultyLevel::Beginner => 0.2,
        DifficultyLevel::Intermediate => 0.1,
        DifficultyLevel::Advanced => -0.1,
        _ => 0.0,
    };
    let raw = config.base_score + config.skill_match_bonus * matched_nodes as f64 + adjustment;
    let score = raw.clamp(0.0, 1.0);

    let mut notes = Vec::new();
    if (score - raw).abs() > f64::EPSILON {
        notes.push(format!("score {:.2} clamped to {:.2}", raw, score));
    }

    let mut hours = node_ids.len() as f64 * config.hours_per_node;
    match difficulty {
        DifficultyLevel::Beginner => hours *= 0.8,
        DifficultyLevel::Advanced => hours *= 1.5,
        _ => {}
    }

    let skill_coverage: BTreeMap<String, f64> = target_skills
        .iter()
        .map(|s| (s.clone(), if names.contains(s.as_str()) { 1.0 } else { 0.0 }))
        .collect();
    let covered: Vec<&str> = skill_coverage
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(k, _)| k.as_str())
        .collect();

    let mut reasoning = vec![if score > 0.8 {
        "Excellent match for the requested learning goals".to_string()
    } else if score > 0.6 {
        "Good match for the requested learning goals".to_string()
    } else {
        "Partial match for the requested learning goals".to_string()
    }];
    reasoning.push(if target_skills.is_empty() {
        "No target skills requested".to_string()
    } else if covered.is_empty() {
        "Covers none of the target skills".to_string()
    } else {
        format!(
            "Covers {} of {} target skill(s): {}",
            covered.len(),
            skill_coverage.len(),
            covered.join(", ")
        )
    });
    reasoning.push(match difficulty {
        DifficultyLevel::Beginner => "Beginner-friendly path".to_string(),
        DifficultyLevel::Elementary => "Elementary path building basic skills".to_string(),
        DifficultyLevel::Intermediate => "Intermediate path building on fundamentals".to_string(),
        DifficultyLevel::Advanced => "Advanced path for experienced learners".to_string(),
        DifficultyLevel::Expert => "Expert-level path".to_string(),
    });

    PathRecommendation {
        path_id,
        name,
        source,
        node_ids,
        difficulty,
        score,
        estimated_hours: hours,
        skill_coverage,
        reasoning,
        notes,
    }
}

/// Ranks stored and derived learning paths for a learner.
pub struct PathRecommender {
    extractor: GraphExtractor,
    store: Arc<dyn GraphStore>,
    history: Arc<dyn LearnerHistory>,
    config: PathsConfig,
}

impl PathRecommender {
    pub fn new(
        store: Arc<dyn GraphStore>,
        history: Arc<dyn LearnerHistory>,
        config: PathsConfig,
    ) -> Self {
        Self {
            extractor: GraphExtractor::new(store.clone()),
            store,
            history,
            config,
        }
    }

    pub async fn recommend(
        &self,
        graph_id: Uuid,
        learner_id: Uuid,
        target_skills: &[String],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathRecommendation>> {
        if limit == 0 {
            return Err(EngineError::invalid("limit must be greater than 0"));
        }
        let view = self.extractor.extract_consistent(graph_id, cancel).await?;
        let mastered = self
            .history
            .get_mastered_nodes(learner_id, graph_id)
            .await?
            .ok_or_else(|| EngineError::learner_not_found(learner_id))?;
        let completed = self.history.get_completed_paths(learner_id, graph_id).await?;

        let mut results = Vec::new();
        let mut touched: HashSet<Uuid> = HashSet::new();

        for path in self.store.list_learning_paths(graph_id).await? {
            if completed.contains(&path.id) {
                continue;
            }
            let node_ids = self.stored_nodes(&path, &view)?;
            touched.extend(node_ids.iter().copied());
            let candidate = PathCandidate {
                name: path.name.clone(),
                path_id: Some(path.id),
                source: PathSource::Stored,
                node_ids,
                difficulty: path.difficulty,
            };
            results.push(score_path(candidate, &view, target_skills, &self.config));
        }

        if self.config.derive_paths {
            let derived = self.derive(&view, &mastered, &touched, target_skills, cancel)?;
            results.extend(derived);
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        results.truncate(limit);

        tracing::debug!(
            graph_id = %graph_id,
            learner_id = %learner_id,
            returned = results.len(),
            "Ranked learning paths"
        );
        Ok(results)
    }

    fn stored_nodes(&self, path: &LearningPath, view: &KnowledgeGraphView) -> Result<Vec<Uuid>> {
        let ids = path.ordered_node_ids();
        if let Some(missing) = ids.iter().find(|id| view.get_index(**id).is_none()) {
            return Err(EngineError::inconsistent(format!(
                "learning path {} references node {} outside graph {}",
                path.id, missing, path.graph_id
            )));
        }
        Ok(ids)
    }

    /// Shortest paths to target-skill nodes not covered by stored candidates.
    fn derive(
        &self,
        view: &KnowledgeGraphView,
        mastered: &HashSet<Uuid>,
        touched: &HashSet<Uuid>,
        target_skills: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<PathRecommendation>> {
        let mut sources: Vec<NodeIndex> = mastered
            .iter()
            .filter_map(|id| view.get_index(*id))
            .collect();
        let from_roots = sources.is_empty();
        if from_roots {
            sources = view
                .graph
                .node_indices()
                .filter(|idx| view.prerequisites_of(*idx).is_empty())
                .collect();
        }

        let mut seen_paths: HashSet<Vec<Uuid>> = HashSet::new();
        let mut derived = Vec::new();
        for skill in target_skills {
            ensure_active(cancel)?;
            let mut matches: Vec<&crate::store::KnowledgeNode> = view
                .graph
                .node_weights()
                .filter(|n| n.name == *skill)
                .collect();
            matches.sort_by_key(|n| n.id);
            let Some(target) = matches.first() else {
                continue;
            };
            if mastered.contains(&target.id) || touched.contains(&target.id) {
                continue;
            }
            let Some(target_idx) = view.get_index(target.id) else {
                continue;
            };

            let Some(path) = shortest_path(
                view,
                &sources,
                target_idx,
                &RelationType::LEARNING,
                self.config.max_path_hops,
                cancel,
            )?
            else {
                tracing::debug!(skill = %skill, "No derived path within hop limit");
                continue;
            };

            let node_ids: Vec<Uuid> = path
                .into_iter()
                .map(|idx| view.node_id(idx))
                .filter(|id| !mastered.contains(id))
                .collect();
            if node_ids.is_empty() || !seen_paths.insert(node_ids.clone()) {
                continue;
            }
            let difficulty = node_ids
                .iter()
                .filter_map(|id| view.get_node(*id))
                .map(|n| n.difficulty)
                .max()
                .unwrap_or_default();

            let candidate = PathCandidate {
                name: format!("Path to {}", skill),
                path_id: None,
                source: PathSource::Derived,
                node_ids,
                difficulty,
            };
            let mut rec = score_path(candidate, view, target_skills, &self.config);
            rec.notes.push(if from_roots {
                "derived from root nodes because nothing is mastered yet".to_string()
            } else {
                "derived from the learner's mastered nodes".to_string()
            });
            if matches.len() > 1 {
                rec.notes.push(format!(
                    "{} nodes are named '{}'; the one with the smallest id was targeted",
                    matches.len(),
                    skill
                ));
            }
            derived.push(rec);
        }
        Ok(derived)
    }
}

// ============================================================================
// Tests
// ============================================================================

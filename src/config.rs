//! Engine configuration.
//!
//! Every weight and threshold used by the analyzers lives here. Values are
//! loaded from YAML, then overridden by environment variables.
//!
//! Priority: env var > YAML > default.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::{DifficultyLevel, RelationType};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "kge.yaml";

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum prerequisite hops explored when looking for cycles.
    pub max_cycle_hops: usize,
    /// Ordinal gap above which a prerequisite is flagged as a difficulty jump.
    pub difficulty_jump_threshold: u8,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_cycle_hops: 10,
            difficulty_jump_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Graphs up to this many nodes get exact path and clustering metrics.
    pub exact_metrics_node_limit: usize,
    /// Number of BFS sources / nodes sampled above the limit.
    pub sample_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            exact_metrics_node_limit: 2000,
            sample_size: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Base difficulty for beginner..expert.
    pub level_scale: [f64; 5],
    pub prerequisite_penalty: f64,
    pub history_penalty: f64,
    /// History used when neither the node nor its neighbors have attempts.
    pub neutral_history: f64,
    pub base_confidence: f64,
    pub attempts_confidence_bonus: f64,
    pub prerequisites_confidence_bonus: f64,
    pub success_factor: f64,
    pub weak_prerequisite_threshold: f64,
    pub weak_history_threshold: f64,
    pub compounded_risk_threshold: f64,
    /// Minutes for a node of predicted difficulty 0.
    pub base_minutes: f64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            level_scale: [0.1, 0.3, 0.5, 0.7, 0.9],
            prerequisite_penalty: 0.5,
            history_penalty: 0.3,
            neutral_history: 0.5,
            base_confidence: 0.7,
            attempts_confidence_bonus: 0.2,
            prerequisites_confidence_bonus: 0.1,
            success_factor: 0.8,
            weak_prerequisite_threshold: 0.7,
            weak_history_threshold: 0.6,
            compounded_risk_threshold: 0.5,
            base_minutes: 60.0,
        }
    }
}

impl DifficultyConfig {
    pub fn base_for(&self, level: DifficultyLevel) -> f64 {
        self.level_scale[level.index()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub prerequisite_weight: f64,
    pub part_of_weight: f64,
    pub related_to_weight: f64,
    pub other_weight: f64,
    pub relation_factor: f64,
    pub prerequisite_factor: f64,
    pub difficulty_factor: f64,
    /// Prerequisite component used when the gate is not met.
    pub unmet_prerequisite_score: f64,
    /// Estimated minutes for beginner..expert.
    pub estimated_minutes: [u32; 5],
    pub high_priority_score: f64,
    pub medium_priority_score: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            prerequisite_weight: 3.0,
            part_of_weight: 2.5,
            related_to_weight: 2.0,
            other_weight: 1.0,
            relation_factor: 0.4,
            prerequisite_factor: 0.3,
            difficulty_factor: 0.3,
            unmet_prerequisite_score: 0.2,
            estimated_minutes: [30, 30, 60, 90, 120],
            high_priority_score: 2.5,
            medium_priority_score: 1.5,
        }
    }
}

impl RecommendationConfig {
    pub fn relation_score(&self, relation_type: RelationType) -> f64 {
        match relation_type {
            RelationType::Prerequisite => self.prerequisite_weight,
            RelationType::PartOf => self.part_of_weight,
            RelationType::RelatedTo => self.related_to_weight,
            _ => self.other_weight,
        }
    }

    pub fn minutes_for(&self, level: DifficultyLevel) -> u32 {
        self.estimated_minutes[level.index()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Build shortest paths for target skills not covered by stored paths.
    pub derive_paths: bool,
    pub base_score: f64,
    pub skill_match_bonus: f64,
    pub hours_per_node: f64,
    /// Hop bound for derived-path searches.
    pub max_path_hops: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            derive_paths: true,
            base_score: 0.5,
            skill_match_bonus: 0.1,
            hours_per_node: 2.0,
            max_path_hops: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-call deadline applied by the engine facade. `None` disables it.
    pub call_timeout_ms: Option<u64>,
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Complete engine configuration, as read from `kge.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validation: ValidationConfig,
    pub metrics: MetricsConfig,
    pub difficulty: DifficultyConfig,
    pub recommendation: RecommendationConfig,
    pub paths: PathsConfig,
    pub engine: RuntimeConfig,
}

impl EngineConfig {
    /// Load configuration from an optional YAML file, then apply env overrides.
    ///
    /// Without an explicit path, `KGE_CONFIG` is consulted, then `kge.yaml`
    /// in the working directory. A missing file falls back to defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("KGE_CONFIG").ok().map(PathBuf::from);
        let path = yaml_path
            .map(Path::to_path_buf)
            .or(env_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = Self::load_yaml(&path);

        if let Some(hops) = std::env::var("KGE_MAX_CYCLE_HOPS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.validation.max_cycle_hops = hops;
        }
        if let Some(ms) = std::env::var("KGE_CALL_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.engine.call_timeout_ms = Some(ms);
        }

        config.check()?;
        Ok(config)
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config file at {}, using env vars / defaults", path.display());
                Self::default()
            }
        }
    }

    /// Reject values no analyzer can work with.
    pub fn check(&self) -> Result<()> {
        if self.validation.max_cycle_hops == 0 {
            bail!("validation.max_cycle_hops must be > 0");
        }
        if self.metrics.sample_size == 0 {
            bail!("metrics.sample_size must be > 0");
        }
        if self.paths.max_path_hops == 0 {
            bail!("paths.max_path_hops must be > 0");
        }
        if self
            .difficulty
            .level_scale
            .iter()
            .any(|v| !(0.0..=1.0).contains(v))
        {
            bail!("difficulty.level_scale values must be within [0, 1]");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

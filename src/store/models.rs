//! Knowledge graph domain models: graphs, nodes, relations and learning paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EngineError;

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of knowledge unit a node represents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    #[default]
    Concept,
    Skill,
    Topic,
    Subject,
    LearningPath,
    Content,
    Resource,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concept => write!(f, "concept"),
            Self::Skill => write!(f, "skill"),
            Self::Topic => write!(f, "topic"),
            Self::Subject => write!(f, "subject"),
            Self::LearningPath => write!(f, "learning_path"),
            Self::Content => write!(f, "content"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

impl FromStr for NodeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concept" => Ok(Self::Concept),
            "skill" => Ok(Self::Skill),
            "topic" => Ok(Self::Topic),
            "subject" => Ok(Self::Subject),
            "learning_path" => Ok(Self::LearningPath),
            "content" => Ok(Self::Content),
            "resource" => Ok(Self::Resource),
            _ => Err(EngineError::invalid(format!("Unknown node type: {}", s))),
        }
    }
}

/// Type of a directed relation between two knowledge nodes.
///
/// For `Prerequisite`, the source node must be learned before the target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    #[serde(alias = "prerequisite_of")]
    Prerequisite,
    RelatedTo,
    PartOf,
    LeadsTo,
    SimilarTo,
    OppositeOf,
    ExampleOf,
    ApplicationOf,
}

impl RelationType {
    /// Relation types that count as structural learning edges for
    /// recommendation and concept-map traversal.
    pub const LEARNING: [RelationType; 3] = [Self::Prerequisite, Self::RelatedTo, Self::PartOf];

    /// Weight assigned when a relation is created without an explicit one.
    pub fn default_weight(self) -> f64 {
        match self {
            Self::Prerequisite => 3.0,
            Self::PartOf => 2.5,
            Self::RelatedTo => 2.0,
            _ => 1.0,
        }
    }

    /// Fixed tie-break rank: prerequisite < part_of < related_to < others.
    pub fn rank(self) -> u8 {
        match self {
            Self::Prerequisite => 0,
            Self::PartOf => 1,
            Self::RelatedTo => 2,
            _ => 3,
        }
    }

    pub fn is_learning_edge(self) -> bool {
        Self::LEARNING.contains(&self)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prerequisite => write!(f, "prerequisite"),
            Self::RelatedTo => write!(f, "related_to"),
            Self::PartOf => write!(f, "part_of"),
            Self::LeadsTo => write!(f, "leads_to"),
            Self::SimilarTo => write!(f, "similar_to"),
            Self::OppositeOf => write!(f, "opposite_of"),
            Self::ExampleOf => write!(f, "example_of"),
            Self::ApplicationOf => write!(f, "application_of"),
        }
    }
}

impl FromStr for RelationType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prerequisite" | "prerequisite_of" => Ok(Self::Prerequisite),
            "related_to" => Ok(Self::RelatedTo),
            "part_of" => Ok(Self::PartOf),
            "leads_to" => Ok(Self::LeadsTo),
            "similar_to" => Ok(Self::SimilarTo),
            "opposite_of" => Ok(Self::OppositeOf),
            "example_of" => Ok(Self::ExampleOf),
            "application_of" => Ok(Self::ApplicationOf),
            _ => Err(EngineError::invalid(format!("Unknown relation type: {}", s))),
        }
    }
}

/// Ordinal difficulty scale, beginner (1) through expert (5).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    #[default]
    Beginner,
    Elementary,
    Intermediate,
    Advanced,
    Expert,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 5] = [
        Self::Beginner,
        Self::Elementary,
        Self::Intermediate,
        Self::Advanced,
        Self::Expert,
    ];

    /// Numeric ordinal, 1..=5.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Beginner => 1,
            Self::Elementary => 2,
            Self::Intermediate => 3,
            Self::Advanced => 4,
            Self::Expert => 5,
        }
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Beginner),
            2 => Some(Self::Elementary),
            3 => Some(Self::Intermediate),
            4 => Some(Self::Advanced),
            5 => Some(Self::Expert),
            _ => None,
        }
    }

    /// Absolute ordinal distance between two levels.
    pub fn distance(self, other: Self) -> u8 {
        self.ordinal().abs_diff(other.ordinal())
    }

    /// Zero-based position, used to index per-level tables.
    pub fn index(self) -> usize {
        usize::from(self.ordinal() - 1)
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Elementary => write!(f, "elementary"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

impl FromStr for DifficultyLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" | "1" => Ok(Self::Beginner),
            "elementary" | "2" => Ok(Self::Elementary),
            "intermediate" | "3" => Ok(Self::Intermediate),
            "advanced" | "4" => Ok(Self::Advanced),
            "expert" | "5" => Ok(Self::Expert),
            _ => Err(EngineError::invalid(format!("Unknown difficulty level: {}", s))),
        }
    }
}

// ============================================================================
// Knowledge graph
// ============================================================================

/// A named knowledge graph owning nodes, relations and learning paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl KnowledgeGraph {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            domain: domain.into(),
            subject: String::new(),
            created_by: None,
            is_public: false,
            version: default_version(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Knowledge node
// ============================================================================

/// A unit of knowledge, skill or content inside one graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: Uuid,
    pub graph_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    /// Explicit numeric difficulty in [0, 1]; overrides the ordinal scale when set.
    #[serde(default)]
    pub difficulty_score: Option<f64>,
    #[serde(default)]
    pub estimated_hours: f64,
    /// Denormalized prerequisite hint. Prerequisite relations are authoritative.
    #[serde(default)]
    pub prerequisites: Vec<Uuid>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeNode {
    pub fn new(graph_id: Uuid, name: impl Into<String>, difficulty: DifficultyLevel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            graph_id,
            name: name.into(),
            description: String::new(),
            node_type: NodeType::Concept,
            subject: String::new(),
            difficulty,
            difficulty_score: None,
            estimated_hours: 0.0,
            prerequisites: Vec::new(),
            skills: Vec::new(),
            keywords: Vec::new(),
            tags: Vec::new(),
            learning_objectives: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn with_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = hours;
        self
    }

    pub fn with_difficulty_score(mut self, score: f64) -> Self {
        self.difficulty_score = Some(score);
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    /// Check the node invariants enforced on the write path.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.estimated_hours.is_finite() || self.estimated_hours < 0.0 {
            return Err(EngineError::invalid(format!(
                "node {}: estimated_hours must be >= 0, got {}",
                self.id, self.estimated_hours
            )));
        }
        if let Some(score) = self.difficulty_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(EngineError::invalid(format!(
                    "node {}: difficulty_score must be within [0, 1], got {}",
                    self.id, score
                )));
            }
        }
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid(format!("node {}: name is empty", self.id)));
        }
        Ok(())
    }
}

// ============================================================================
// Knowledge relation
// ============================================================================

/// A typed, weighted, directed edge between two nodes of the same graph.
///
/// A serialized relation without `weight` gets its type's default weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RelationRecord")]
pub struct KnowledgeRelation {
    pub id: Uuid,
    pub graph_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: RelationType,
    pub weight: f64,
    pub confidence: f64,
    pub description: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    0.8
}

/// Wire form of [`KnowledgeRelation`]; `weight` may be omitted.
#[derive(Deserialize)]
struct RelationRecord {
    id: Uuid,
    graph_id: Uuid,
    source_id: Uuid,
    target_id: Uuid,
    relation_type: RelationType,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl From<RelationRecord> for KnowledgeRelation {
    fn from(record: RelationRecord) -> Self {
        Self {
            id: record.id,
            graph_id: record.graph_id,
            source_id: record.source_id,
            target_id: record.target_id,
            relation_type: record.relation_type,
            weight: record
                .weight
                .unwrap_or_else(|| record.relation_type.default_weight()),
            confidence: record.confidence,
            description: record.description,
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl KnowledgeRelation {
    /// Create a relation with the type's default weight and confidence 0.8.
    pub fn new(graph_id: Uuid, source_id: Uuid, target_id: Uuid, relation_type: RelationType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            graph_id,
            source_id,
            target_id,
            relation_type,
            weight: relation_type.default_weight(),
            confidence: default_confidence(),
            description: String::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// The endpoint opposite to `node_id`, if `node_id` is one of the endpoints.
    pub fn other_end(&self, node_id: Uuid) -> Option<Uuid> {
        if self.source_id == node_id {
            Some(self.target_id)
        } else if self.target_id == node_id {
            Some(self.source_id)
        } else {
            None
        }
    }

    /// Check the relation invariants enforced on the write path.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::invalid(format!(
                "relation {}: confidence must be within [0, 1], got {}",
                self.id, self.confidence
            )));
        }
        if !self.weight.is_finite() {
            return Err(EngineError::invalid(format!(
                "relation {}: weight must be finite",
                self.id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Learning path
// ============================================================================

/// One step of a learning path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    pub node_id: Uuid,
    pub order: u32,
    #[serde(default)]
    pub is_optional: bool,
}

/// A curated (or derived) ordered sequence of knowledge nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    pub id: Uuid,
    pub graph_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub steps: Vec<PathStep>,
    #[serde(default)]
    pub learning_goals: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LearningPath {
    /// Build a path whose steps follow the order of `node_ids`.
    pub fn from_nodes(
        graph_id: Uuid,
        name: impl Into<String>,
        difficulty: DifficultyLevel,
        node_ids: &[Uuid],
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            graph_id,
            name: name.into(),
            description: String::new(),
            subject: String::new(),
            difficulty,
            estimated_hours: 0.0,
            steps: node_ids
                .iter()
                .enumerate()
                .map(|(i, id)| PathStep {
                    node_id: *id,
                    order: i as u32,
                    is_optional: false,
                })
                .collect(),
            learning_goals: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Node ids sorted by step order.
    pub fn ordered_node_ids(&self) -> Vec<Uuid> {
        let mut steps: Vec<&PathStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps.into_iter().map(|s| s.node_id).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

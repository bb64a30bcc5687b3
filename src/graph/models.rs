//! Graph analytics data models.
//!
//! ## Input types (extraction)
//! - [`KnowledgeGraphView`]: petgraph snapshot of one knowledge graph with
//!   ID ↔ NodeIndex mapping
//!
//! ## Output types (analytics)
//! - [`ValidationReport`]: structural findings and statistics
//! - [`ComponentInfo`]: one connected component
//! - [`GraphComplexity`]: global metrics and distributions
//! - [`DifficultyPrediction`]: per (node, learner) difficulty estimate
//! - [`Recommendation`]: one next-node suggestion
//! - [`PathRecommendation`]: one ranked learning path
//! - [`ConceptMap`]: induced subgraph around a center node

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

use crate::store::{DifficultyLevel, KnowledgeNode, KnowledgeRelation, NodeType, RelationType};

// ============================================================================
// KnowledgeGraphView: petgraph wrapper with ID mapping
// ============================================================================

/// In-memory snapshot of one knowledge graph.
///
/// Relations whose endpoints do not resolve to a node of the graph are kept
/// aside in `dangling` instead of being added as edges.
#[derive(Debug, Clone)]
pub struct KnowledgeGraphView {
    pub graph_id: Uuid,
    pub graph: DiGraph<KnowledgeNode, KnowledgeRelation>,
    pub id_to_index: HashMap<Uuid, NodeIndex>,
    pub dangling: Vec<KnowledgeRelation>,
}

impl KnowledgeGraphView {
    pub fn new(graph_id: Uuid) -> Self {
        Self::with_capacity(graph_id, 0, 0)
    }

    pub fn with_capacity(graph_id: Uuid, nodes: usize, edges: usize) -> Self {
        Self {
            graph_id,
            graph: DiGraph::with_capacity(nodes, edges),
            id_to_index: HashMap::with_capacity(nodes),
            dangling: Vec::new(),
        }
    }

    /// Add a node. If a node with the same ID already exists, returns its index.
    pub fn add_node(&mut self, node: KnowledgeNode) -> NodeIndex {
        if let Some(&idx) = self.id_to_index.get(&node.id) {
            return idx;
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.id_to_index.insert(id, idx);
        idx
    }

    /// Add a relation as an edge. Returns `None` if an endpoint is missing.
    pub fn add_relation(&mut self, relation: KnowledgeRelation) -> Option<EdgeIndex> {
        let from = *self.id_to_index.get(&relation.source_id)?;
        let to = *self.id_to_index.get(&relation.target_id)?;
        Some(self.graph.add_edge(from, to, relation))
    }

    pub fn get_node(&self, id: Uuid) -> Option<&KnowledgeNode> {
        let idx = self.id_to_index.get(&id)?;
        self.graph.node_weight(*idx)
    }

    pub fn get_index(&self, id: Uuid) -> Option<NodeIndex> {
        self.id_to_index.get(&id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of resolved relations (dangling ones excluded).
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_id(&self, idx: NodeIndex) -> Uuid {
        self.graph[idx].id
    }

    /// Undirected adjacency over all relation types, self-loops dropped,
    /// each neighbor listed once, neighbors sorted by index.
    pub fn undirected_adjacency(&self) -> Vec<Vec<NodeIndex>> {
        let mut adjacency: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.node_count()];
        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source(), edge.target());
            if a == b {
                continue;
            }
            adjacency[a.index()].push(b);
            adjacency[b.index()].push(a);
        }
        for neighbors in &mut adjacency {
            neighbors.sort();
            neighbors.dedup();
        }
        adjacency
    }

    /// Outgoing neighbors through relations of the given type, deduplicated.
    pub fn typed_successors(&self, idx: NodeIndex, relation_type: RelationType) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| e.weight().relation_type == relation_type)
            .map(|e| e.target())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Direct prerequisites of a node: sources of incoming prerequisite relations.
    pub fn prerequisites_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| e.weight().relation_type == RelationType::Prerequisite)
            .map(|e| e.source())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Severity of a validation error. Sorts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CircularDependency,
    InconsistentRelation,
    DuplicateRelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    OrphanedNode,
    DifficultyJump,
    MissingPrerequisite,
    SelfLoop,
}

/// A structural error found by the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub node_ids: Vec<Uuid>,
    pub relation_ids: Vec<Uuid>,
}

/// A non-blocking finding with a suggested fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub message: String,
    pub node_ids: Vec<Uuid>,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStatistics {
    pub total_nodes: usize,
    pub total_relations: usize,
    pub orphaned_nodes: usize,
    pub circular_dependencies: usize,
    pub missing_prerequisites: usize,
    pub inconsistent_difficulty: usize,
    pub duplicate_relations: usize,
    pub dangling_relations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub graph_id: Uuid,
    /// False as soon as one critical error is present.
    pub is_valid: bool,
    /// Ordered critical → major → minor.
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
    pub suggestions: Vec<String>,
    pub statistics: ValidationStatistics,
    /// Hop bound used for cycle detection.
    pub max_cycle_hops: usize,
    pub notes: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

// ============================================================================
// Connectivity and complexity
// ============================================================================

/// Metadata about a connected component (relations taken as undirected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Component ID (0-indexed, 0 is the largest)
    pub id: usize,
    pub size: usize,
    /// Member node ids, sorted
    pub members: Vec<Uuid>,
    /// Whether this is the largest component
    pub is_main: bool,
}

/// A metric value, flagged when it was computed from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub value: f64,
    pub estimated: bool,
}

impl Metric {
    pub fn exact(value: f64) -> Self {
        Self { value, estimated: false }
    }

    pub fn estimated(value: f64) -> Self {
        Self { value, estimated: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphComplexity {
    pub graph_id: Uuid,
    pub node_count: usize,
    pub relation_count: usize,
    pub average_degree: f64,
    pub density: f64,
    /// |E| − |N| + 2, single-region estimate (0 when N ≤ 1)
    pub cyclomatic_complexity: i64,
    pub component_count: usize,
    pub clustering_coefficient: Metric,
    /// Longest prerequisite chain, in edges
    pub longest_path: Metric,
    pub average_path_length: Metric,
    pub node_type_distribution: BTreeMap<NodeType, usize>,
    pub relation_type_distribution: BTreeMap<RelationType, usize>,
    pub difficulty_distribution: BTreeMap<DifficultyLevel, usize>,
    pub notes: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

// ============================================================================
// Difficulty prediction
// ============================================================================

/// Where the historical performance figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// The learner's own attempts on the node
    Direct,
    /// Attempts on directly related nodes
    Related,
    /// No attempts anywhere near the node
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    WeakPrerequisites,
    WeakHistory,
    CompoundedRisk,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeakPrerequisites => write!(f, "Insufficient prerequisite knowledge"),
            Self::WeakHistory => write!(f, "Low historical performance in related areas"),
            Self::CompoundedRisk => {
                write!(f, "Both prerequisites and history are weak; high risk of struggle")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyPrediction {
    pub node_id: Uuid,
    pub learner_id: Uuid,
    pub base_difficulty: f64,
    pub predicted_difficulty: f64,
    pub confidence: f64,
    pub success_probability: f64,
    pub prerequisite_satisfaction: f64,
    pub historical_performance: f64,
    pub history_source: HistorySource,
    pub estimated_minutes: f64,
    /// Unmastered direct prerequisites
    pub recommended_preparation: Vec<Uuid>,
    pub risk_factors: Vec<RiskFactor>,
    pub notes: Vec<String>,
}

// ============================================================================
// Recommendations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub node_id: Uuid,
    pub name: String,
    pub node_type: NodeType,
    pub difficulty: DifficultyLevel,
    /// Best relation linking the current node to this one
    pub relation_type: RelationType,
    pub score: f64,
    pub relation_score: f64,
    pub prerequisites_met: bool,
    pub difficulty_match: f64,
    pub estimated_minutes: u32,
    /// 1 (high) to 3 (low)
    pub priority: u8,
    pub reasoning: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    Stored,
    Derived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecommendation {
    /// Stored path id; `None` for derived paths
    pub path_id: Option<Uuid>,
    pub name: String,
    pub source: PathSource,
    pub node_ids: Vec<Uuid>,
    pub difficulty: DifficultyLevel,
    pub score: f64,
    pub estimated_hours: f64,
    /// Requested skill → 1.0 if some path node carries that exact name
    pub skill_coverage: BTreeMap<String, f64>,
    pub reasoning: Vec<String>,
    pub notes: Vec<String>,
}

// ============================================================================
// Concept map
// ============================================================================

/// Induced subgraph around a center node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMap {
    pub graph_id: Uuid,
    pub center_node_id: Uuid,
    pub depth: usize,
    /// Nodes in discovery order, center first
    pub nodes: Vec<KnowledgeNode>,
    pub relations: Vec<KnowledgeRelation>,
    /// True when expansion stopped at `max_nodes`
    pub truncated: bool,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DifficultyLevel;

    fn node(graph: Uuid, name: &str) -> KnowledgeNode {
        KnowledgeNode::new(graph, name, DifficultyLevel::Beginner)
    }

    #[test]
    fn test_view_add_node_is_idempotent() {
        let g = Uuid::new_v4();
        let mut view = KnowledgeGraphView::new(g);
        let a = node(g, "A");
        let first = view.add_node(a.clone());
        let second = view.add_node(a);
        assert_eq!(first, second);
        assert_eq!(view.node_count(), 1);
    }

    #[test]
    fn test_view_add_relation_needs_both_endpoints() {
        let g = Uuid::new_v4();
        let mut view = KnowledgeGraphView::new(g);
        let a = node(g, "A");
        let a_id = a.id;
        view.add_node(a);
        let rel = KnowledgeRelation::new(g, a_id, Uuid::new_v4(), RelationType::RelatedTo);
        assert!(view.add_relation(rel).is_none());
        assert_eq!(view.edge_count(), 0);
    }

    #[test]
    fn test_undirected_adjacency_dedups_and_drops_self_loops() {
        let g = Uuid::new_v4();
        let mut view = KnowledgeGraphView::new(g);
        let (a, b) = (node(g, "A"), node(g, "B"));
        let (a_id, b_id) = (a.id, b.id);
        let ia = view.add_node(a);
        let ib = view.add_node(b);
        view.add_relation(KnowledgeRelation::new(g, a_id, b_id, RelationType::Prerequisite));
        view.add_relation(KnowledgeRelation::new(g, b_id, a_id, RelationType::RelatedTo));
        view.add_relation(KnowledgeRelation::new(g, a_id, a_id, RelationType::SimilarTo));

        let adj = view.undirected_adjacency();
        assert_eq!(adj[ia.index()], vec![ib]);
        assert_eq!(adj[ib.index()], vec![ia]);
    }

    #[test]
    fn test_prerequisites_of() {
        let g = Uuid::new_v4();
        let mut view = KnowledgeGraphView::new(g);
        let (a, b, c) = (node(g, "A"), node(g, "B"), node(g, "C"));
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        let ia = view.add_node(a);
        let ib = view.add_node(b);
        view.add_node(c);
        view.add_relation(KnowledgeRelation::new(g, a_id, b_id, RelationType::Prerequisite));
        view.add_relation(KnowledgeRelation::new(g, c_id, b_id, RelationType::RelatedTo));

        assert_eq!(view.prerequisites_of(ib), vec![ia]);
        assert!(view.prerequisites_of(ia).is_empty());
        assert_eq!(view.typed_successors(ia, RelationType::Prerequisite), vec![ib]);
    }

    #[test]
    fn test_severity_orders_critical_first() {
        let mut s = vec![Severity::Minor, Severity::Critical, Severity::Major];
        s.sort();
        assert_eq!(s, vec![Severity::Critical, Severity::Major, Severity::Minor]);
    }
}

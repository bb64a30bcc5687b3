//! Structural validation of a knowledge graph.
//!
//! Cycles and dangling relations are errors; orphans, difficulty jumps,
//! stale prerequisite hints and non-prerequisite self-loops are warnings.
//! Only critical errors make a report invalid.

use chrono::Utc;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio_util::sync::CancellationToken;

use super::algorithms::CANCEL_CHECK_INTERVAL;
use super::ensure_active;
use super::models::{
    IssueKind, KnowledgeGraphView, Severity, ValidationIssue, ValidationReport,
    ValidationStatistics, ValidationWarning, WarningKind,
};
use crate::config::ValidationConfig;
use crate::error::Result;
use crate::store::RelationType;

/// Validate the structure of an extracted graph.
pub fn validate_structure(
    view: &KnowledgeGraphView,
    config: &ValidationConfig,
    cancel: &CancellationToken,
) -> Result<ValidationReport> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();
    let mut notes = Vec::new();
    let mut stats = ValidationStatistics {
        total_nodes: view.node_count(),
        total_relations: view.edge_count() + view.dangling.len(),
        dangling_relations: view.dangling.len(),
        ..Default::default()
    };

    // 1. Dangling endpoints
    for rel in &view.dangling {
        errors.push(ValidationIssue {
            kind: IssueKind::InconsistentRelation,
            severity: Severity::Critical,
            message: format!(
                "Relation {} ({}) references a node outside this graph: {} -> {}",
                rel.id, rel.relation_type, rel.source_id, rel.target_id
            ),
            node_ids: vec![rel.source_id, rel.target_id],
            relation_ids: vec![rel.id],
        });
    }

    // 2. Prerequisite cycles
    ensure_active(cancel)?;
    let cycles = find_prerequisite_cycles(view, config.max_cycle_hops, cancel)?;
    stats.circular_dependencies = cycles.on_cycle.iter().map(Vec::len).sum();
    for group in &cycles.on_cycle {
        let names: Vec<&str> = group
            .iter()
            .filter_map(|id| view.get_node(*id).map(|n| n.name.as_str()))
            .collect();
        errors.push(ValidationIssue {
            kind: IssueKind::CircularDependency,
            severity: Severity::Critical,
            message: format!(
                "Found {} node(s) with circular prerequisite dependencies: {}",
                group.len(),
                names.join(", ")
            ),
            node_ids: group.clone(),
            relation_ids: Vec::new(),
        });
    }
    if cycles.beyond_limit > 0 {
        notes.push(format!(
            "{} node(s) lie on prerequisite cycles longer than {} hops and were not reported",
            cycles.beyond_limit, config.max_cycle_hops
        ));
    }

    // 3. Duplicate relations
    let mut seen: HashMap<(NodeIndex, NodeIndex, RelationType), Vec<uuid::Uuid>> = HashMap::new();
    for edge in view.graph.edge_references() {
        seen.entry((edge.source(), edge.target(), edge.weight().relation_type))
            .or_default()
            .push(edge.weight().id);
    }
    let mut duplicates: Vec<_> = seen.into_iter().filter(|(_, ids)| ids.len() > 1).collect();
    duplicates.sort_by_key(|((s, t, ty), _)| (view.node_id(*s), view.node_id(*t), ty.rank()));
    for ((s, t, ty), mut ids) in duplicates {
        ids.sort();
        stats.duplicate_relations += ids.len() - 1;
        errors.push(ValidationIssue {
            kind: IssueKind::DuplicateRelation,
            severity: Severity::Minor,
            message: format!(
                "{} duplicate {} relations between {} and {}",
                ids.len(),
                ty,
                view.graph[s].name,
                view.graph[t].name
            ),
            node_ids: vec![view.node_id(s), view.node_id(t)],
            relation_ids: ids,
        });
    }

    // 4. Per-node checks
    let mut orphans = Vec::new();
    for idx in view.graph.node_indices() {
        let node = &view.graph[idx];
        let degree = view.graph.edges_directed(idx, Direction::Outgoing).count()
            + view.graph.edges_directed(idx, Direction::Incoming).count();
        if degree == 0 {
            orphans.push(node.id);
        }

        let missing: Vec<uuid::Uuid> = node
            .prerequisites
            .iter()
            .filter(|id| view.get_index(**id).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            stats.missing_prerequisites += missing.len();
            warnings.push(ValidationWarning {
                kind: WarningKind::MissingPrerequisite,
                message: format!(
                    "Node '{}' lists {} prerequisite(s) that are not in this graph",
                    node.name,
                    missing.len()
                ),
                node_ids: std::iter::once(node.id).chain(missing).collect(),
                suggested_fix: "Remove stale prerequisite ids or add the missing nodes".to_string(),
            });
        }

        for edge in view.graph.edges_directed(idx, Direction::Outgoing) {
            let rel = edge.weight();
            if edge.target() == idx && rel.relation_type != RelationType::Prerequisite {
                warnings.push(ValidationWarning {
                    kind: WarningKind::SelfLoop,
                    message: format!("Node '{}' has a {} relation to itself", node.name, rel.relation_type),
                    node_ids: vec![node.id],
                    suggested_fix: format!("Remove relation {}", rel.id),
                });
            }
            if rel.relation_type == RelationType::Prerequisite {
                let target = &view.graph[edge.target()];
                let jump = i16::from(target.difficulty.ordinal()) - i16::from(node.difficulty.ordinal());
                if jump > i16::from(config.difficulty_jump_threshold) {
                    stats.inconsistent_difficulty += 1;
                    warnings.push(ValidationWarning {
                        kind: WarningKind::DifficultyJump,
                        message: format!(
                            "Prerequisite '{}' ({}) jumps {} levels to '{}' ({})",
                            node.name, node.difficulty, jump, target.name, target.difficulty
                        ),
                        node_ids: vec![node.id, target.id],
                        suggested_fix: "Insert intermediate nodes between these levels".to_string(),
                    });
                }
            }
        }
    }

    stats.orphaned_nodes = orphans.len();
    if !orphans.is_empty() {
        orphans.sort();
        warnings.push(ValidationWarning {
            kind: WarningKind::OrphanedNode,
            message: format!("Found {} orphaned nodes", orphans.len()),
            node_ids: orphans,
            suggested_fix: "Connect these nodes to related concepts or remove them".to_string(),
        });
        suggestions.push("Consider connecting orphaned nodes to the main graph structure".to_string());
    }
    if stats.total_nodes > 0 && stats.total_relations == 0 {
        suggestions.push("Add relationships between nodes to create meaningful learning paths".to_string());
    }
    if stats.circular_dependencies > 0 {
        suggestions.push(
            "Break circular prerequisite chains so every node has a valid learning order".to_string(),
        );
    }
    if stats.duplicate_relations > 0 {
        suggestions.push("Merge duplicate relations between the same nodes".to_string());
    }

    errors.sort_by_key(|e| e.severity);
    let is_valid = !errors.iter().any(|e| e.severity == Severity::Critical);

    Ok(ValidationReport {
        graph_id: view.graph_id,
        is_valid,
        errors,
        warnings,
        suggestions,
        statistics: stats,
        max_cycle_hops: config.max_cycle_hops,
        notes,
        validated_at: Utc::now(),
    })
}

// ============================================================================
// Cycle detection
// ============================================================================

struct CycleFindings {
    /// Node ids on a cycle within the hop bound, grouped by strongly connected component
    on_cycle: Vec<Vec<uuid::Uuid>>,
    /// Nodes on a cycle whose shortest cycle exceeds the hop bound
    beyond_limit: usize,
}

/// Find nodes reachable from themselves through at most `max_hops`
/// prerequisite relations.
///
/// Candidates are restricted to non-trivial strongly connected components
/// (and prerequisite self-loops); each candidate then runs a hop-bounded
/// BFS inside its component.
fn find_prerequisite_cycles(
    view: &KnowledgeGraphView,
    max_hops: usize,
    cancel: &CancellationToken,
) -> Result<CycleFindings> {
    let n = view.node_count();
    let mut prereq: DiGraph<(), ()> = DiGraph::with_capacity(n, view.edge_count());
    for _ in 0..n {
        prereq.add_node(());
    }
    let mut successors: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    for idx in view.graph.node_indices() {
        let next = view.typed_successors(idx, RelationType::Prerequisite);
        for t in &next {
            prereq.add_edge(idx, *t, ());
        }
        successors[idx.index()] = next;
    }

    let mut findings = CycleFindings {
        on_cycle: Vec::new(),
        beyond_limit: 0,
    };

    for scc in kosaraju_scc(&prereq) {
        ensure_active(cancel)?;
        let cyclic = scc.len() > 1 || successors[scc[0].index()].contains(&scc[0]);
        if !cyclic {
            continue;
        }
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let mut group = Vec::new();
        for &start in &scc {
            ensure_active(cancel)?;
            if returns_within(start, max_hops, &successors, &members, cancel)? {
                group.push(view.node_id(start));
            } else {
                findings.beyond_limit += 1;
            }
        }
        if !group.is_empty() {
            group.sort();
            findings.on_cycle.push(group);
        }
    }
    findings.on_cycle.sort_by_key(|g| g[0]);

    if !findings.on_cycle.is_empty() {
        tracing::debug!(groups = findings.on_cycle.len(), "Prerequisite cycles detected");
    }
    Ok(findings)
}

/// Hop-bounded BFS: does `start` reach itself in at most `max_hops` edges?
fn returns_within(
    start: NodeIndex,
    max_hops: usize,
    successors: &[Vec<NodeIndex>],
    members: &HashSet<NodeIndex>,
    cancel: &CancellationToken,
) -> Result<bool> {
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
    queue.push_back((start, 0));
    let mut expansions = 0usize;
    while let Some((current, depth)) = queue.pop_front() {
        expansions += 1;
        if expansions % CANCEL_CHECK_INTERVAL == 0 {
            ensure_active(cancel)?;
        }
        if depth >= max_hops {
            continue;
        }
        for &next in &successors[current.index()] {
            if next == start {
                return Ok(true);
            }
            if members.contains(&next) && visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    Ok(false)
}

// ============================================================================
// Tests
// ============================================================================

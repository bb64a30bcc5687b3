//! Connectivity and complexity algorithms.
//!
//! Implements the graph algorithms behind the connectivity analyzer:
//! - **Connected components**: iterative DFS over an undirected adjacency list
//! - **Clustering coefficient**: average local coefficient over the undirected view
//! - **Longest prerequisite chain**: DP over a topological order
//! - **Average path length**: BFS hop distances over reachable pairs
//! - **Shortest path**: multi-source, hop-bounded BFS along typed relations
//!
//! All traversals are explicit (stack or queue plus visited set) and check
//! the cancellation token between node expansions.

use chrono::Utc;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tokio_util::sync::CancellationToken;

use super::ensure_active;
use super::models::{ComponentInfo, GraphComplexity, KnowledgeGraphView, Metric};
use crate::config::MetricsConfig;
use crate::error::Result;
use crate::store::RelationType;

/// Number of node expansions between two cancellation checks.
pub(crate) const CANCEL_CHECK_INTERVAL: usize = 256;

// ============================================================================
// Connected components
// ============================================================================

/// Partition the nodes into connected components, relations taken as undirected.
///
/// Components are sorted by size (descending) then by smallest member id;
/// the first one is flagged `is_main`.
pub fn connected_components(
    view: &KnowledgeGraphView,
    cancel: &CancellationToken,
) -> Result<Vec<ComponentInfo>> {
    let adjacency = view.undirected_adjacency();
    let n = view.node_count();
    let mut visited = vec![false; n];
    let mut groups: Vec<Vec<uuid::Uuid>> = Vec::new();
    let mut expansions = 0usize;

    for start in view.graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        let mut members = Vec::new();
        let mut stack = vec![start];
        visited[start.index()] = true;

        while let Some(current) = stack.pop() {
            expansions += 1;
            if expansions % CANCEL_CHECK_INTERVAL == 0 {
                ensure_active(cancel)?;
            }
            members.push(view.node_id(current));
            for &neighbor in &adjacency[current.index()] {
                if !visited[neighbor.index()] {
                    visited[neighbor.index()] = true;
                    stack.push(neighbor);
                }
            }
        }
        members.sort();
        groups.push(members);
    }

    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    let components: Vec<ComponentInfo> = groups
        .into_iter()
        .enumerate()
        .map(|(id, members)| ComponentInfo {
            id,
            size: members.len(),
            is_main: id == 0,
            members,
        })
        .collect();

    tracing::debug!(
        graph_id = %view.graph_id,
        components = components.len(),
        "Computed connected components"
    );
    Ok(components)
}

// ============================================================================
// Clustering coefficient
// ============================================================================

/// Average local clustering coefficient over `nodes`.
///
/// coefficient = linked neighbor pairs / (k * (k-1) / 2), 0 for k < 2.
pub fn average_clustering(adjacency: &[Vec<NodeIndex>], nodes: &[NodeIndex]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    let sets: Vec<HashSet<NodeIndex>> = adjacency
        .iter()
        .map(|neighbors| neighbors.iter().copied().collect())
        .collect();

    let total: f64 = nodes
        .iter()
        .map(|idx| {
            let neighbors = &adjacency[idx.index()];
            let k = neighbors.len();
            if k < 2 {
                return 0.0;
            }
            let mut linked = 0usize;
            for i in 0..k {
                for j in (i + 1)..k {
                    if sets[neighbors[i].index()].contains(&neighbors[j]) {
                        linked += 1;
                    }
                }
            }
            linked as f64 / (k * (k - 1) / 2) as f64
        })
        .sum();
    total / nodes.len() as f64
}

// ============================================================================
// Longest prerequisite chain
// ============================================================================

/// Longest chain of prerequisite relations, in edges.
///
/// Exact when the prerequisite subgraph is acyclic. Otherwise DFS back edges
/// are dropped and the longest path of the remaining DAG is returned as an
/// estimate (every such path is a simple path of the full graph).
pub fn longest_prerequisite_chain(
    view: &KnowledgeGraphView,
    cancel: &CancellationToken,
) -> Result<Metric> {
    let n = view.node_count();
    let successors: Vec<Vec<NodeIndex>> = view
        .graph
        .node_indices()
        .map(|idx| view.typed_successors(idx, RelationType::Prerequisite))
        .collect();

    // Iterative DFS producing a postorder; edges into in-progress nodes are back edges.
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;
    let mut color = vec![WHITE; n];
    let mut postorder = Vec::with_capacity(n);
    let mut back_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
    let mut expansions = 0usize;

    for root in view.graph.node_indices() {
        if color[root.index()] != WHITE {
            continue;
        }
        let mut stack: Vec<(NodeIndex, usize)> = vec![(root, 0)];
        color[root.index()] = GRAY;
        while let Some(frame) = stack.last_mut() {
            let (current, cursor) = *frame;
            if let Some(&child) = successors[current.index()].get(cursor) {
                frame.1 += 1;
                match color[child.index()] {
                    WHITE => {
                        color[child.index()] = GRAY;
                        stack.push((child, 0));
                    }
                    GRAY => {
                        back_edges.insert((current, child));
                    }
                    _ => {}
                }
            } else {
                color[current.index()] = BLACK;
                postorder.push(current);
                stack.pop();
                expansions += 1;
                if expansions % CANCEL_CHECK_INTERVAL == 0 {
                    ensure_active(cancel)?;
                }
            }
        }
    }

    // Postorder lists every successor before its predecessor on the DAG.
    let mut longest = vec![0usize; n];
    for &idx in &postorder {
        let best = successors[idx.index()]
            .iter()
            .filter(|s| !back_edges.contains(&(idx, **s)))
            .map(|s| longest[s.index()] + 1)
            .max()
            .unwrap_or(0);
        longest[idx.index()] = best;
    }
    let value = longest.into_iter().max().unwrap_or(0) as f64;

    Ok(if back_edges.is_empty() {
        Metric::exact(value)
    } else {
        Metric::estimated(value)
    })
}

// ============================================================================
// Average path length
// ============================================================================

/// Mean BFS hop distance over reachable ordered pairs, from the given sources.
pub fn average_path_length(
    adjacency: &[Vec<NodeIndex>],
    sources: &[NodeIndex],
    cancel: &CancellationToken,
) -> Result<f64> {
    let n = adjacency.len();
    let mut total_hops = 0usize;
    let mut pairs = 0usize;
    let mut dist: Vec<Option<usize>> = vec![None; n];

    for &source in sources {
        ensure_active(cancel)?;
        dist.iter_mut().for_each(|d| *d = None);
        dist[source.index()] = Some(0);
        let mut queue = VecDeque::from([source]);
        while let Some(current) = queue.pop_front() {
            let d = dist[current.index()].unwrap_or(0);
            for &next in &adjacency[current.index()] {
                if dist[next.index()].is_none() {
                    dist[next.index()] = Some(d + 1);
                    total_hops += d + 1;
                    pairs += 1;
                    queue.push_back(next);
                }
            }
        }
    }

    Ok(if pairs == 0 {
        0.0
    } else {
        total_hops as f64 / pairs as f64
    })
}

/// Deterministic stride sample of `size` node indices.
fn stride_sample(view: &KnowledgeGraphView, size: usize) -> Vec<NodeIndex> {
    let n = view.node_count();
    let step = n.div_ceil(size.max(1)).max(1);
    view.graph.node_indices().step_by(step).collect()
}

// ============================================================================
// Complexity
// ============================================================================

/// Compute global metrics and distributions for a graph.
pub fn compute_complexity(
    view: &KnowledgeGraphView,
    config: &MetricsConfig,
    cancel: &CancellationToken,
) -> Result<GraphComplexity> {
    let n = view.node_count();
    let e = view.edge_count();
    let mut notes = Vec::new();

    let average_degree = if n == 0 { 0.0 } else { 2.0 * e as f64 / n as f64 };
    let density = if n > 1 {
        e as f64 / (n as f64 * (n as f64 - 1.0) / 2.0)
    } else {
        0.0
    };
    if density > 1.0 {
        notes.push(format!(
            "density {:.3} exceeds 1 because of reciprocal or parallel relations",
            density
        ));
    }

    let components = connected_components(view, cancel)?;
    let component_count = components.len();
    let cyclomatic_complexity = if n > 1 { e as i64 - n as i64 + 2 } else { 0 };
    if component_count > 1 && n > 1 {
        notes.push(format!(
            "graph has {} components; cyclomatic complexity uses E - N + 2 (E - N + 2P would be {})",
            component_count,
            e as i64 - n as i64 + 2 * component_count as i64
        ));
    }

    let adjacency = view.undirected_adjacency();
    let exact = n <= config.exact_metrics_node_limit;
    let sampled: Vec<NodeIndex> = if exact {
        view.graph.node_indices().collect()
    } else {
        notes.push(format!(
            "{} nodes exceed the exact metrics limit of {}; clustering and path length use a {}-node sample",
            n, config.exact_metrics_node_limit, config.sample_size
        ));
        stride_sample(view, config.sample_size)
    };

    ensure_active(cancel)?;
    let clustering = average_clustering(&adjacency, &sampled);
    let path_length = average_path_length(&adjacency, &sampled, cancel)?;
    let (clustering_metric, path_metric) = if exact {
        (Metric::exact(clustering), Metric::exact(path_length))
    } else {
        (Metric::estimated(clustering), Metric::estimated(path_length))
    };

    let longest_path = longest_prerequisite_chain(view, cancel)?;
    if longest_path.estimated {
        notes.push(
            "prerequisite relations contain cycles; longest path ignores back edges".to_string(),
        );
    }

    let mut node_type_distribution = BTreeMap::new();
    let mut difficulty_distribution = BTreeMap::new();
    for node in view.graph.node_weights() {
        *node_type_distribution.entry(node.node_type).or_insert(0) += 1;
        *difficulty_distribution.entry(node.difficulty).or_insert(0) += 1;
    }
    let mut relation_type_distribution = BTreeMap::new();
    for rel in view.graph.edge_weights() {
        *relation_type_distribution.entry(rel.relation_type).or_insert(0) += 1;
    }

    Ok(GraphComplexity {
        graph_id: view.graph_id,
        node_count: n,
        relation_count: e,
        average_degree,
        density,
        cyclomatic_complexity,
        component_count,
        clustering_coefficient: clustering_metric,
        longest_path,
        average_path_length: path_metric,
        node_type_distribution,
        relation_type_distribution,
        difficulty_distribution,
        notes,
        computed_at: Utc::now(),
    })
}

// ============================================================================
// Shortest path
// ============================================================================

/// Shortest path from any of `sources` to `target` along outgoing relations
/// of the given types, bounded by `max_hops`.
///
/// Returns the node sequence from the chosen source to the target, or `None`
/// when the target is unreachable within the bound. Ties are broken by
/// node index so the result is deterministic.
pub fn shortest_path(
    view: &KnowledgeGraphView,
    sources: &[NodeIndex],
    target: NodeIndex,
    relation_types: &[RelationType],
    max_hops: usize,
    cancel: &CancellationToken,
) -> Result<Option<Vec<NodeIndex>>> {
    let mut parent: HashMap<NodeIndex, Option<NodeIndex>> = HashMap::new();
    let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
    let mut ordered: Vec<NodeIndex> = sources.to_vec();
    ordered.sort();
    ordered.dedup();
    for s in ordered {
        parent.insert(s, None);
        queue.push_back((s, 0));
    }

    let mut found = parent.contains_key(&target);
    let mut expansions = 0usize;
    while !found {
        let Some((current, depth)) = queue.pop_front() else {
            break;
        };
        expansions += 1;
        if expansions % CANCEL_CHECK_INTERVAL == 0 {
            ensure_active(cancel)?;
        }
        if depth >= max_hops {
            continue;
        }
        let mut next: Vec<NodeIndex> = view
            .graph
            .edges_directed(current, Direction::Outgoing)
            .filter(|e| relation_types.contains(&e.weight().relation_type))
            .map(|e| e.target())
            .collect();
        next.sort();
        next.dedup();
        for nb in next {
            if parent.contains_key(&nb) {
                continue;
            }
            parent.insert(nb, Some(current));
            if nb == target {
                found = true;
                break;
            }
            queue.push_back((nb, depth + 1));
        }
    }

    if !found {
        return Ok(None);
    }
    let mut path = vec![target];
    let mut cursor = target;
    while let Some(Some(prev)) = parent.get(&cursor) {
        path.push(*prev);
        cursor = *prev;
    }
    path.reverse();
    Ok(Some(path))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphExtractor;
    use crate::store::{DifficultyLevel, InMemoryGraphStore, NodeType};
    use crate::test_helpers::{add_nodes, chain_graph, empty_graph, link, related_chain};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn view_of(store: InMemoryGraphStore, g: Uuid) -> KnowledgeGraphView {
        GraphExtractor::new(Arc::new(store))
            .extract(g, &CancellationToken::new())
            .await
            .unwrap()
    }

    // --- Components ---

    #[tokio::test]
    async fn test_components_partition_nodes() {
        let (store, g) = empty_graph().await;
        let ids = add_nodes(
            &store,
            g,
            &[
                ("A", DifficultyLevel::Beginner),
                ("B", DifficultyLevel::Beginner),
                ("C", DifficultyLevel::Beginner),
                ("D", DifficultyLevel::Beginner),
                ("E", DifficultyLevel::Beginner),
            ],
        )
        .await;
        link(&store, g, ids[0], ids[1], RelationType::Prerequisite).await;
        link(&store, g, ids[2], ids[1], RelationType::RelatedTo).await;
        link(&store, g, ids[3], ids[4], RelationType::PartOf).await;

        let view = view_of(store, g).await;
        let comps = connected_components(&view, &CancellationToken::new()).unwrap();

        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].size, 3);
        assert!(comps[0].is_main);
        assert!(!comps[1].is_main);

        let mut all: Vec<Uuid> = comps.iter().flat_map(|c| c.members.clone()).collect();
        all.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_components_of_empty_graph() {
        let (store, g) = empty_graph().await;
        let view = view_of(store, g).await;
        assert!(connected_components(&view, &CancellationToken::new())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_equal_size_components_ordered_by_smallest_member() {
        let (store, g) = empty_graph().await;
        let ids = add_nodes(
            &store,
            g,
            &[("X", DifficultyLevel::Beginner), ("Y", DifficultyLevel::Beginner)],
        )
        .await;
        let view = view_of(store, g).await;
        let comps = connected_components(&view, &CancellationToken::new()).unwrap();
        assert_eq!(comps.len(), 2);
        assert!(comps[0].members[0] < comps[1].members[0]);
        assert!(ids.contains(&comps[0].members[0]));
    }

    // --- Metrics ---

    #[tokio::test]
    async fn test_complexity_of_chain() {
        let (store, g, _) = chain_graph().await;
        let view = view_of(store, g).await;
        let c = compute_complexity(&view, &MetricsConfig::default(), &CancellationToken::new())
            .unwrap();

        assert_eq!(c.node_count, 3);
        assert_eq!(c.relation_count, 2);
        assert!((c.average_degree - 4.0 / 3.0).abs() < 1e-9);
        assert!((c.density - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(c.cyclomatic_complexity, 1);
        assert_eq!(c.component_count, 1);
        assert_eq!(c.longest_path, Metric::exact(2.0));
        assert!((c.average_path_length.value - 4.0 / 3.0).abs() < 1e-9);
        assert!(!c.average_path_length.estimated);
        assert!((c.clustering_coefficient.value).abs() < 1e-9);
        assert_eq!(c.node_type_distribution.get(&NodeType::Concept), Some(&3));
        assert_eq!(c.relation_type_distribution.get(&RelationType::Prerequisite), Some(&2));
        assert_eq!(c.difficulty_distribution.get(&DifficultyLevel::Advanced), Some(&1));
        assert!(c.notes.is_empty());
    }

    #[tokio::test]
    async fn test_complexity_small_graphs() {
        let (store, g) = empty_graph().await;
        add_nodes(&store, g, &[("Solo", DifficultyLevel::Beginner)]).await;
        let view = view_of(store, g).await;
        let c = compute_complexity(&view, &MetricsConfig::default(), &CancellationToken::new())
            .unwrap();
        assert_eq!(c.cyclomatic_complexity, 0);
        assert!((c.density).abs() < f64::EPSILON);
        assert!((c.average_degree).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_multi_component_cyclomatic_is_noted() {
        let (store, g) = empty_graph().await;
        add_nodes(
            &store,
            g,
            &[("A", DifficultyLevel::Beginner), ("B", DifficultyLevel::Beginner)],
        )
        .await;
        let view = view_of(store, g).await;
        let c = compute_complexity(&view, &MetricsConfig::default(), &CancellationToken::new())
            .unwrap();
        assert_eq!(c.cyclomatic_complexity, 0);
        assert_eq!(c.component_count, 2);
        assert!(c.notes.iter().any(|n| n.contains("2 components")));
    }

    #[tokio::test]
    async fn test_triangle_clustering() {
        let (store, g) = empty_graph().await;
        let ids = add_nodes(
            &store,
            g,
            &[
                ("A", DifficultyLevel::Beginner),
                ("B", DifficultyLevel::Beginner),
                ("C", DifficultyLevel::Beginner),
            ],
        )
        .await;
        link(&store, g, ids[0], ids[1], RelationType::RelatedTo).await;
        link(&store, g, ids[1], ids[2], RelationType::RelatedTo).await;
        link(&store, g, ids[2], ids[0], RelationType::RelatedTo).await;
        let view = view_of(store, g).await;
        let c = compute_complexity(&view, &MetricsConfig::default(), &CancellationToken::new())
            .unwrap();
        assert!((c.clustering_coefficient.value - 1.0).abs() < 1e-9);
        assert!((c.average_path_length.value - 1.0).abs() < 1e-9);
        assert_eq!(c.longest_path, Metric::exact(0.0));
    }

    #[tokio::test]
    async fn test_sampled_metrics_are_flagged() {
        let (store, g, _) = chain_graph().await;
        let view = view_of(store, g).await;
        let config = MetricsConfig {
            exact_metrics_node_limit: 2,
            sample_size: 2,
        };
        let c = compute_complexity(&view, &config, &CancellationToken::new()).unwrap();
        assert!(c.clustering_coefficient.estimated);
        assert!(c.average_path_length.estimated);
        assert!(!c.notes.is_empty());
    }

    #[tokio::test]
    async fn test_cyclic_longest_path_is_estimated() {
        let (store, g, ids) = chain_graph().await;
        link(&store, g, ids[2], ids[0], RelationType::Prerequisite).await;
        let view = view_of(store, g).await;
        let metric = longest_prerequisite_chain(&view, &CancellationToken::new()).unwrap();
        assert!(metric.estimated);
        assert!((metric.value - 2.0).abs() < f64::EPSILON);
    }

    // --- Shortest path ---

    #[tokio::test]
    async fn test_shortest_path_follows_typed_relations() {
        let (store, g, ids) = chain_graph().await;
        let view = view_of(store, g).await;
        let a = view.get_index(ids[0]).unwrap();
        let c = view.get_index(ids[2]).unwrap();
        let cancel = CancellationToken::new();

        let path = shortest_path(&view, &[a], c, &[RelationType::Prerequisite], 10, &cancel)
            .unwrap()
            .unwrap();
        let path_ids: Vec<Uuid> = path.iter().map(|i| view.node_id(*i)).collect();
        assert_eq!(path_ids, ids);

        assert!(shortest_path(&view, &[a], c, &[RelationType::Prerequisite], 1, &cancel)
            .unwrap()
            .is_none());
        assert!(shortest_path(&view, &[c], a, &[RelationType::Prerequisite], 10, &cancel)
            .unwrap()
            .is_none());
        assert!(shortest_path(&view, &[a], c, &[RelationType::PartOf], 10, &cancel)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_shortest_path_source_is_target() {
        let (store, g, ids) = chain_graph().await;
        let view = view_of(store, g).await;
        let a = view.get_index(ids[0]).unwrap();
        let path = shortest_path(
            &view,
            &[a],
            a,
            &[RelationType::Prerequisite],
            5,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(path, Some(vec![a]));
    }

    #[tokio::test]
    async fn test_cancelled_path_length() {
        let (store, g, _) = chain_graph().await;
        let view = view_of(store, g).await;
        let adjacency = view.undirected_adjacency();
        let sources: Vec<NodeIndex> = view.graph.node_indices().collect();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(average_path_length(&adjacency, &sources, &cancel).is_err());
    }

    // --- Cancellation inside traversals ---

    #[tokio::test]
    async fn test_components_stop_inside_traversal() {
        let (store, g, _) = related_chain(300).await;
        let view = view_of(store, g).await;

        assert_eq!(
            connected_components(&view, &CancellationToken::new()).unwrap()[0].size,
            300
        );

        // Fewer than CANCEL_CHECK_INTERVAL nodes never reach a check.
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            connected_components(&view, &cancel),
            Err(crate::error::EngineError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_shortest_path_stops_inside_traversal() {
        let (store, g, ids) = related_chain(300).await;
        let view = view_of(store, g).await;
        let first = view.get_index(ids[0]).unwrap();
        let last = view.get_index(ids[299]).unwrap();
        let types = [RelationType::RelatedTo];

        let path = shortest_path(&view, &[first], last, &types, 1000, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(path.len(), 300);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            shortest_path(&view, &[first], last, &types, 1000, &cancel),
            Err(crate::error::EngineError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_expired_deadline_stops_components() {
        let (store, g, _) = related_chain(300).await;
        let view = view_of(store, g).await;
        let cancel = CancellationToken::new();
        let past = std::time::Instant::now() - std::time::Duration::from_millis(1);

        let result =
            crate::graph::with_deadline_scope(past, async { connected_components(&view, &cancel) })
                .await;
        assert!(matches!(result, Err(crate::error::EngineError::Cancelled)));
        assert!(cancel.is_cancelled());
    }
}

//! Concept map extraction: a bounded breadth-first neighborhood of a node.
//!
//! Expansion follows prerequisite, related-to and part-of relations in both
//! directions and stays inside the center node's graph. The returned map is
//! the induced subgraph over the discovered nodes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ensure_active;
use super::models::ConceptMap;
use crate::error::{EngineError, Result};
use crate::store::{GraphStore, KnowledgeNode, KnowledgeRelation, RelationType};

pub struct ConceptMapExtractor {
    store: Arc<dyn GraphStore>,
}

impl ConceptMapExtractor {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn extract(
        &self,
        center_node_id: Uuid,
        depth: usize,
        max_nodes: usize,
        cancel: &CancellationToken,
    ) -> Result<ConceptMap> {
        if max_nodes == 0 {
            return Err(EngineError::invalid("max_nodes must be greater than 0"));
        }
        let center = self
            .store
            .get_node(center_node_id)
            .await?
            .ok_or_else(|| EngineError::node_not_found(center_node_id))?;
        let graph_id = center.graph_id;

        let mut nodes: Vec<KnowledgeNode> = vec![center];
        let mut discovered: HashSet<Uuid> = HashSet::from([center_node_id]);
        let mut queue: VecDeque<(Uuid, usize)> = VecDeque::from([(center_node_id, 0)]);
        let mut truncated = false;

        'expand: while let Some((current, hops)) = queue.pop_front() {
            ensure_active(cancel)?;
            if hops >= depth {
                continue;
            }
            for (neighbor, relation_id) in self.learning_neighbors(current, graph_id).await? {
                if discovered.contains(&neighbor) {
                    continue;
                }
                if discovered.len() >= max_nodes {
                    truncated = true;
                    break 'expand;
                }
                let node = self
                    .store
                    .get_node(neighbor)
                    .await?
                    .filter(|n| n.graph_id == graph_id)
                    .ok_or_else(|| {
                        EngineError::inconsistent(format!(
                            "relation {} references node {} outside graph {}",
                            relation_id, neighbor, graph_id
                        ))
                    })?;
                discovered.insert(neighbor);
                nodes.push(node);
                queue.push_back((neighbor, hops + 1));
            }
        }

        // Induced subgraph, deduplicated by (source, target, type).
        let mut relations: Vec<KnowledgeRelation> = Vec::new();
        let mut seen: HashSet<(Uuid, Uuid, RelationType)> = HashSet::new();
        for node in &nodes {
            ensure_active(cancel)?;
            for rel in self.store.get_relations_from(node.id).await? {
                if rel.graph_id != graph_id || !discovered.contains(&rel.target_id) {
                    continue;
                }
                if seen.insert((rel.source_id, rel.target_id, rel.relation_type)) {
                    relations.push(rel);
                }
            }
        }

        let mut notes = Vec::new();
        if truncated {
            notes.push(format!(
                "expansion stopped at {} nodes before reaching depth {}",
                max_nodes, depth
            ));
        }

        tracing::debug!(
            center = %center_node_id,
            nodes = nodes.len(),
            relations = relations.len(),
            truncated,
            "Extracted concept map"
        );

        Ok(ConceptMap {
            graph_id,
            center_node_id,
            depth,
            nodes,
            relations,
            truncated,
            notes,
        })
    }

    /// Neighbors through learning relations in both directions, sorted by id.
    async fn learning_neighbors(&self, node_id: Uuid, graph_id: Uuid) -> Result<Vec<(Uuid, Uuid)>> {
        let mut out = Vec::new();
        let outgoing = self.store.get_relations_from(node_id).await?;
        let incoming = self.store.get_relations_to(node_id).await?;
        for rel in outgoing.iter().chain(incoming.iter()) {
            if rel.graph_id != graph_id || !rel.relation_type.is_learning_edge() {
                continue;
            }
            if let Some(other) = rel.other_end(node_id) {
                if other != node_id {
                    out.push((other, rel.id));
                }
            }
        }
        out.sort();
        out.dedup_by_key(|(id, _)| *id);
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================

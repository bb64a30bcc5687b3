//! Store → petgraph extraction.
//!
//! Loads one knowledge graph through the [`GraphStore`] port into a
//! [`KnowledgeGraphView`]. Extraction performs three bulk reads: the graph
//! header, its nodes and its relations.
//!
//! Relations whose endpoints are missing, or belong to another graph, are
//! not added as edges. They are collected in `KnowledgeGraphView::dangling`
//! so the validator can report them while the other analyzers refuse the
//! graph as inconsistent.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ensure_active;
use super::models::KnowledgeGraphView;
use crate::error::{EngineError, Result};
use crate::store::GraphStore;

/// Extracts knowledge graphs via the `GraphStore` trait.
pub struct GraphExtractor {
    store: Arc<dyn GraphStore>,
}

impl GraphExtractor {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Extract a graph, keeping dangling relations aside.
    pub async fn extract(&self, graph_id: Uuid, cancel: &CancellationToken) -> Result<KnowledgeGraphView> {
        self.store
            .get_graph(graph_id)
            .await?
            .ok_or_else(|| EngineError::graph_not_found(graph_id))?;
        ensure_active(cancel)?;

        let nodes = self.store.list_nodes(graph_id).await?;
        ensure_active(cancel)?;
        let relations = self.store.list_relations(graph_id).await?;
        ensure_active(cancel)?;

        let mut view = KnowledgeGraphView::with_capacity(graph_id, nodes.len(), relations.len());
        for node in nodes {
            view.add_node(node);
        }

        for (i, relation) in relations.into_iter().enumerate() {
            if i % 1024 == 0 {
                ensure_active(cancel)?;
            }
            let same_graph = [relation.source_id, relation.target_id]
                .iter()
                .all(|id| view.get_index(*id).is_some());
            if !same_graph || relation.graph_id != graph_id {
                view.dangling.push(relation);
                continue;
            }
            view.add_relation(relation);
        }

        if !view.dangling.is_empty() {
            tracing::warn!(
                graph_id = %graph_id,
                dangling = view.dangling.len(),
                "Graph has relations with unresolved endpoints"
            );
        }
        tracing::debug!(
            graph_id = %graph_id,
            nodes = view.node_count(),
            edges = view.edge_count(),
            "Extracted knowledge graph"
        );
        Ok(view)
    }

    /// Extract a graph and fail with `Inconsistent` if any relation dangles.
    pub async fn extract_consistent(
        &self,
        graph_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<KnowledgeGraphView> {
        let view = self.extract(graph_id, cancel).await?;
        if let Some(first) = view.dangling.first() {
            return Err(EngineError::inconsistent(format!(
                "graph {}: {} relation(s) with unresolved endpoints (first: {} {} -> {})",
                graph_id,
                view.dangling.len(),
                first.id,
                first.source_id,
                first.target_id
            )));
        }
        Ok(view)
    }
}

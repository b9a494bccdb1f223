use crate::dsl::{
    FusionRequest, KeywordHopRequest, QueryValidationError, TraversalRequest, VectorSearchRequest,
};
use crate::fusion::{fuse, round4, Candidate, FusedHit};
use hybridgraph_core::config::FusionDefaults;
use hybridgraph_core::error::{CodedError, ErrorCode};
use hybridgraph_core::metadata::{Metadata, MetadataValue};
use hybridgraph_core::model::{Edge, Node, NodeId};
use hybridgraph_core::similarity::SimilarityIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use storage::{Direction, Repository, StoreError, TraversedNode};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<QueryValidationError> for QueryError {
    fn from(value: QueryValidationError) -> Self {
        QueryError::InvalidQuery(value.to_string())
    }
}

impl CodedError for QueryError {
    fn error_code(&self) -> ErrorCode {
        match self {
            QueryError::InvalidQuery(_) => ErrorCode::InvalidArgument,
            QueryError::Store(e) => e.error_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: NodeId,
    pub vector_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResponse {
    pub query_text: String,
    pub results: Vec<VectorHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResponse {
    pub query_text: String,
    pub vector_weight: f64,
    pub graph_weight: f64,
    pub results: Vec<FusedHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalResponse {
    pub start_id: NodeId,
    pub depth: usize,
    pub nodes: Vec<TraversedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHopResponse {
    pub query_text: String,
    pub depth: usize,
    /// Nodes whose text or metadata contains the keyword, ordered by id.
    pub matching_nodes: Vec<Node>,
    /// Matches plus every node reached from them, in first-seen order.
    pub context_nodes: Vec<Node>,
    /// Edges followed during expansion, one per (source, target, relation).
    pub edges: Vec<Edge>,
}

/// Runs searches against a repository and a similarity index that share
/// the node id space. Query embeddings are computed by the caller.
pub struct QueryEngine {
    repo: Arc<Repository>,
    index: Arc<dyn SimilarityIndex>,
    defaults: FusionDefaults,
}

impl QueryEngine {
    pub fn new(repo: Arc<Repository>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            repo,
            index,
            defaults: FusionDefaults::default(),
        }
    }

    /// Engine backed by a cosine index over the repository's current
    /// embeddings. Later writes are not reflected until [`Self::refresh_index`].
    pub async fn with_store_index(repo: Arc<Repository>) -> Self {
        let index = Arc::new(repo.similarity_index().await);
        Self::new(repo, index)
    }

    pub fn with_defaults(mut self, defaults: FusionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &FusionDefaults {
        &self.defaults
    }

    pub async fn refresh_index(&mut self) {
        self.index = Arc::new(self.repo.similarity_index().await);
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Parse with configured defaults for any field the JSON leaves out.
    pub fn parse_fusion_request(&self, raw: &str) -> Result<FusionRequest, QueryError> {
        let mut value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| QueryError::InvalidQuery(e.to_string()))?;
        if let Some(object) = value.as_object_mut() {
            object
                .entry("vector_weight")
                .or_insert(self.defaults.vector_weight.into());
            object
                .entry("graph_weight")
                .or_insert(self.defaults.graph_weight.into());
            object.entry("top_k").or_insert(self.defaults.top_k.into());
        }
        serde_json::from_value(value).map_err(|e| QueryError::InvalidQuery(e.to_string()))
    }

    pub async fn hybrid_search_json(
        &self,
        raw: &str,
        query_embedding: &[f32],
    ) -> Result<HybridResponse, QueryError> {
        let request = self.parse_fusion_request(raw)?;
        self.hybrid_search(&request, query_embedding).await
    }

    /// Similarity search followed by graph fusion over the candidates.
    pub async fn hybrid_search(
        &self,
        request: &FusionRequest,
        query_embedding: &[f32],
    ) -> Result<HybridResponse, QueryError> {
        request.validate()?;
        let weights = request.weights()?;

        let candidates: Vec<Candidate> = self
            .index
            .search(query_embedding, request.top_k)
            .into_iter()
            .map(|(id, score)| Candidate::new(id, f64::from(score)))
            .collect();

        let results = {
            let graph = self.repo.read().await;
            fuse(&graph, &candidates, weights, request.top_k)
        };

        info!(
            "Hybrid search '{}' fused {} candidates into {} results",
            request.query_text,
            candidates.len(),
            results.len()
        );

        Ok(HybridResponse {
            query_text: request.query_text.clone(),
            vector_weight: request.vector_weight,
            graph_weight: request.graph_weight,
            results,
        })
    }

    pub async fn vector_search(
        &self,
        request: &VectorSearchRequest,
        query_embedding: &[f32],
    ) -> Result<VectorSearchResponse, QueryError> {
        request.validate()?;

        let results: Vec<VectorHit> = match &request.metadata_filter {
            None => self
                .index
                .search(query_embedding, request.top_k)
                .into_iter()
                .map(|(id, score)| vector_hit(id, score))
                .collect(),
            Some(filter) => {
                let graph = self.repo.read().await;
                let k = graph.node_count().max(request.top_k);
                self.index
                    .search(query_embedding, k)
                    .into_iter()
                    .filter(|(id, _)| {
                        graph
                            .get_node(id)
                            .is_ok_and(|node| matches_filter(node, filter))
                    })
                    .take(request.top_k)
                    .map(|(id, score)| vector_hit(id, score))
                    .collect()
            }
        };

        debug!(
            "Vector search '{}' returned {} results",
            request.query_text,
            results.len()
        );

        Ok(VectorSearchResponse {
            query_text: request.query_text.clone(),
            results,
        })
    }

    pub async fn traverse(&self, request: &TraversalRequest) -> Result<TraversalResponse, QueryError> {
        request.validate()?;
        let nodes = self
            .repo
            .traverse(
                &request.start_id,
                request.depth,
                request.direction,
                request.type_filter.as_deref(),
            )
            .await?;

        Ok(TraversalResponse {
            start_id: request.start_id.clone(),
            depth: request.depth,
            nodes,
        })
    }

    /// Case-insensitive keyword lookup followed by an undirected expansion
    /// of `depth` hops around every match.
    pub async fn keyword_hop_search(
        &self,
        request: &KeywordHopRequest,
    ) -> Result<KeywordHopResponse, QueryError> {
        request.validate()?;
        let needle = request.query_text.to_lowercase();
        let graph = self.repo.read().await;

        let mut matching: Vec<&Node> = graph
            .nodes()
            .filter(|node| matches_keyword(node, &needle))
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));

        let mut seen_nodes: HashSet<&str> = HashSet::new();
        let mut context_ids: Vec<&str> = Vec::new();
        let mut seen_edges: HashSet<(&str, &str, &str)> = HashSet::new();
        let mut edges: Vec<Edge> = Vec::new();

        for start in &matching {
            let reached =
                storage::traverse(&graph, &start.id, request.depth, Direction::Both, None)?;
            for visited in &reached {
                let id = graph.get_node(&visited.id)?.id.as_str();
                if seen_nodes.insert(id) {
                    context_ids.push(id);
                }
                if visited.hop >= request.depth {
                    continue;
                }
                for (edge, _) in graph.adjacent(id, Direction::Both) {
                    let signature = (
                        edge.source.as_str(),
                        edge.target.as_str(),
                        edge.relation.as_str(),
                    );
                    if seen_edges.insert(signature) {
                        edges.push(edge.clone());
                    }
                }
            }
        }

        let context_nodes = context_ids
            .into_iter()
            .map(|id| graph.get_node(id).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Keyword hop search '{}' matched {} nodes, {} in context",
            request.query_text,
            matching.len(),
            context_nodes.len()
        );

        Ok(KeywordHopResponse {
            query_text: request.query_text.clone(),
            depth: request.depth,
            matching_nodes: matching.into_iter().cloned().collect(),
            context_nodes,
            edges,
        })
    }
}

fn matches_keyword(node: &Node, needle: &str) -> bool {
    node.text.to_lowercase().contains(needle)
        || node.metadata.values().any(|value| match value {
            MetadataValue::Text(text) => text.to_lowercase().contains(needle),
            MetadataValue::Bool(flag) => flag.to_string().contains(needle),
            _ => false,
        })
}

fn vector_hit(id: NodeId, score: f32) -> VectorHit {
    VectorHit {
        id,
        vector_score: round4(f64::from(score)),
    }
}

fn matches_filter(node: &Node, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| node.metadata.get(key) == Some(expected))
}

use crate::dsl::QueryValidationError;
use hybridgraph_core::config::FusionDefaults;
use hybridgraph_core::model::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use storage::{Direction, GraphStore};

/// Expansion stops this many hops away from the nearest seed.
pub const MAX_EXPANSION_HOPS: usize = 2;

/// A ranked hit from the similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: NodeId,
    pub similarity: f64,
}

impl Candidate {
    pub fn new(id: impl Into<NodeId>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            similarity,
        }
    }
}

/// Non-negative, finite blend weights. Their sum is not normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    vector: f64,
    graph: f64,
}

impl FusionWeights {
    pub fn new(vector: f64, graph: f64) -> Result<Self, QueryValidationError> {
        check_weight("vector_weight", vector)?;
        check_weight("graph_weight", graph)?;
        Ok(Self { vector, graph })
    }

    pub fn vector(&self) -> f64 {
        self.vector
    }

    pub fn graph(&self) -> f64 {
        self.graph
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        let defaults = FusionDefaults::default();
        Self {
            vector: defaults.vector_weight,
            graph: defaults.graph_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub id: NodeId,
    pub vector_score: f64,
    pub graph_score: f64,
    pub final_score: f64,
    /// Distance to the nearest seed; `None` when the node was never reached.
    pub hop: Option<usize>,
}

/// Connectivity score for a node `hop` edges from the nearest seed.
pub fn hop_score(hop: usize) -> Option<f64> {
    match hop {
        0 | 1 => Some(1.0),
        2 => Some(0.5),
        _ => None,
    }
}

/// Minimum outgoing-edge distance from any seed, up to [`MAX_EXPANSION_HOPS`].
/// Seeds missing from the graph are ignored.
///
/// Only outgoing edges are followed: a seed lends proximity to what it points
/// at, not to what points at it. The hop buckets of [`hop_score`] are applied
/// to these directed distances. Undirected proximity is available through
/// [`storage::compute_scores`].
pub fn graph_hops<'a>(
    graph: &GraphStore,
    seeds: impl IntoIterator<Item = &'a str>,
) -> HashMap<NodeId, usize> {
    let mut hops: HashMap<NodeId, usize> = HashMap::new();
    let mut queue = VecDeque::new();

    for seed in seeds {
        if graph.contains_node(seed) && !hops.contains_key(seed) {
            hops.insert(seed.to_string(), 0);
            queue.push_back((seed.to_string(), 0));
        }
    }

    while let Some((current, hop)) = queue.pop_front() {
        if hop >= MAX_EXPANSION_HOPS {
            continue;
        }
        for (_, neighbor) in graph.adjacent(&current, Direction::Out) {
            if !hops.contains_key(neighbor) {
                hops.insert(neighbor.to_string(), hop + 1);
                queue.push_back((neighbor.to_string(), hop + 1));
            }
        }
    }

    hops
}

/// Blend similarity with graph proximity and keep the best `top_k`.
///
/// Every candidate and every node reachable from a candidate is scored as
/// `similarity * w_vector + hop_score * w_graph`, with missing components
/// counted as zero. Scores are rounded to four decimals; ties are broken by
/// id. Duplicate candidates keep their highest similarity.
pub fn fuse(
    graph: &GraphStore,
    candidates: &[Candidate],
    weights: FusionWeights,
    top_k: usize,
) -> Vec<FusedHit> {
    let mut similarity: HashMap<&str, f64> = HashMap::new();
    for candidate in candidates {
        similarity
            .entry(candidate.id.as_str())
            .and_modify(|s| *s = s.max(candidate.similarity))
            .or_insert(candidate.similarity);
    }

    let hops = graph_hops(graph, similarity.keys().copied());

    let mut ids: Vec<&str> = similarity.keys().copied().collect();
    ids.extend(
        hops.keys()
            .map(String::as_str)
            .filter(|id| !similarity.contains_key(id)),
    );

    let mut hits: Vec<FusedHit> = ids
        .into_iter()
        .map(|id| {
            let vector_score = similarity.get(id).copied().unwrap_or(0.0);
            let hop = hops.get(id).copied();
            let graph_score = hop.and_then(hop_score).unwrap_or(0.0);
            let final_score = vector_score * weights.vector + graph_score * weights.graph;
            FusedHit {
                id: id.to_string(),
                vector_score: round4(vector_score),
                graph_score: round4(graph_score),
                final_score: round4(final_score),
                hop,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
    hits
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn check_weight(name: &'static str, value: f64) -> Result<(), QueryValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(QueryValidationError::InvalidWeight(name))
    }
}

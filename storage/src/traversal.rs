use crate::error::StoreError;
use crate::graph::{Direction, GraphStore};
use hybridgraph_core::model::{Edge, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// How a traversed node was reached from the start node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Via {
    Start,
    /// Hop 1: the single edge that admitted the node.
    Edge { relation: String, weight: f64 },
    /// Hop > 1: relations and weights along the first-discovered route.
    Path {
        relations: Vec<String>,
        weights: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversedNode {
    pub id: NodeId,
    pub hop: usize,
    #[serde(flatten)]
    pub via: Via,
}

impl TraversedNode {
    pub fn relations(&self) -> Vec<&str> {
        match &self.via {
            Via::Start => Vec::new(),
            Via::Edge { relation, .. } => vec![relation.as_str()],
            Via::Path { relations, .. } => relations.iter().map(String::as_str).collect(),
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        match &self.via {
            Via::Start => Vec::new(),
            Via::Edge { weight, .. } => vec![*weight],
            Via::Path { weights, .. } => weights.clone(),
        }
    }
}

/// Breadth-first walk from `start` up to `max_depth` hops.
///
/// Each node is admitted once, by the first edge that reaches it, so hop
/// counts are shortest by edge count. `relation_filter` limits which edges
/// may be followed. The start node is returned first at hop 0.
pub fn traverse(
    graph: &GraphStore,
    start: &str,
    max_depth: usize,
    direction: Direction,
    relation_filter: Option<&str>,
) -> Result<Vec<TraversedNode>, StoreError> {
    let start = graph.get_node(start)?.id.as_str();

    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut queue: VecDeque<(&str, Vec<&Edge>)> = VecDeque::from([(start, Vec::new())]);
    let mut out = Vec::new();

    while let Some((current, path)) = queue.pop_front() {
        let hop = path.len();

        if hop < max_depth {
            for (edge, neighbor) in graph.adjacent(current, direction) {
                if relation_filter.is_some_and(|relation| edge.relation != relation) {
                    continue;
                }
                if !visited.insert(neighbor) {
                    continue;
                }
                let mut next = path.clone();
                next.push(edge);
                queue.push_back((neighbor, next));
            }
        }

        out.push(TraversedNode {
            id: current.to_string(),
            hop,
            via: via_for(&path),
        });
    }

    Ok(out)
}

/// Ids of every node within `max_depth` hops, ignoring edge direction.
pub fn reachable(
    graph: &GraphStore,
    start: &str,
    max_depth: usize,
) -> Result<Vec<NodeId>, StoreError> {
    Ok(traverse(graph, start, max_depth, Direction::Both, None)?
        .into_iter()
        .map(|node| node.id)
        .collect())
}

fn via_for(path: &[&Edge]) -> Via {
    match path {
        [] => Via::Start,
        [edge] => Via::Edge {
            relation: edge.relation.clone(),
            weight: edge.weight,
        },
        edges => Via::Path {
            relations: edges.iter().map(|e| e.relation.clone()).collect(),
            weights: edges.iter().map(|e| e.weight).collect(),
        },
    }
}

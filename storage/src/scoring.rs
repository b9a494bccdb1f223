use crate::error::StoreError;
use crate::graph::{Direction, GraphStore};
use hybridgraph_core::model::NodeId;
use std::collections::{HashMap, VecDeque};

/// Score assigned to the node a scoring run starts from.
pub const START_SCORE: f64 = f64::INFINITY;

#[derive(Debug, Clone, Copy)]
struct Best {
    hop: usize,
    weight: f64,
}

impl Best {
    /// Fewer hops wins; on equal hops the heavier path wins.
    fn beaten_by(&self, hop: usize, weight: f64) -> bool {
        hop < self.hop || (hop == self.hop && weight > self.weight)
    }
}

/// Relevance of every node within `max_depth` hops of `start`.
///
/// Edges are walked in both directions and each parallel edge is its own
/// path. Each node keeps its best `(hop, accumulated weight)` pair and scores
/// `weight / hop`; `start` scores [`START_SCORE`].
pub fn compute_scores(
    graph: &GraphStore,
    start: &str,
    max_depth: usize,
) -> Result<HashMap<NodeId, f64>, StoreError> {
    let start = graph.get_node(start)?.id.as_str();

    let mut best: HashMap<&str, Best> = HashMap::from([(start, Best { hop: 0, weight: 0.0 })]);
    let mut queue: VecDeque<(&str, usize, f64)> = VecDeque::from([(start, 0, 0.0)]);

    while let Some((current, hop, weight)) = queue.pop_front() {
        if hop >= max_depth {
            continue;
        }
        // A better path to `current` was found after this entry was queued.
        if best
            .get(current)
            .is_some_and(|b| b.hop < hop || (b.hop == hop && b.weight > weight))
        {
            continue;
        }

        for (edge, neighbor) in graph.adjacent(current, Direction::Both) {
            let next_hop = hop + 1;
            let next_weight = weight + edge.weight;
            let improves = match best.get(neighbor) {
                None => true,
                Some(b) => b.beaten_by(next_hop, next_weight),
            };
            if improves {
                best.insert(
                    neighbor,
                    Best {
                        hop: next_hop,
                        weight: next_weight,
                    },
                );
                queue.push_back((neighbor, next_hop, next_weight));
            }
        }
    }

    Ok(best
        .into_iter()
        .map(|(id, b)| {
            let score = if b.hop == 0 {
                START_SCORE
            } else {
                b.weight / b.hop as f64
            };
            (id.to_string(), score)
        })
        .collect())
}

/// [`compute_scores`] without the start node, highest score first.
pub fn ranked_scores(
    graph: &GraphStore,
    start: &str,
    max_depth: usize,
) -> Result<Vec<(NodeId, f64)>, StoreError> {
    let mut ranked: Vec<(NodeId, f64)> = compute_scores(graph, start, max_depth)?
        .into_iter()
        .filter(|(id, _)| id != start)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(ranked)
}

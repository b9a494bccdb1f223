//! Synthetic graphs for benchmarks and load experiments.

use hybridgraph_core::model::NewNode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storage::{GraphStore, StoreError};

const RELATIONS: [&str; 3] = ["related_to", "cites", "influences"];

/// Shape of a generated graph. The same seed always yields the same graph.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSpec {
    pub nodes: usize,
    pub edges_per_node: usize,
    pub dims: usize,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            nodes: 1_000,
            edges_per_node: 4,
            dims: 32,
            seed: 42,
        }
    }
}

pub fn node_id(index: usize) -> String {
    format!("n{index:06}")
}

/// Components uniform in `[-1, 1)`.
pub fn random_embedding(rng: &mut impl Rng, dims: usize) -> Vec<f32> {
    (0..dims).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Build a graph with a backbone chain plus random forward and backward links.
pub fn build_graph(spec: &SyntheticSpec) -> Result<GraphStore, StoreError> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut graph = GraphStore::new();

    for i in 0..spec.nodes {
        graph.create_node(
            NewNode::new(format!("synthetic node {i}"))
                .with_id(node_id(i))
                .with_metadata("bucket", (i % 10) as i64)
                .with_embedding(random_embedding(&mut rng, spec.dims)),
        )?;
    }

    for i in 0..spec.nodes {
        if i + 1 < spec.nodes {
            graph.create_edge(&node_id(i), &node_id(i + 1), RELATIONS[0], 1.0)?;
        }
        for _ in 1..spec.edges_per_node {
            let target = rng.random_range(0..spec.nodes);
            let relation = RELATIONS[rng.random_range(0..RELATIONS.len())];
            let weight = (rng.random::<f64>() * 100.0).round() / 100.0;
            graph.create_edge(&node_id(i), &node_id(target), relation, weight)?;
        }
    }

    Ok(graph)
}

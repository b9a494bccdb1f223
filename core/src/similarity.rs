use crate::model::NodeId;

/// Nearest-neighbour lookup supplied by the embedding layer.
///
/// Returned ids share the node id space. Scores are opaque to the graph
/// engine; fusion expects them in `[0, 1]`, highest first.
pub trait SimilarityIndex: Send + Sync {
    fn search(&self, query: &[f32], k: usize) -> Vec<(NodeId, f32)>;
}

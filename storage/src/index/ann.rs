use crate::graph::GraphStore;
use hybridgraph_core::model::NodeId;
use hybridgraph_core::similarity::SimilarityIndex;
use std::collections::HashMap;

/// Exact cosine search by linear scan over node embeddings.
#[derive(Debug, Clone, Default)]
pub struct LinearAnnIndex {
    embeddings: HashMap<NodeId, Vec<f32>>,
}

impl LinearAnnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every node of `graph` that carries an embedding.
    pub fn from_store(graph: &GraphStore) -> Self {
        let mut index = Self::new();
        for node in graph.nodes() {
            if let Some(embedding) = &node.embedding {
                index.insert(node.id.clone(), embedding.clone());
            }
        }
        index
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, embedding: Vec<f32>) {
        self.embeddings.insert(id.into(), embedding);
    }

    pub fn delete(&mut self, id: &str) -> bool {
        self.embeddings.remove(id).is_some()
    }

    /// Top-k by cosine similarity, clamped to `[0, 1]`. Embeddings whose
    /// dimension differs from the query are skipped. Equal scores are ordered by id.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(NodeId, f32)> {
        let mut scores: Vec<(NodeId, f32)> = self
            .embeddings
            .iter()
            .filter_map(|(id, emb)| cosine_similarity(query, emb).map(|score| (id.clone(), score)))
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(k);
        scores
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

impl SimilarityIndex for LinearAnnIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<(NodeId, f32)> {
        LinearAnnIndex::search(self, query, k)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    let score = dot / (norm_a * norm_b);
    if score.is_nan() {
        return Some(0.0);
    }
    Some(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgraph_core::model::NewNode;

    #[test]
    fn test_linear_ann_search() {
        let mut index = LinearAnnIndex::new();

        index.insert("x", vec![1.0, 0.0, 0.0]);
        index.insert("y", vec![0.0, 1.0, 0.0]);
        index.insert("z", vec![0.9, 0.1, 0.0]);

        let results = index.search(&[1.0, 0.0, 0.0], 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "x");
        assert_eq!(results[1].0, "z");
    }

    #[test]
    fn test_dimension_mismatch_is_skipped() {
        let mut index = LinearAnnIndex::new();
        index.insert("short", vec![1.0]);
        index.insert("long", vec![1.0, 0.0]);

        let results = index.search(&[1.0, 0.0], 10);
        assert_eq!(results, vec![("long".to_string(), 1.0)]);
    }

    #[test]
    fn test_scores_stay_within_unit_range() {
        let mut index = LinearAnnIndex::new();
        index.insert("opposite", vec![-1.0, 0.0]);
        index.insert("same", vec![3.0, 0.0]);
        index.insert("huge", vec![f32::MAX, f32::MAX]);

        let results = index.search(&[1.0, 0.0], 10);
        assert_eq!(results[0], ("same".to_string(), 1.0));
        for (id, score) in &results {
            assert!((0.0..=1.0).contains(score), "{id} scored {score}");
        }
        let opposite = results.iter().find(|(id, _)| id == "opposite").unwrap();
        assert_eq!(opposite.1, 0.0);
    }

    #[test]
    fn test_linear_ann_delete() {
        let mut index = LinearAnnIndex::new();
        index.insert("x", vec![1.0, 0.0]);

        assert!(index.delete("x"));
        assert!(!index.delete("x"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_from_store_skips_nodes_without_embedding() {
        let mut graph = GraphStore::new();
        graph
            .create_node(NewNode::new("a").with_id("a").with_embedding(vec![0.0, 1.0]))
            .unwrap();
        graph.create_node(NewNode::new("b").with_id("b")).unwrap();

        let index = LinearAnnIndex::from_store(&graph);
        assert_eq!(index.len(), 1);

        let via_trait: &dyn SimilarityIndex = &index;
        assert_eq!(via_trait.search(&[0.0, 2.0], 1)[0].0, "a");
    }
}

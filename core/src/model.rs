use crate::metadata::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NodeId = String;
pub type EdgeId = String;

pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Fresh random identifier. Used for every edge and for nodes created without an explicit id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub relation: String,
    #[serde(default = "default_edge_weight")]
    pub weight: f64,
}

/// Creation request for a node. `id` is optional; a collision with an
/// existing node is rejected rather than silently replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    #[serde(default)]
    pub id: Option<NodeId>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Partial update. Only the supplied fields are applied; `metadata` replaces the whole bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

const fn default_edge_weight() -> f64 {
    DEFAULT_EDGE_WEIGHT
}

impl NewNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Materialize into a [`Node`], generating an id when none was supplied.
    pub fn into_node(self) -> Node {
        Node {
            id: self.id.unwrap_or_else(generate_id),
            text: self.text,
            metadata: self.metadata,
            embedding: self.embedding,
        }
    }
}

impl NodeUpdate {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.metadata.is_none() && self.embedding.is_none()
    }

    pub fn apply_to(self, node: &mut Node) {
        if let Some(text) = self.text {
            node.text = text;
        }
        if let Some(metadata) = self.metadata {
            node.metadata = metadata;
        }
        if let Some(embedding) = self.embedding {
            node.embedding = Some(embedding);
        }
    }
}

impl Edge {
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        relation: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: generate_id(),
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_generates_id_only_when_missing() {
        let generated = NewNode::new("a").into_node();
        assert!(!generated.id.is_empty());

        let explicit = NewNode::new("b").with_id("node-b").into_node();
        assert_eq!(explicit.id, "node-b");
    }

    #[test]
    fn edge_serializes_relation_as_type() {
        let edge = Edge::new("a", "b", "cites", 0.5);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "cites");
        assert_eq!(json["weight"], 0.5);
    }

    #[test]
    fn edge_weight_defaults_to_one() {
        let edge: Edge =
            serde_json::from_str(r#"{"id":"e","source":"a","target":"b","type":"next"}"#).unwrap();
        assert_eq!(edge.weight, DEFAULT_EDGE_WEIGHT);
    }

    #[test]
    fn partial_update_touches_only_supplied_fields() {
        let mut node = NewNode::new("before")
            .with_metadata("k", "v")
            .with_embedding(vec![1.0])
            .into_node();

        NodeUpdate::text("after").apply_to(&mut node);

        assert_eq!(node.text, "after");
        assert_eq!(node.metadata["k"], MetadataValue::from("v"));
        assert_eq!(node.embedding, Some(vec![1.0]));
    }
}

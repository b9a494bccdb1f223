use crate::error::{Endpoint, StoreError};
use crate::snapshot::GraphSnapshot;
use hybridgraph_core::metadata::{Metadata, MetadataValue};
use hybridgraph_core::model::{Edge, EdgeId, GraphStats, NewNode, Node, NodeId, NodeUpdate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Which incident edges a walk may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Out,
    In,
    Both,
}

impl Direction {
    fn follows_outgoing(self) -> bool {
        matches!(self, Direction::Out | Direction::Both)
    }

    fn follows_incoming(self) -> bool {
        matches!(self, Direction::In | Direction::Both)
    }
}

#[derive(Debug, Clone)]
struct EdgeSlot {
    seq: u64,
    edge: Edge,
}

/// In-memory directed multigraph.
///
/// Records are owned by id-keyed maps; adjacency lists hold edge ids in
/// insertion order, which is the order walks visit parallel edges in.
/// All mutation goes through `&mut self`, so callers serialize writers.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, EdgeSlot>,
    edge_order: BTreeMap<u64, EdgeId>,
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    next_seq: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    pub fn create_node(&mut self, new_node: NewNode) -> Result<Node, StoreError> {
        if new_node.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(StoreError::InvalidArgument(
                "node id must not be empty when provided".to_string(),
            ));
        }
        let node = new_node.into_node();
        self.insert_node(node.clone())?;
        Ok(node)
    }

    /// Insert a fully formed node, keeping its id. Used by create, load and replay.
    pub fn insert_node(&mut self, node: Node) -> Result<(), StoreError> {
        validate_embedding(node.embedding.as_deref())?;
        validate_metadata(&node.metadata)?;
        if self.nodes.contains_key(&node.id) {
            return Err(StoreError::DuplicateId(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Result<&Node, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::node_not_found(id))
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> Result<&Node, StoreError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::node_not_found(id))?;
        validate_embedding(update.embedding.as_deref())?;
        if let Some(metadata) = &update.metadata {
            validate_metadata(metadata)?;
        }
        update.apply_to(node);
        Ok(&*node)
    }

    /// Remove a node and every incident edge. Returns the number of edges removed.
    pub fn delete_node(&mut self, id: &str) -> Result<usize, StoreError> {
        if !self.nodes.contains_key(id) {
            return Err(StoreError::node_not_found(id));
        }

        let incident: HashSet<EdgeId> = self
            .outgoing
            .get(id)
            .into_iter()
            .chain(self.incoming.get(id))
            .flatten()
            .cloned()
            .collect();

        for edge_id in &incident {
            self.unlink_edge(edge_id);
        }

        self.outgoing.remove(id);
        self.incoming.remove(id);
        self.nodes.remove(id);
        Ok(incident.len())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn find_nodes_by_metadata(&self, key: &str, value: &MetadataValue) -> Vec<&Node> {
        let mut out: Vec<&Node> = self
            .nodes
            .values()
            .filter(|node| node.metadata.get(key) == Some(value))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    // ---------------------------------------------------------------------
    // Edges
    // ---------------------------------------------------------------------

    pub fn create_edge(
        &mut self,
        source: &str,
        target: &str,
        relation: impl Into<String>,
        weight: f64,
    ) -> Result<Edge, StoreError> {
        let edge = Edge::new(source, target, relation, weight);
        self.insert_edge(edge.clone())?;
        Ok(edge)
    }

    /// Insert a fully formed edge, keeping its id. Endpoints must already exist.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<(), StoreError> {
        validate_weight(edge.weight)?;
        if !self.nodes.contains_key(&edge.source) {
            return Err(StoreError::InvalidReference {
                endpoint: Endpoint::Source,
                id: edge.source,
            });
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(StoreError::InvalidReference {
                endpoint: Endpoint::Target,
                id: edge.target,
            });
        }
        if self.edges.contains_key(&edge.id) {
            return Err(StoreError::DuplicateId(edge.id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .push(edge.id.clone());
        self.edge_order.insert(seq, edge.id.clone());
        self.edges.insert(edge.id.clone(), EdgeSlot { seq, edge });
        Ok(())
    }

    pub fn get_edge(&self, id: &str) -> Result<&Edge, StoreError> {
        self.edges
            .get(id)
            .map(|slot| &slot.edge)
            .ok_or_else(|| StoreError::edge_not_found(id))
    }

    pub fn update_edge(&mut self, id: &str, weight: f64) -> Result<&Edge, StoreError> {
        validate_weight(weight)?;
        let slot = self
            .edges
            .get_mut(id)
            .ok_or_else(|| StoreError::edge_not_found(id))?;
        slot.edge.weight = weight;
        Ok(&slot.edge)
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<Edge, StoreError> {
        self.unlink_edge(id)
            .ok_or_else(|| StoreError::edge_not_found(id))
    }

    /// All edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_order
            .values()
            .filter_map(|id| self.edges.get(id).map(|slot| &slot.edge))
    }

    pub fn find_edges_by_relation(&self, relation: &str) -> Vec<&Edge> {
        self.edges()
            .filter(|edge| edge.relation == relation)
            .collect()
    }

    // ---------------------------------------------------------------------
    // Adjacency
    // ---------------------------------------------------------------------

    /// Incident edges of `id` paired with the node on the other side.
    /// Outgoing edges come first, then incoming ones, each in creation order.
    pub fn adjacent(&self, id: &str, direction: Direction) -> Vec<(&Edge, &str)> {
        let mut out = Vec::new();
        if direction.follows_outgoing() {
            for edge in self.edge_list(self.outgoing.get(id)) {
                out.push((edge, edge.target.as_str()));
            }
        }
        if direction.follows_incoming() {
            for edge in self.edge_list(self.incoming.get(id)) {
                out.push((edge, edge.source.as_str()));
            }
        }
        out
    }

    pub fn edges_of(&self, id: &str, direction: Direction) -> Result<Vec<&Edge>, StoreError> {
        self.get_node(id)?;
        Ok(self
            .adjacent(id, direction)
            .into_iter()
            .map(|(edge, _)| edge)
            .collect())
    }

    /// Distinct neighbour ids in first-seen order.
    pub fn neighbors(&self, id: &str, direction: Direction) -> Result<Vec<&str>, StoreError> {
        self.get_node(id)?;
        let mut seen = HashSet::new();
        Ok(self
            .adjacent(id, direction)
            .into_iter()
            .map(|(_, neighbor)| neighbor)
            .filter(|neighbor| seen.insert(*neighbor))
            .collect())
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    /// Full copy of the graph. Nodes are ordered by id, edges by creation.
    pub fn to_snapshot(&self, lsn: Option<u64>) -> GraphSnapshot {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        GraphSnapshot {
            lsn,
            nodes,
            edges: self.edges().cloned().collect(),
        }
    }

    /// Rebuild a graph from a snapshot, preserving every id. Fails on
    /// duplicate ids or dangling edge endpoints instead of loading partially.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, StoreError> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.insert_node(node)?;
        }
        for edge in snapshot.edges {
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }

    fn edge_list<'a>(&'a self, ids: Option<&'a Vec<EdgeId>>) -> impl Iterator<Item = &'a Edge> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).map(|slot| &slot.edge))
    }

    fn unlink_edge(&mut self, id: &str) -> Option<Edge> {
        let EdgeSlot { seq, edge } = self.edges.remove(id)?;
        self.edge_order.remove(&seq);
        if let Some(ids) = self.outgoing.get_mut(&edge.source) {
            ids.retain(|e| e != id);
        }
        if let Some(ids) = self.incoming.get_mut(&edge.target) {
            ids.retain(|e| e != id);
        }
        Some(edge)
    }
}

fn validate_weight(weight: f64) -> Result<(), StoreError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "edge weight must be a non-negative finite number, got {weight}"
        )))
    }
}

/// Snapshot and log records are JSON, which has no NaN or infinity.
fn validate_embedding(embedding: Option<&[f32]>) -> Result<(), StoreError> {
    match embedding {
        Some(values) if values.iter().any(|v| !v.is_finite()) => Err(StoreError::InvalidArgument(
            "embedding values must be finite".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_metadata(metadata: &Metadata) -> Result<(), StoreError> {
    match metadata.iter().find(|(_, value)| !value.is_finite()) {
        Some((key, _)) => Err(StoreError::InvalidArgument(format!(
            "metadata value for '{key}' must be finite"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;

    fn node(graph: &mut GraphStore, id: &str) {
        graph.create_node(NewNode::new(id).with_id(id)).unwrap();
    }

    #[test]
    fn test_create_then_get_returns_written_fields() {
        let mut graph = GraphStore::new();
        let created = graph
            .create_node(
                NewNode::new("hello")
                    .with_metadata("source", "a.pdf")
                    .with_metadata("page", 2)
                    .with_embedding(vec![0.1, 0.2]),
            )
            .unwrap();

        let fetched = graph.get_node(&created.id).unwrap();
        assert_eq!(fetched, &created);
        assert_eq!(fetched.text, "hello");
        assert_eq!(fetched.metadata["page"], MetadataValue::Int(2));
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let mut graph = GraphStore::new();
        node(&mut graph, "a");
        let err = graph.create_node(NewNode::new("again").with_id("a")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "a"));
        assert_eq!(graph.get_node("a").unwrap().text, "a");
    }

    #[test]
    fn test_empty_explicit_id_rejected() {
        let mut graph = GraphStore::new();
        let err = graph.create_node(NewNode::new("x").with_id("  ")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_edge_requires_existing_endpoints() {
        let mut graph = GraphStore::new();
        node(&mut graph, "a");

        let err = graph.create_edge("a", "ghost", "links", 1.0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidReference { endpoint: Endpoint::Target, ref id } if id == "ghost"
        ));
        let err = graph.create_edge("ghost", "a", "links", 1.0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidReference { endpoint: Endpoint::Source, .. }
        ));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut graph = GraphStore::new();
        node(&mut graph, "a");
        node(&mut graph, "b");
        assert!(graph.create_edge("a", "b", "links", -0.5).is_err());
        assert!(graph.create_edge("a", "b", "links", f64::NAN).is_err());

        let edge = graph.create_edge("a", "b", "links", 0.0).unwrap();
        assert!(graph.update_edge(&edge.id, -1.0).is_err());
        assert_eq!(graph.get_edge(&edge.id).unwrap().weight, 0.0);
    }

    #[test]
    fn test_non_finite_node_values_rejected() {
        let mut graph = GraphStore::new();
        let err = graph
            .create_node(NewNode::new("x").with_embedding(vec![f32::NAN, 1.0]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let err = graph
            .create_node(NewNode::new("x").with_metadata("score", f64::INFINITY))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(graph.is_empty());

        node(&mut graph, "a");
        let update = NodeUpdate::default().with_embedding(vec![f32::NEG_INFINITY]);
        assert!(graph.update_node("a", update).is_err());
        let update = NodeUpdate::default()
            .with_metadata(Metadata::from([("score".to_string(), MetadataValue::Float(f64::NAN))]));
        assert!(graph.update_node("a", update).is_err());

        let stored = graph.get_node("a").unwrap();
        assert_eq!(stored.embedding, None);
        assert!(stored.metadata.is_empty());
    }

    #[test]
    fn test_update_node_applies_only_supplied_fields() {
        let mut graph = GraphStore::new();
        graph
            .create_node(NewNode::new("v1").with_id("a").with_metadata("k", "v"))
            .unwrap();

        let updated = graph
            .update_node("a", NodeUpdate::default().with_embedding(vec![1.0]))
            .unwrap();
        assert_eq!(updated.text, "v1");
        assert_eq!(updated.metadata["k"], MetadataValue::from("v"));
        assert_eq!(updated.embedding, Some(vec![1.0]));

        assert!(matches!(
            graph.update_node("missing", NodeUpdate::text("x")),
            Err(StoreError::NotFound { kind: EntityKind::Node, .. })
        ));
    }

    #[test]
    fn test_delete_node_cascades_and_counts() {
        let mut graph = GraphStore::new();
        for id in ["a", "b", "c"] {
            node(&mut graph, id);
        }
        let e1 = graph.create_edge("a", "b", "links", 1.0).unwrap();
        let e2 = graph.create_edge("c", "a", "links", 1.0).unwrap();
        let e3 = graph.create_edge("a", "a", "self", 1.0).unwrap();
        let keep = graph.create_edge("b", "c", "links", 1.0).unwrap();

        assert_eq!(graph.delete_node("a").unwrap(), 3);

        for id in [&e1.id, &e2.id, &e3.id] {
            assert!(matches!(
                graph.get_edge(id),
                Err(StoreError::NotFound { kind: EntityKind::Edge, .. })
            ));
        }
        assert!(graph.get_edge(&keep.id).is_ok());
        assert_eq!(graph.edges_of("b", Direction::Both).unwrap().len(), 1);
        assert!(graph.delete_node("a").is_err());
    }

    #[test]
    fn test_parallel_edges_keep_distinct_ids() {
        let mut graph = GraphStore::new();
        node(&mut graph, "a");
        node(&mut graph, "b");
        let first = graph.create_edge("a", "b", "cites", 1.0).unwrap();
        let second = graph.create_edge("a", "b", "cites", 2.0).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(graph.neighbors("a", Direction::Out).unwrap(), vec!["b"]);
        assert_eq!(graph.edges_of("a", Direction::Out).unwrap().len(), 2);
    }

    #[test]
    fn test_recreated_edge_gets_new_id() {
        let mut graph = GraphStore::new();
        node(&mut graph, "a");
        node(&mut graph, "b");
        let first = graph.create_edge("a", "b", "cites", 1.0).unwrap();
        graph.delete_edge(&first.id).unwrap();
        let second = graph.create_edge("a", "b", "cites", 1.0).unwrap();
        assert_ne!(first.id, second.id);
        assert!(graph.delete_edge(&first.id).is_err());
    }

    #[test]
    fn test_adjacent_respects_direction() {
        let mut graph = GraphStore::new();
        for id in ["a", "b", "c"] {
            node(&mut graph, id);
        }
        graph.create_edge("a", "b", "out", 1.0).unwrap();
        graph.create_edge("c", "a", "in", 1.0).unwrap();

        let out: Vec<&str> = graph.adjacent("a", Direction::Out).iter().map(|(_, n)| *n).collect();
        let inc: Vec<&str> = graph.adjacent("a", Direction::In).iter().map(|(_, n)| *n).collect();
        let both: Vec<&str> = graph.adjacent("a", Direction::Both).iter().map(|(_, n)| *n).collect();
        assert_eq!(out, vec!["b"]);
        assert_eq!(inc, vec!["c"]);
        assert_eq!(both, vec!["b", "c"]);
    }

    #[test]
    fn test_snapshot_preserves_ids_and_edge_order() {
        let mut graph = GraphStore::new();
        for id in ["a", "b"] {
            node(&mut graph, id);
        }
        let e1 = graph.create_edge("a", "b", "first", 1.0).unwrap();
        let e2 = graph.create_edge("a", "b", "second", 0.5).unwrap();

        let restored = GraphStore::from_snapshot(graph.to_snapshot(None)).unwrap();
        let ids: Vec<&str> = restored.edges().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![e1.id.as_str(), e2.id.as_str()]);
        assert_eq!(restored.stats(), graph.stats());
    }

    #[test]
    fn test_from_snapshot_rejects_dangling_edge() {
        let snapshot = GraphSnapshot {
            lsn: None,
            nodes: vec![NewNode::new("a").with_id("a").into_node()],
            edges: vec![Edge::new("a", "missing", "links", 1.0)],
        };
        assert!(GraphStore::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_find_helpers() {
        let mut graph = GraphStore::new();
        graph
            .create_node(NewNode::new("x").with_id("a").with_metadata("source", "s1"))
            .unwrap();
        graph
            .create_node(NewNode::new("y").with_id("b").with_metadata("source", "s2"))
            .unwrap();
        graph.create_edge("a", "b", "next_chunk", 1.0).unwrap();

        let hits = graph.find_nodes_by_metadata("source", &MetadataValue::from("s2"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
        assert_eq!(graph.find_edges_by_relation("next_chunk").len(), 1);
        assert!(graph.find_edges_by_relation("other").is_empty());

        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }
}

use crate::fusion::FusionWeights;
use hybridgraph_core::config::FusionDefaults;
use hybridgraph_core::metadata::{coerce_json_object, Metadata};
use serde::{Deserialize, Deserializer, Serialize};
use storage::Direction;
use thiserror::Error;

const DEFAULT_DEPTH: usize = 2;
const MAX_TOP_K: usize = 1_000;
const MAX_DEPTH: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("query_text must not be empty")]
    EmptyQuery,
    #[error("top_k must be between 1 and {0}")]
    InvalidTopK(usize),
    #[error("{0} must be a non-negative finite number")]
    InvalidWeight(&'static str),
    #[error("start_id must not be empty")]
    EmptyStartId,
    #[error("depth must be at most {0}")]
    InvalidDepth(usize),
    #[error("type_filter must not be empty when provided")]
    InvalidTypeFilter,
}

/// Hybrid search: similarity ranking blended with graph proximity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FusionRequest {
    pub query_text: String,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_graph_weight")]
    pub graph_weight: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Plain similarity search, optionally restricted to nodes whose metadata
/// contains every key/value pair of `metadata_filter`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VectorSearchRequest {
    pub query_text: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata_filter: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TraversalRequest {
    pub start_id: String,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub type_filter: Option<String>,
}

/// Keyword match over node text and string/boolean metadata, expanded
/// through the graph in both directions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeywordHopRequest {
    pub query_text: String,
    #[serde(default = "default_depth")]
    pub depth: usize,
}

impl FusionRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self::with_defaults(query_text, &FusionDefaults::default())
    }

    /// Request whose unset knobs come from configuration.
    pub fn with_defaults(query_text: impl Into<String>, defaults: &FusionDefaults) -> Self {
        Self {
            query_text: query_text.into(),
            vector_weight: defaults.vector_weight,
            graph_weight: defaults.graph_weight,
            top_k: defaults.top_k,
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.query_text.trim().is_empty() {
            return Err(QueryValidationError::EmptyQuery);
        }
        validate_top_k(self.top_k)?;
        self.weights().map(|_| ())
    }

    pub fn weights(&self) -> Result<FusionWeights, QueryValidationError> {
        FusionWeights::new(self.vector_weight, self.graph_weight)
    }
}

impl VectorSearchRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            top_k: default_top_k(),
            metadata_filter: None,
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.query_text.trim().is_empty() {
            return Err(QueryValidationError::EmptyQuery);
        }
        validate_top_k(self.top_k)
    }
}

impl TraversalRequest {
    pub fn new(start_id: impl Into<String>) -> Self {
        Self {
            start_id: start_id.into(),
            depth: DEFAULT_DEPTH,
            direction: Direction::default(),
            type_filter: None,
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.start_id.trim().is_empty() {
            return Err(QueryValidationError::EmptyStartId);
        }
        if self.depth > MAX_DEPTH {
            return Err(QueryValidationError::InvalidDepth(MAX_DEPTH));
        }
        if self
            .type_filter
            .as_deref()
            .is_some_and(|relation| relation.trim().is_empty())
        {
            return Err(QueryValidationError::InvalidTypeFilter);
        }
        Ok(())
    }
}

impl KeywordHopRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            depth: DEFAULT_DEPTH,
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.query_text.trim().is_empty() {
            return Err(QueryValidationError::EmptyQuery);
        }
        if self.depth > MAX_DEPTH {
            return Err(QueryValidationError::InvalidDepth(MAX_DEPTH));
        }
        Ok(())
    }
}

fn validate_top_k(top_k: usize) -> Result<(), QueryValidationError> {
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(QueryValidationError::InvalidTopK(MAX_TOP_K));
    }
    Ok(())
}

fn lenient_metadata<'de, D>(deserializer: D) -> Result<Option<Metadata>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Map<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(coerce_json_object))
}

fn default_vector_weight() -> f64 {
    FusionDefaults::default().vector_weight
}

fn default_graph_weight() -> f64 {
    FusionDefaults::default().graph_weight
}

fn default_top_k() -> usize {
    FusionDefaults::default().top_k
}

const fn default_depth() -> usize {
    DEFAULT_DEPTH
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgraph_core::metadata::MetadataValue;

    #[test]
    fn test_fusion_defaults() {
        let request = FusionRequest::parse_json(r#"{"query_text": "graph databases"}"#).unwrap();
        assert_eq!(request.vector_weight, 0.6);
        assert_eq!(request.graph_weight, 0.4);
        assert_eq!(request.top_k, 5);
        assert!(request.validate().is_ok());
        assert_eq!(request, FusionRequest::new("graph databases"));
    }

    #[test]
    fn test_fusion_validation() {
        let mut request = FusionRequest::new("  ");
        assert_eq!(request.validate(), Err(QueryValidationError::EmptyQuery));

        request.query_text = "ok".into();
        request.top_k = 0;
        assert_eq!(
            request.validate(),
            Err(QueryValidationError::InvalidTopK(MAX_TOP_K))
        );

        request.top_k = 3;
        request.graph_weight = -1.0;
        assert_eq!(
            request.validate(),
            Err(QueryValidationError::InvalidWeight("graph_weight"))
        );
    }

    #[test]
    fn test_fusion_missing_query_text_is_parse_error() {
        assert!(FusionRequest::parse_json(r#"{"top_k": 3}"#).is_err());
    }

    #[test]
    fn test_with_defaults_uses_configuration() {
        let defaults = FusionDefaults {
            vector_weight: 0.2,
            graph_weight: 0.8,
            top_k: 12,
        };
        let request = FusionRequest::with_defaults("q", &defaults);
        assert_eq!(request.top_k, 12);
        assert_eq!(request.weights().unwrap().graph(), 0.8);
    }

    #[test]
    fn test_traversal_request() {
        let request =
            TraversalRequest::parse_json(r#"{"start_id": "n1", "direction": "both"}"#).unwrap();
        assert_eq!(request.depth, 2);
        assert_eq!(request.direction, Direction::Both);
        assert!(request.validate().is_ok());

        let bad = TraversalRequest {
            type_filter: Some("".into()),
            ..TraversalRequest::new("n1")
        };
        assert_eq!(bad.validate(), Err(QueryValidationError::InvalidTypeFilter));

        let too_deep = TraversalRequest {
            depth: MAX_DEPTH + 1,
            ..TraversalRequest::new("n1")
        };
        assert!(too_deep.validate().is_err());
    }

    #[test]
    fn test_keyword_hop_request() {
        let request = KeywordHopRequest::parse_json(r#"{"query_text": "Rust"}"#).unwrap();
        assert_eq!(request, KeywordHopRequest::new("Rust"));
        assert_eq!(request.depth, 2);
        assert!(request.validate().is_ok());

        assert_eq!(
            KeywordHopRequest::new(" ").validate(),
            Err(QueryValidationError::EmptyQuery)
        );
        let too_deep = KeywordHopRequest {
            depth: MAX_DEPTH + 1,
            ..KeywordHopRequest::new("Rust")
        };
        assert_eq!(
            too_deep.validate(),
            Err(QueryValidationError::InvalidDepth(MAX_DEPTH))
        );
    }

    #[test]
    fn test_vector_request_coerces_filter() {
        let request = VectorSearchRequest::parse_json(
            r#"{"query_text": "q", "metadata_filter": {"lang": "en", "skip": null, "page": 3}}"#,
        )
        .unwrap();
        let filter = request.metadata_filter.unwrap();
        assert_eq!(filter["lang"], MetadataValue::from("en"));
        assert_eq!(filter["page"], MetadataValue::from(3i64));
        assert!(!filter.contains_key("skip"));
    }
}

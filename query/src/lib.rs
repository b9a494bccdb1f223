pub mod dsl;
pub mod engine;
pub mod fusion;

pub use dsl::{
    FusionRequest, KeywordHopRequest, QueryValidationError, TraversalRequest, VectorSearchRequest,
};
pub use engine::{
    HybridResponse, KeywordHopResponse, QueryEngine, QueryError, TraversalResponse, VectorHit,
    VectorSearchResponse,
};
pub use fusion::{fuse, graph_hops, hop_score, Candidate, FusedHit, FusionWeights};

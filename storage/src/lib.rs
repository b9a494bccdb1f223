pub mod error;
pub mod graph;
pub mod index;
pub mod repo;
pub mod scoring;
pub mod snapshot;
pub mod traversal;
pub mod wal;

pub use error::{Endpoint, EntityKind, StoreError};
pub use graph::{Direction, GraphStore};
pub use index::LinearAnnIndex;
pub use repo::Repository;
pub use scoring::{compute_scores, ranked_scores, START_SCORE};
pub use snapshot::{GraphSnapshot, SnapshotError, SnapshotFile};
pub use traversal::{reachable, traverse, TraversedNode, Via};
pub use wal::{Wal, WalEntry, WalError};

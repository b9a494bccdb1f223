use crate::error::StoreError;
use crate::graph::{Direction, GraphStore};
use crate::index::LinearAnnIndex;
use crate::scoring;
use crate::snapshot::{SnapshotError, SnapshotFile};
use crate::traversal::{self, TraversedNode};
use crate::wal::{Wal, WalEntry, WalError};
use hybridgraph_core::config::{
    LoadFailurePolicy, PersistFailurePolicy, PersistMode, StorageConfig,
};
use hybridgraph_core::model::{Edge, GraphStats, NewNode, Node, NodeId, NodeUpdate};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

struct LogState {
    wal: Wal,
    since_compaction: u64,
}

enum Persistence {
    Manual(Option<SnapshotFile>),
    Snapshot(SnapshotFile),
    WriteAhead {
        snapshot: SnapshotFile,
        log: Mutex<LogState>,
    },
}

/// Shared, persistent handle to a [`GraphStore`].
///
/// Reads take the read lock and run concurrently. Mutations take the write
/// lock and keep it until the change has been persisted, so readers never
/// observe state that is not on disk yet.
#[derive(Clone)]
pub struct Repository {
    graph: Arc<RwLock<GraphStore>>,
    persistence: Arc<Persistence>,
    config: Arc<StorageConfig>,
}

impl Repository {
    /// In-memory repository; nothing touches disk.
    pub fn in_memory() -> Self {
        Self {
            graph: Arc::new(RwLock::new(GraphStore::new())),
            persistence: Arc::new(Persistence::Manual(None)),
            config: Arc::new(StorageConfig::in_memory()),
        }
    }

    /// Open a repository, restoring whatever the configured files hold.
    pub async fn open(config: StorageConfig) -> Result<Self, StoreError> {
        let snapshot = config.snapshot_path.as_ref().map(SnapshotFile::new);

        let (graph, persistence) = match config.persist_mode {
            PersistMode::Manual => {
                let graph = load_or_policy(&config, load_snapshot(snapshot.as_ref()).await)?;
                (graph, Persistence::Manual(snapshot))
            }
            PersistMode::Snapshot => {
                let snapshot = snapshot.ok_or_else(|| missing_path("snapshot_path", "snapshot"))?;
                let graph = load_or_policy(&config, load_snapshot(Some(&snapshot)).await)?;
                (graph, Persistence::Snapshot(snapshot))
            }
            PersistMode::WriteAhead => {
                let snapshot =
                    snapshot.ok_or_else(|| missing_path("snapshot_path", "write_ahead"))?;
                let wal_path = config
                    .wal_path
                    .as_ref()
                    .ok_or_else(|| missing_path("wal_path", "write_ahead"))?;
                let mut wal = Wal::open(wal_path).await?;

                let (graph, since_compaction) =
                    match load_with_log(&snapshot, &mut wal).await {
                        Ok(loaded) => loaded,
                        Err(e) => {
                            let graph = load_or_policy(&config, Err(e))?;
                            // The next persisted write rewrites the snapshot
                            // and drops the unreadable log.
                            wal.truncate().await?;
                            (graph, config.compact_after)
                        }
                    };

                let log = Mutex::new(LogState {
                    wal,
                    since_compaction,
                });
                (graph, Persistence::WriteAhead { snapshot, log })
            }
        };

        info!(
            "Repository opened ({:?}) with {} nodes and {} edges",
            config.persist_mode,
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph: Arc::new(RwLock::new(graph)),
            persistence: Arc::new(persistence),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Read view of the whole graph. Holding it blocks writers.
    pub async fn read(&self) -> RwLockReadGuard<'_, GraphStore> {
        self.graph.read().await
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    pub async fn create_node(&self, new_node: NewNode) -> Result<Node, StoreError> {
        self.mutate(|graph| {
            let node = graph.create_node(new_node)?;
            debug!("Created node {}", node.id);
            Ok((node.clone(), WalEntry::CreateNode { node }))
        })
        .await
    }

    pub async fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node, StoreError> {
        if update.is_empty() {
            return self.get_node(id).await;
        }
        self.mutate(|graph| {
            let node = graph.update_node(id, update.clone())?.clone();
            Ok((
                node,
                WalEntry::UpdateNode {
                    id: id.to_string(),
                    update,
                },
            ))
        })
        .await
    }

    /// Delete a node and its incident edges; returns how many edges went with it.
    pub async fn delete_node(&self, id: &str) -> Result<usize, StoreError> {
        self.mutate(|graph| {
            let removed = graph.delete_node(id)?;
            debug!("Deleted node {} and {} incident edges", id, removed);
            Ok((removed, WalEntry::DeleteNode { id: id.to_string() }))
        })
        .await
    }

    pub async fn create_edge(
        &self,
        source: &str,
        target: &str,
        relation: &str,
        weight: f64,
    ) -> Result<Edge, StoreError> {
        self.mutate(|graph| {
            let edge = graph.create_edge(source, target, relation, weight)?;
            debug!("Created edge {} ({} -[{}]-> {})", edge.id, source, relation, target);
            Ok((edge.clone(), WalEntry::CreateEdge { edge }))
        })
        .await
    }

    pub async fn update_edge(&self, id: &str, weight: f64) -> Result<Edge, StoreError> {
        self.mutate(|graph| {
            let edge = graph.update_edge(id, weight)?.clone();
            Ok((
                edge,
                WalEntry::UpdateEdge {
                    id: id.to_string(),
                    weight,
                },
            ))
        })
        .await
    }

    pub async fn delete_edge(&self, id: &str) -> Result<Edge, StoreError> {
        self.mutate(|graph| {
            let edge = graph.delete_edge(id)?;
            Ok((edge, WalEntry::DeleteEdge { id: id.to_string() }))
        })
        .await
    }

    /// Drop every node and edge.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.replace(GraphStore::new()).await
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn get_node(&self, id: &str) -> Result<Node, StoreError> {
        self.graph.read().await.get_node(id).cloned()
    }

    pub async fn get_edge(&self, id: &str) -> Result<Edge, StoreError> {
        self.graph.read().await.get_edge(id).cloned()
    }

    pub async fn edges_of(&self, id: &str, direction: Direction) -> Result<Vec<Edge>, StoreError> {
        let graph = self.graph.read().await;
        Ok(graph.edges_of(id, direction)?.into_iter().cloned().collect())
    }

    pub async fn neighbors(&self, id: &str, direction: Direction) -> Result<Vec<NodeId>, StoreError> {
        let graph = self.graph.read().await;
        Ok(graph
            .neighbors(id, direction)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub async fn traverse(
        &self,
        start: &str,
        max_depth: usize,
        direction: Direction,
        relation_filter: Option<&str>,
    ) -> Result<Vec<TraversedNode>, StoreError> {
        let graph = self.graph.read().await;
        traversal::traverse(&graph, start, max_depth, direction, relation_filter)
    }

    pub async fn compute_scores(
        &self,
        start: &str,
        max_depth: usize,
    ) -> Result<HashMap<NodeId, f64>, StoreError> {
        let graph = self.graph.read().await;
        scoring::compute_scores(&graph, start, max_depth)
    }

    pub async fn stats(&self) -> GraphStats {
        self.graph.read().await.stats()
    }

    /// Cosine index over the current node embeddings.
    pub async fn similarity_index(&self) -> LinearAnnIndex {
        LinearAnnIndex::from_store(&*self.graph.read().await)
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    /// Write the configured snapshot now. In write-ahead mode this also
    /// truncates the log.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        let graph = self.graph.read().await;
        match &*self.persistence {
            Persistence::Manual(None) => Err(StoreError::InvalidArgument(
                "checkpoint requires a snapshot_path".into(),
            )),
            Persistence::Manual(Some(snapshot)) | Persistence::Snapshot(snapshot) => {
                snapshot.write(&graph.to_snapshot(None)).await?;
                info!("Checkpoint written to {}", snapshot.path().display());
                Ok(())
            }
            Persistence::WriteAhead { snapshot, log } => {
                let mut log = log.lock().await;
                compact(snapshot, &mut log, &graph).await
            }
        }
    }

    /// Export the current graph to an arbitrary snapshot file.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let file = SnapshotFile::new(path);
        let graph = self.graph.read().await;
        file.write(&graph.to_snapshot(None)).await?;
        info!(
            "Saved {} nodes and {} edges to {}",
            graph.node_count(),
            graph.edge_count(),
            file.path().display()
        );
        Ok(())
    }

    /// Replace the whole graph with the contents of a snapshot file.
    /// A missing or inconsistent file leaves the current graph untouched.
    pub async fn load_from(&self, path: impl AsRef<Path>) -> Result<GraphStats, StoreError> {
        let file = SnapshotFile::new(path);
        let snapshot = file.read().await?.ok_or_else(|| {
            SnapshotError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("snapshot {} does not exist", file.path().display()),
            ))
        })?;
        let loaded = GraphStore::from_snapshot(snapshot).map_err(inconsistent)?;
        let stats = loaded.stats();
        self.replace(loaded).await?;
        info!(
            "Loaded {} nodes and {} edges from {}",
            stats.nodes,
            stats.edges,
            file.path().display()
        );
        Ok(stats)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn mutate<T, F>(&self, apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut GraphStore) -> Result<(T, WalEntry), StoreError>,
    {
        let mut graph = self.graph.write().await;
        let (out, entry) = apply(&mut graph)?;
        let persisted = self.persist(&graph, entry).await;
        self.handle_persist_result(persisted)?;
        Ok(out)
    }

    async fn replace(&self, replacement: GraphStore) -> Result<(), StoreError> {
        let mut graph = self.graph.write().await;
        *graph = replacement;
        let persisted = match &*self.persistence {
            Persistence::Manual(_) => Ok(()),
            Persistence::Snapshot(snapshot) => snapshot
                .write(&graph.to_snapshot(None))
                .await
                .map_err(StoreError::from),
            Persistence::WriteAhead { snapshot, log } => {
                let mut log = log.lock().await;
                compact(snapshot, &mut log, &graph).await
            }
        };
        self.handle_persist_result(persisted)
    }

    async fn persist(&self, graph: &GraphStore, entry: WalEntry) -> Result<(), StoreError> {
        match &*self.persistence {
            Persistence::Manual(_) => Ok(()),
            Persistence::Snapshot(snapshot) => {
                snapshot.write(&graph.to_snapshot(None)).await?;
                Ok(())
            }
            Persistence::WriteAhead { snapshot, log } => {
                let mut log = log.lock().await;
                let payload = entry.encode()?;
                log.wal.append(&payload).await?;
                log.wal.flush().await?;
                log.since_compaction += 1;

                if log.since_compaction >= self.config.compact_after {
                    compact(snapshot, &mut log, graph).await?;
                }
                Ok(())
            }
        }
    }

    fn handle_persist_result(&self, result: Result<(), StoreError>) -> Result<(), StoreError> {
        let Err(e) = result else {
            return Ok(());
        };
        match self.config.persist_failure {
            PersistFailurePolicy::Propagate => {
                error!("Persisting mutation failed, in-memory state kept: {}", e);
                Err(e)
            }
            PersistFailurePolicy::LogOnly => {
                error!("Persisting mutation failed, continuing: {}", e);
                Ok(())
            }
        }
    }
}

/// Fold the log into a fresh snapshot stamped with the last LSN, then empty it.
async fn compact(
    snapshot: &SnapshotFile,
    log: &mut LogState,
    graph: &GraphStore,
) -> Result<(), StoreError> {
    let lsn = log.wal.current_lsn();
    snapshot.write(&graph.to_snapshot(Some(lsn))).await?;
    log.wal.truncate().await?;
    info!(
        "Compacted {} log records into {} (lsn {})",
        log.since_compaction,
        snapshot.path().display(),
        lsn
    );
    log.since_compaction = 0;
    Ok(())
}

async fn load_snapshot(snapshot: Option<&SnapshotFile>) -> Result<GraphStore, StoreError> {
    let Some(file) = snapshot else {
        return Ok(GraphStore::new());
    };
    match file.read().await? {
        Some(snapshot) => GraphStore::from_snapshot(snapshot).map_err(inconsistent),
        None => Ok(GraphStore::new()),
    }
}

/// Snapshot first, then every log record newer than it.
/// Returns the graph and the number of records replayed.
async fn load_with_log(
    snapshot: &SnapshotFile,
    wal: &mut Wal,
) -> Result<(GraphStore, u64), StoreError> {
    let (mut graph, snapshot_lsn) = match snapshot.read().await? {
        Some(image) => {
            let lsn = image.lsn.unwrap_or(0);
            (GraphStore::from_snapshot(image).map_err(inconsistent)?, lsn)
        }
        None => (GraphStore::new(), 0),
    };

    let mut replayed = 0;
    wal.replay(|lsn, payload| {
        if lsn <= snapshot_lsn {
            return Ok(());
        }
        WalEntry::decode(&payload)?
            .apply(&mut graph)
            .map_err(|e| WalError::CorruptEntry {
                lsn,
                reason: e.to_string(),
            })?;
        replayed += 1;
        Ok(())
    })
    .await?;
    wal.advance_to(snapshot_lsn);

    if replayed > 0 {
        info!("Replayed {} log records after lsn {}", replayed, snapshot_lsn);
    }
    Ok((graph, replayed))
}

fn load_or_policy(
    config: &StorageConfig,
    loaded: Result<GraphStore, StoreError>,
) -> Result<GraphStore, StoreError> {
    match loaded {
        Ok(graph) => Ok(graph),
        Err(e) => match config.load_failure {
            LoadFailurePolicy::Fail => {
                error!("Failed to load graph state: {}", e);
                Err(e)
            }
            LoadFailurePolicy::StartEmpty => {
                warn!(
                    "Failed to load graph state from {:?}, starting with an empty graph; \
                     stored data will be overwritten on the next write: {}",
                    config.snapshot_path, e
                );
                Ok(GraphStore::new())
            }
        },
    }
}

fn inconsistent(e: StoreError) -> StoreError {
    StoreError::Snapshot(SnapshotError::Inconsistent(e.to_string()))
}

fn missing_path(field: &str, mode: &str) -> StoreError {
    StoreError::InvalidArgument(format!("persist_mode {mode} requires {field}"))
}

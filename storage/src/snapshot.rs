use hybridgraph_core::model::{Edge, Node};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// On-disk image of a whole graph.
///
/// `lsn` is the last log record folded into this image; it is absent for
/// snapshots written without a write-ahead log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsn: Option<u64>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A single snapshot file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to `<name>.tmp` next to the target, fsync, then rename over it.
    pub async fn write(&self, snapshot: &GraphSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = snapshot.to_json()?;
        let tmp_path = self.tmp_path();

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Read the snapshot, or `None` when the file does not exist yet.
    pub async fn read(&self) -> Result<Option<GraphSnapshot>, SnapshotError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(GraphSnapshot::from_json(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgraph_core::metadata::Scalar;
    use hybridgraph_core::model::NewNode;
    use tempfile::tempdir;

    fn sample() -> GraphSnapshot {
        let a = NewNode::new("alpha")
            .with_id("a")
            .with_metadata("tags", vec![Scalar::Text("x".into()), Scalar::Text("y".into())])
            .with_embedding(vec![0.5, 0.25])
            .into_node();
        let b = NewNode::new("beta").with_id("b").into_node();
        let edge = Edge::new("a", "b", "cites", 0.5);
        GraphSnapshot {
            lsn: None,
            nodes: vec![a, b],
            edges: vec![edge],
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("nested/graph.json"));

        file.write(&sample()).await.unwrap();
        let loaded = file.read().await.unwrap().unwrap();

        assert_eq!(loaded, sample_with_same_ids(&loaded));
        assert!(!dir.path().join("nested/graph.json.tmp").exists());
    }

    // Edge ids are random, so compare against the loaded edge ids.
    fn sample_with_same_ids(loaded: &GraphSnapshot) -> GraphSnapshot {
        let mut expected = sample();
        expected.edges[0].id = loaded.edges[0].id.clone();
        expected
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("absent.json"));
        assert!(file.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_codec_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = SnapshotFile::new(&path).read().await.unwrap_err();
        assert!(matches!(err, SnapshotError::Codec(_)));
    }

    #[test]
    fn test_json_layout() {
        let json: serde_json::Value =
            serde_json::from_slice(&sample().to_json().unwrap()).unwrap();

        assert!(json.get("lsn").is_none());
        assert_eq!(json["nodes"][0]["id"], "a");
        assert_eq!(json["nodes"][0]["metadata"]["tags"][1], "y");
        assert!(json["nodes"][1].get("embedding").is_none());
        assert_eq!(json["edges"][0]["type"], "cites");
        assert_eq!(json["edges"][0]["source"], "a");
    }

    #[test]
    fn test_external_snapshot_without_lsn_or_metadata() {
        let raw = br#"{"nodes":[{"id":"n1","text":"hello"}],"edges":[]}"#;
        let snapshot = GraphSnapshot::from_json(raw).unwrap();
        assert_eq!(snapshot.lsn, None);
        assert!(snapshot.nodes[0].metadata.is_empty());
    }
}

use crate::error::StoreError;
use crate::graph::GraphStore;
use crc32fast::Hasher;
use hybridgraph_core::error::{CodedError, ErrorCode};
use hybridgraph_core::model::{Edge, EdgeId, Node, NodeId, NodeUpdate};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

const HEADER_LEN: u64 = 8 + 4 + 4;

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Data integrity error (CRC mismatch) at lsn {0}")]
    CrcMismatch(u64),
    #[error("Corrupt entry at lsn {lsn}: {reason}")]
    CorruptEntry { lsn: u64, reason: String },
    #[error("Record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CodedError for WalError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}

/// Append-only log of framed records.
///
/// Frame layout: `[lsn: u64][crc32: u32][len: u32][payload: len bytes]`,
/// big-endian. The CRC covers the payload only.
pub struct Wal {
    path: PathBuf,
    file: BufWriter<File>,
    current_lsn: AtomicU64,
}

impl Wal {
    /// Open (or create) the log at `path`. The LSN counter starts at zero
    /// until [`Wal::replay`] or [`Wal::advance_to`] moves it forward.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: BufWriter::new(file),
            current_lsn: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one frame and return its LSN. Not durable until [`Wal::flush`].
    pub async fn append(&mut self, payload: &[u8]) -> Result<u64, WalError> {
        let len = u32::try_from(payload.len()).map_err(|_| WalError::CorruptEntry {
            lsn: self.current_lsn() + 1,
            reason: format!("payload of {} bytes does not fit a frame", payload.len()),
        })?;
        let lsn = self.current_lsn.fetch_add(1, Ordering::SeqCst) + 1;

        let mut hasher = Hasher::new();
        hasher.update(payload);
        let crc = hasher.finalize();

        self.file.write_u64(lsn).await?;
        self.file.write_u32(crc).await?;
        self.file.write_u32(len).await?;
        self.file.write_all(payload).await?;

        Ok(lsn)
    }

    /// Flush buffered frames and fsync.
    pub async fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        Ok(())
    }

    pub fn current_lsn(&self) -> u64 {
        self.current_lsn.load(Ordering::SeqCst)
    }

    /// Never moves the counter backwards.
    pub fn advance_to(&self, lsn: u64) {
        self.current_lsn.fetch_max(lsn, Ordering::SeqCst);
    }

    /// Read every frame from the start, calling `callback` for each.
    ///
    /// A frame cut short at the end of the file (torn write) is truncated
    /// away. A CRC mismatch on a complete frame is an error. Returns the last
    /// valid LSN; the counter is advanced to it.
    pub async fn replay<F>(&mut self, mut callback: F) -> Result<u64, WalError>
    where
        F: FnMut(u64, Vec<u8>) -> Result<(), WalError>,
    {
        self.file.flush().await?;
        let file = self.file.get_mut();
        file.seek(std::io::SeekFrom::Start(0)).await?;

        let file_len = file.metadata().await?.len();
        let mut last_lsn = 0;
        let mut valid_end_pos = 0;

        loop {
            if valid_end_pos + HEADER_LEN > file_len {
                break;
            }
            let lsn = match file.read_u64().await {
                Ok(v) => v,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };
            let crc = file.read_u32().await?;
            let len = file.read_u32().await? as u64;

            if valid_end_pos + HEADER_LEN + len > file_len {
                break;
            }
            let mut payload = vec![0u8; len as usize];
            match file.read_exact(&mut payload).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Hasher::new();
            hasher.update(&payload);
            if hasher.finalize() != crc {
                return Err(WalError::CrcMismatch(lsn));
            }

            callback(lsn, payload)?;
            last_lsn = lsn;
            valid_end_pos += HEADER_LEN + len;
        }

        if valid_end_pos < file_len {
            file.set_len(valid_end_pos).await?;
            file.sync_all().await?;
        }

        file.seek(std::io::SeekFrom::End(0)).await?;
        self.advance_to(last_lsn);

        Ok(last_lsn)
    }

    /// Drop every frame. The LSN counter keeps counting from where it was.
    pub async fn truncate(&mut self) -> Result<(), WalError> {
        self.file.flush().await?;
        let file = self.file.get_mut();
        file.set_len(0).await?;
        file.sync_all().await?;
        file.seek(std::io::SeekFrom::Start(0)).await?;
        Ok(())
    }
}

/// One logged graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalEntry {
    CreateNode { node: Node },
    UpdateNode { id: NodeId, update: NodeUpdate },
    DeleteNode { id: NodeId },
    CreateEdge { edge: Edge },
    UpdateEdge { id: EdgeId, weight: f64 },
    DeleteEdge { id: EdgeId },
}

impl WalEntry {
    pub fn encode(&self) -> Result<Vec<u8>, WalError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WalError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Re-apply the mutation. Created records keep the ids they were logged with.
    pub fn apply(self, graph: &mut GraphStore) -> Result<(), StoreError> {
        match self {
            WalEntry::CreateNode { node } => graph.insert_node(node),
            WalEntry::UpdateNode { id, update } => graph.update_node(&id, update).map(|_| ()),
            WalEntry::DeleteNode { id } => graph.delete_node(&id).map(|_| ()),
            WalEntry::CreateEdge { edge } => graph.insert_edge(edge),
            WalEntry::UpdateEdge { id, weight } => graph.update_edge(&id, weight).map(|_| ()),
            WalEntry::DeleteEdge { id } => graph.delete_edge(&id).map(|_| ()),
        }
    }
}

//! File-backed history store.
//!
//! Layout inside the store directory:
//! ```text
//! users_history.history     - one line per record
//! posts_history.history
//! ```
//!
//! Each line is `<crc32 as 8 hex digits> <record json>`. Files are
//! append-only; a save is flushed and synced before it is acknowledged.
//! A save timeout only bounds the wait for the write lock: once a line is
//! being written the save runs to completion.
//! Clearing a collection truncates its file. Reading back verifies every
//! checksum and a mismatch is an error, never a skipped line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crc32fast::Hasher;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::errors::{HistoryError, HistoryResult};
use super::metadata::BoxFuture;
use super::record::HistoryRecord;
use super::store::HistoryStore;

const FILE_EXTENSION: &str = "history";

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Append-only, checksummed history files
#[derive(Debug)]
pub struct FileHistoryStore {
    root: PathBuf,
    // Serializes appends and truncations across collections.
    write_lock: Mutex<()>,
}

impl FileHistoryStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl AsRef<Path>) -> HistoryResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            HistoryError::StoreFailed(format!("Failed to create {}: {}", root.display(), e))
        })?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `collection`
    pub fn collection_path(&self, collection: &str) -> Result<PathBuf, String> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !collection.starts_with('.');
        if !valid {
            return Err(format!("invalid history collection name '{}'", collection));
        }
        Ok(self
            .root
            .join(format!("{}.{}", collection, FILE_EXTENSION)))
    }

    /// Re-read every record of `collection`, verifying checksums.
    ///
    /// A missing file is an empty collection.
    pub async fn verify(&self, collection: &str) -> HistoryResult<Vec<HistoryRecord>> {
        let path = self
            .collection_path(collection)
            .map_err(HistoryError::StoreFailed)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::StoreFailed(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        content
            .lines()
            .enumerate()
            .map(|(index, line)| parse_line(line).map_err(|reason| {
                HistoryError::StoreFailed(format!(
                    "{} line {}: {}",
                    path.display(),
                    index + 1,
                    reason
                ))
            }))
            .collect()
    }

    fn encode(&self, collection: &str, record: &HistoryRecord) -> Result<(PathBuf, String), String> {
        let path = self.collection_path(collection)?;
        let json = serde_json::to_string(record).map_err(|e| e.to_string())?;
        let line = format!("{:08x} {}\n", compute_checksum(json.as_bytes()), json);
        Ok((path, line))
    }

    async fn append(&self, collection: &str, record: &HistoryRecord) -> Result<(), String> {
        let (path, line) = self.encode(collection, record)?;

        let _guard = self.write_lock.lock().await;
        write_line(&path, &line).await
    }

    async fn append_within(
        &self,
        collection: &str,
        record: &HistoryRecord,
        limit: Duration,
    ) -> HistoryResult<()> {
        let (path, line) = self
            .encode(collection, record)
            .map_err(HistoryError::StoreFailed)?;

        let _guard = tokio::time::timeout(limit, self.write_lock.lock())
            .await
            .map_err(|_| HistoryError::timeout("save"))?;
        write_line(&path, &line).await.map_err(HistoryError::StoreFailed)
    }

    async fn truncate(&self, collection: &str) -> Result<(), String> {
        let path = self.collection_path(collection)?;

        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to remove {}: {}", path.display(), e)),
        }
    }
}

/// Append one line and sync it; the caller holds the write lock
async fn write_line(path: &Path, line: &str) -> Result<(), String> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;

    file.write_all(line.as_bytes())
        .await
        .map_err(|e| format!("Failed to append to {}: {}", path.display(), e))?;
    file.flush().await.map_err(|e| e.to_string())?;
    file.sync_all().await.map_err(|e| e.to_string())
}

fn parse_line(line: &str) -> Result<HistoryRecord, String> {
    let (checksum, json) = line
        .split_once(' ')
        .ok_or_else(|| "missing checksum separator".to_string())?;
    let expected = u32::from_str_radix(checksum, 16).map_err(|e| format!("bad checksum: {}", e))?;

    let actual = compute_checksum(json.as_bytes());
    if actual != expected {
        return Err(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected, actual
        ));
    }

    serde_json::from_str(json).map_err(|e| format!("invalid record: {}", e))
}

impl HistoryStore for FileHistoryStore {
    fn save<'a>(
        &'a self,
        collection: &'a str,
        record: &'a HistoryRecord,
    ) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(self.append(collection, record))
    }

    fn save_within<'a>(
        &'a self,
        collection: &'a str,
        record: &'a HistoryRecord,
        limit: Duration,
    ) -> BoxFuture<'a, HistoryResult<()>> {
        Box::pin(self.append_within(collection, record, limit))
    }

    fn remove_all<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(self.truncate(collection))
    }
}

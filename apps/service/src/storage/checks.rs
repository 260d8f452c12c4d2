use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;

use crate::monitoring::types::CheckSpec;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("check store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("check record {id} is not valid JSON: {source}")]
    Parse {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize check {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence for check definitions and their last known state
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// Ids of every stored check
    async fn list_check_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Raw stored record, `None` if there is no check with this id
    async fn read_check(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the stored record for `id` as a single atomic write
    async fn write_check(&self, id: &str, spec: &CheckSpec) -> Result<(), StoreError>;
}

/// One `<id>.json` file per check under `<data_dir>/checks`
pub struct FileCheckStore {
    dir: PathBuf,
    staged: AtomicU64,
}

impl FileCheckStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { dir: data_dir.as_ref().join("checks"), staged: AtomicU64::new(0) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Staging file private to a single write, so concurrent writers of one id
    /// never share it
    fn staging_path(&self, id: &str) -> PathBuf {
        let sequence = self.staged.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{id}.json.{}-{sequence}.tmp", std::process::id()))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io { path: path.to_path_buf(), source }
    }
}

#[async_trait]
impl CheckStore for FileCheckStore {
    async fn list_check_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir)(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Self::io_error(&self.dir))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();

        Ok(ids)
    }

    async fn read_check(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.record_path(id);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&path)(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Parse { id: id.to_string(), source })
    }

    async fn write_check(&self, id: &str, spec: &CheckSpec) -> Result<(), StoreError> {
        let contents = serde_json::to_vec(spec)
            .map_err(|source| StoreError::Serialize { id: id.to_string(), source })?;

        fs::create_dir_all(&self.dir).await.map_err(Self::io_error(&self.dir))?;

        // Readers only ever see the old or the new record, never a partial one.
        let path = self.record_path(id);
        let staging = self.staging_path(id);
        let written = match fs::write(&staging, contents).await {
            Ok(()) => fs::rename(&staging, &path).await.map_err(Self::io_error(&path)),
            Err(e) => Err(Self::io_error(&staging)(e)),
        };
        if written.is_err() {
            let _ = fs::remove_file(&staging).await;
        }
        written
    }
}

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::monitoring::types::LogRecord;

const LIVE_EXTENSION: &str = ".log";
const ARCHIVE_EXTENSION: &str = ".gz.b64";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("log {0} is empty, nothing to compress")]
    Empty(String),
    #[error("archive {archive_id} is not valid base64: {source}")]
    Decode {
        archive_id: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Append-only per-check event log with rotation support
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one record to the live log of `check_id`
    async fn append(&self, check_id: &str, record: &LogRecord) -> Result<(), LogError>;

    /// Live logs that hold data worth archiving
    async fn list_rotatable(&self) -> Result<Vec<String>, LogError>;

    /// Write the contents of live log `log_id` into archive `archive_id`
    async fn compress(&self, log_id: &str, archive_id: &str) -> Result<(), LogError>;

    /// Empty the live log `log_id`
    async fn truncate(&self, log_id: &str) -> Result<(), LogError>;

    /// Compress `log_id` into `archive_id` and then truncate it, with no append
    /// landing in between. On error the live log keeps every record and no
    /// archive of it is left behind.
    async fn rotate(&self, log_id: &str, archive_id: &str) -> Result<(), LogError>;
}

/// Logs as `<id>.log` JSON-lines files, archives as base64 gzip `<archive>.gz.b64`
pub struct FileLogSink {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileLogSink {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self { dir: logs_dir.as_ref().to_path_buf(), locks: Mutex::new(HashMap::new()) }
    }

    fn live_path(&self, log_id: &str) -> PathBuf {
        self.dir.join(format!("{log_id}{LIVE_EXTENSION}"))
    }

    fn archive_path(&self, archive_id: &str) -> PathBuf {
        self.dir.join(format!("{archive_id}{ARCHIVE_EXTENSION}"))
    }

    /// Per-log lock so appends and rotation of one file never interleave
    fn lock_for(&self, log_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(log_id.to_string()).or_default())
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LogError + '_ {
        move |source| LogError::Io { path: path.to_path_buf(), source }
    }

    /// Names of live logs, and of archives too when `include_compressed` is set
    pub async fn list(&self, include_compressed: bool) -> Result<Vec<String>, LogError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir)(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Self::io_error(&self.dir))? {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(LIVE_EXTENSION) {
                names.push(stem.to_string());
            } else if include_compressed {
                if let Some(stem) = file_name.strip_suffix(ARCHIVE_EXTENSION) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();

        Ok(names)
    }

    // Callers hold the per-log lock for the helpers below.

    async fn compress_locked(&self, log_id: &str, archive_id: &str) -> Result<(), LogError> {
        let source = self.live_path(log_id);
        let contents = fs::read(&source).await.map_err(Self::io_error(&source))?;
        if contents.is_empty() {
            return Err(LogError::Empty(log_id.to_string()));
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&contents).map_err(Self::io_error(&source))?;
        let compressed = encoder.finish().map_err(Self::io_error(&source))?;

        // Never overwrite an existing archive.
        let destination = self.archive_path(archive_id);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)
            .await
            .map_err(Self::io_error(&destination))?;
        file.write_all(STANDARD.encode(compressed).as_bytes())
            .await
            .map_err(Self::io_error(&destination))?;
        file.flush().await.map_err(Self::io_error(&destination))
    }

    async fn truncate_locked(&self, log_id: &str) -> Result<(), LogError> {
        let path = self.live_path(log_id);
        let file = OpenOptions::new().write(true).open(&path).await.map_err(Self::io_error(&path))?;
        file.set_len(0).await.map_err(Self::io_error(&path))
    }

    /// A log that could not be emptied keeps its records live, so the archive
    /// just written from it is dropped to avoid archiving them twice.
    async fn settle_rotation(
        &self,
        log_id: &str,
        archive_id: &str,
        truncated: Result<(), LogError>,
    ) -> Result<(), LogError> {
        let Err(e) = truncated else {
            return Ok(());
        };

        let archive = self.archive_path(archive_id);
        if let Err(cleanup) = fs::remove_file(&archive).await {
            warn!(log = %log_id, archive = %archive_id, "Failed to remove archive of un-truncated log: {cleanup}");
        }
        Err(e)
    }

    /// Decode an archive back into the JSON lines it was made from
    pub async fn decompress(&self, archive_id: &str) -> Result<String, LogError> {
        let path = self.archive_path(archive_id);
        let encoded = fs::read_to_string(&path).await.map_err(Self::io_error(&path))?;

        let compressed = STANDARD
            .decode(encoded.trim())
            .map_err(|source| LogError::Decode { archive_id: archive_id.to_string(), source })?;

        let mut contents = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut contents)
            .map_err(Self::io_error(&path))?;

        Ok(contents)
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append(&self, check_id: &str, record: &LogRecord) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let lock = self.lock_for(check_id);
        let _guard = lock.lock().await;

        fs::create_dir_all(&self.dir).await.map_err(Self::io_error(&self.dir))?;
        let path = self.live_path(check_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(Self::io_error(&path))?;
        file.write_all(&line).await.map_err(Self::io_error(&path))?;
        file.flush().await.map_err(Self::io_error(&path))
    }

    async fn list_rotatable(&self) -> Result<Vec<String>, LogError> {
        let mut rotatable = Vec::new();
        for log_id in self.list(false).await? {
            let path = self.live_path(&log_id);
            let metadata = fs::metadata(&path).await.map_err(Self::io_error(&path))?;
            if metadata.len() > 0 {
                rotatable.push(log_id);
            }
        }
        Ok(rotatable)
    }

    async fn compress(&self, log_id: &str, archive_id: &str) -> Result<(), LogError> {
        let lock = self.lock_for(log_id);
        let _guard = lock.lock().await;
        self.compress_locked(log_id, archive_id).await
    }

    async fn truncate(&self, log_id: &str) -> Result<(), LogError> {
        let lock = self.lock_for(log_id);
        let _guard = lock.lock().await;
        self.truncate_locked(log_id).await
    }

    async fn rotate(&self, log_id: &str, archive_id: &str) -> Result<(), LogError> {
        let lock = self.lock_for(log_id);
        let _guard = lock.lock().await;

        self.compress_locked(log_id, archive_id).await?;
        let truncated = self.truncate_locked(log_id).await;
        self.settle_rotation(log_id, archive_id, truncated).await
    }
}

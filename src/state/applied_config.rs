//! Applied haproxy config on disk
//!
//! The file is the single record of what haproxy was last told to load. It is
//! overwritten in place and flushed to disk before `write` returns, so a reload
//! signal sent afterwards always sees the new bytes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{SyncError, SyncResult};

/// Config file mode
const CONFIG_FILE_MODE: u32 = 0o644;

/// On-disk applied config
#[derive(Clone, Debug)]
pub struct AppliedConfig {
    path: PathBuf,
}

impl AppliedConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current bytes, `None` when nothing has been written yet
    pub async fn read(&self) -> SyncResult<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SyncError::ConfigRead {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Overwrite the file and sync it
    pub async fn write(&self, config: &[u8]) -> SyncResult<()> {
        let map_err = |source: std::io::Error| SyncError::ConfigWrite {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CONFIG_FILE_MODE)
            .open(&self.path)
            .await
            .map_err(map_err)?;

        file.write_all(config).await.map_err(map_err)?;
        file.sync_all().await.map_err(map_err)?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = config.len(),
            "Applied config written"
        );
        Ok(())
    }
}

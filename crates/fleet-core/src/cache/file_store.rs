//! Remote checksum cache kept as a JSON file on a shared path.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use super::remote::RemoteCacheStore;
use crate::fs::write_atomic;
use crate::types::ChecksumMap;

/// JSON checksum map on a shared filesystem (network mount, CI cache dir).
///
/// Updates are read-merge-write with an atomic rename; concurrent writers
/// from separate runs are not locked against each other.
#[derive(Debug, Clone)]
pub struct FileRemoteStore {
    path: PathBuf,
}

impl FileRemoteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> anyhow::Result<Option<ChecksumMap>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to read checksum cache: {}", self.path.display())
                });
            }
        };
        let map: ChecksumMap = serde_json::from_slice(&bytes).with_context(|| {
            format!("Failed to parse checksum cache: {}", self.path.display())
        })?;
        Ok(Some(map))
    }
}

#[async_trait]
impl RemoteCacheStore for FileRemoteStore {
    async fn fetch(&self) -> anyhow::Result<Option<ChecksumMap>> {
        self.load().await
    }

    async fn update(&self, merge: &ChecksumMap) -> anyhow::Result<()> {
        let mut current = self.load().await?.unwrap_or_default();
        current.merge(merge);

        let bytes =
            serde_json::to_vec_pretty(&current).context("Failed to serialize checksum cache")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .context("Checksum cache write task failed")??;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

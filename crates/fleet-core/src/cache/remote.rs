//! Shared checksum map behind a pluggable store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::CacheWriteError;
use crate::types::ChecksumMap;

/// Backend for the shared checksum map.
///
/// `update` must merge shallowly: entries in `merge` overwrite same-name
/// entries, all other remote entries are preserved.
#[async_trait]
pub trait RemoteCacheStore: Send + Sync {
    /// Current remote map, or `None` if nothing has been stored yet.
    async fn fetch(&self) -> anyhow::Result<Option<ChecksumMap>>;

    async fn update(&self, merge: &ChecksumMap) -> anyhow::Result<()>;

    /// Short label for logs.
    fn describe(&self) -> String {
        "remote cache".to_string()
    }
}

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFetch {
    /// No store is configured.
    Disabled,
    /// The store failed; every function is treated as unknown.
    Unavailable { reason: String },
    Loaded(ChecksumMap),
}

/// Best-effort access to the remote store.
///
/// Nothing here is ever fatal: fetch failures downgrade to
/// [`RemoteFetch::Unavailable`] and update failures come back as a
/// [`CacheWriteError`] for the caller to report.
#[derive(Clone, Default)]
pub struct RemoteCacheSync {
    store: Option<Arc<dyn RemoteCacheStore>>,
}

impl std::fmt::Debug for RemoteCacheSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCacheSync")
            .field("store", &self.store.as_ref().map(|s| s.describe()))
            .finish()
    }
}

impl RemoteCacheSync {
    pub fn new(store: Arc<dyn RemoteCacheStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn fetch(&self) -> RemoteFetch {
        let Some(store) = &self.store else {
            return RemoteFetch::Disabled;
        };

        match store.fetch().await {
            Ok(Some(map)) => {
                info!(store = %store.describe(), entries = map.len(), "remote checksums loaded");
                RemoteFetch::Loaded(map)
            }
            Ok(None) => {
                info!(store = %store.describe(), "remote checksum cache is empty");
                RemoteFetch::Loaded(ChecksumMap::new())
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(store = %store.describe(), error = %reason, "remote checksum cache unavailable");
                RemoteFetch::Unavailable { reason }
            }
        }
    }

    /// Merge `entries` into the remote map.
    ///
    /// Returns the number of entries sent. An empty batch or a disabled store
    /// sends nothing.
    pub async fn update(&self, entries: &ChecksumMap) -> Result<usize, CacheWriteError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        if entries.is_empty() {
            debug!("no remote checksum entries to merge");
            return Ok(0);
        }

        match store.update(entries).await {
            Ok(()) => {
                info!(store = %store.describe(), entries = entries.len(), "remote checksums updated");
                Ok(entries.len())
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(store = %store.describe(), error = %message, "remote checksum update failed");
                Err(CacheWriteError::Remote(message))
            }
        }
    }
}

//! In-process remote cache, for tests and embedding.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::remote::RemoteCacheStore;
use crate::types::ChecksumMap;

#[derive(Debug, Default)]
struct State {
    entries: Option<ChecksumMap>,
    updates: Vec<ChecksumMap>,
    fail_fetch: bool,
    fail_update: bool,
}

/// Remote store that keeps its map in memory and records every update batch.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: ChecksumMap) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                entries: Some(entries),
                ..State::default()
            })),
        }
    }

    /// Make every subsequent fetch fail.
    pub async fn fail_fetches(&self) {
        self.state.lock().await.fail_fetch = true;
    }

    /// Make every subsequent update fail.
    pub async fn fail_updates(&self) {
        self.state.lock().await.fail_update = true;
    }

    pub async fn snapshot(&self) -> ChecksumMap {
        self.state.lock().await.entries.clone().unwrap_or_default()
    }

    /// Every batch passed to `update`, in call order, including failed ones.
    pub async fn updates(&self) -> Vec<ChecksumMap> {
        self.state.lock().await.updates.clone()
    }
}

#[async_trait]
impl RemoteCacheStore for InMemoryRemoteStore {
    async fn fetch(&self) -> anyhow::Result<Option<ChecksumMap>> {
        let state = self.state.lock().await;
        if state.fail_fetch {
            anyhow::bail!("remote cache unreachable");
        }
        Ok(state.entries.clone())
    }

    async fn update(&self, merge: &ChecksumMap) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.updates.push(merge.clone());
        if state.fail_update {
            anyhow::bail!("remote cache rejected update");
        }
        state.entries.get_or_insert_with(ChecksumMap::new).merge(merge);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::StateStore;
use crate::domain::{MonitorRecord, SubscriptionSet};
use crate::{Error, Result};

/// Single JSON document holding the whole subscription set.
///
/// Writes go to a temporary file in the same directory which then replaces
/// the target, so a reader sees either the old or the new document.
pub struct JsonStateStore {
    path: PathBuf,
    /// Last written set; `None` until first touched.
    cache: Mutex<Option<SubscriptionSet>>,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    async fn read_from_disk(&self) -> SubscriptionSet {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no subscription file yet, starting empty");
                return SubscriptionSet::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read subscription file, starting with empty state");
                return SubscriptionSet::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(set) => set,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "subscription file is corrupt, starting with empty state");
                SubscriptionSet::new()
            }
        }
    }

    async fn write_to_disk(&self, set: &SubscriptionSet) -> Result<()> {
        let payload = serde_json::to_vec_pretty(set)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &payload))
            .await
            .map_err(|e| Error::Other(format!("subscription writer panicked: {e}")))?
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(payload)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> SubscriptionSet {
        let mut cache = self.cache.lock().await;
        let set = self.read_from_disk().await;
        *cache = Some(set.clone());
        set
    }

    async fn save(&self, set: &SubscriptionSet) -> Result<()> {
        let mut cache = self.cache.lock().await;
        self.write_to_disk(set).await?;
        *cache = Some(set.clone());
        Ok(())
    }

    async fn put(&self, scope: &str, nickname: &str, record: &MonitorRecord) -> Result<()> {
        let mut cache = self.cache.lock().await;
        // Only a successful write reaches the cache.
        let mut set = match cache.as_ref() {
            Some(set) => set.clone(),
            None => self.read_from_disk().await,
        };
        set.insert(scope, nickname, record.clone());
        self.write_to_disk(&set).await?;
        *cache = Some(set);
        Ok(())
    }

    async fn remove(&self, scope: &str, nickname: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut set = match cache.as_ref() {
            Some(set) => set.clone(),
            None => self.read_from_disk().await,
        };
        set.remove(scope, nickname);
        self.write_to_disk(&set).await?;
        *cache = Some(set);
        Ok(())
    }
}

//! Durable storage of the subscription set.
//!
//! `load` and `save` are total from the caller's point of view: an unreadable
//! store yields an empty set (with a warning), never an error. Per-pair writes
//! let the poll scheduler persist progress as it goes.

mod json;
mod memory;
mod sqlite;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::domain::{MonitorRecord, SubscriptionSet};

/// Keyed record store for subscriptions.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the complete set. Missing or corrupt state loads as empty.
    async fn load(&self) -> SubscriptionSet;

    /// Replace the persisted set atomically.
    async fn save(&self, set: &SubscriptionSet) -> Result<()>;

    /// Insert or replace a single record.
    async fn put(&self, scope: &str, nickname: &str, record: &MonitorRecord) -> Result<()>;

    /// Remove a single record.
    async fn remove(&self, scope: &str, nickname: &str) -> Result<()>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Json,
    Memory,
}

/// Open the configured backend at `path`.
pub async fn open_store(backend: StoreBackend, path: &Path) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match backend {
        StoreBackend::Sqlite => Arc::new(SqliteStateStore::open(path).await?),
        StoreBackend::Json => Arc::new(JsonStateStore::new(path)),
        StoreBackend::Memory => Arc::new(MemoryStateStore::new()),
    };
    Ok(store)
}

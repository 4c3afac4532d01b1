//! The single critical section guarding the subscription set.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::Result;
use crate::domain::{MonitorRecord, SubscriptionSet};
use crate::store::StateStore;

/// Handle shared by the scheduler and the subscription manager.
pub type SharedState = Arc<Mutex<MonitorState>>;

/// In-memory subscription set plus the store it is mirrored to.
///
/// Every mutation goes through `&mut self`, so holding the surrounding lock
/// makes read-modify-write plus persistence one step. Callers must not hold
/// the lock across a network fetch.
pub struct MonitorState {
    set: SubscriptionSet,
    store: Arc<dyn StateStore>,
}

impl MonitorState {
    /// Load the persisted set from `store`.
    pub async fn load(store: Arc<dyn StateStore>) -> Self {
        let set = store.load().await;
        info!(
            records = set.len(),
            scopes = set.scopes().count(),
            "subscription state loaded"
        );
        Self { set, store }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn set(&self) -> &SubscriptionSet {
        &self.set
    }

    pub fn get(&self, scope: &str, nickname: &str) -> Option<&MonitorRecord> {
        self.set.get(scope, nickname)
    }

    /// Persist a record, then insert or replace it in memory. When the store
    /// rejects the write the in-memory set is left unchanged.
    pub async fn put(
        &mut self,
        scope: &str,
        nickname: &str,
        record: MonitorRecord,
    ) -> Result<Option<MonitorRecord>> {
        self.store.put(scope, nickname, &record).await?;
        Ok(self.set.insert(scope, nickname, record))
    }

    /// Persist the removal of a record, then drop it from memory.
    pub async fn remove(&mut self, scope: &str, nickname: &str) -> Result<Option<MonitorRecord>> {
        if self.set.get(scope, nickname).is_none() {
            return Ok(None);
        }
        self.store.remove(scope, nickname).await?;
        Ok(self.set.remove(scope, nickname))
    }

    /// Write the whole set back to the store.
    pub async fn flush(&self) -> Result<()> {
        self.store.save(&self.set).await
    }
}

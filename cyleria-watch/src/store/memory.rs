use async_trait::async_trait;
use parking_lot::Mutex;

use super::StateStore;
use crate::Result;
use crate::domain::{MonitorRecord, SubscriptionSet};

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    set: Mutex<SubscriptionSet>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(set: SubscriptionSet) -> Self {
        Self {
            set: Mutex::new(set),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> SubscriptionSet {
        self.set.lock().clone()
    }

    async fn save(&self, set: &SubscriptionSet) -> Result<()> {
        *self.set.lock() = set.clone();
        Ok(())
    }

    async fn put(&self, scope: &str, nickname: &str, record: &MonitorRecord) -> Result<()> {
        self.set.lock().insert(scope, nickname, record.clone());
        Ok(())
    }

    async fn remove(&self, scope: &str, nickname: &str) -> Result<()> {
        self.set.lock().remove(scope, nickname);
        Ok(())
    }
}

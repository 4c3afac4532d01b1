//! In-process fan-out of alerts produced by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::rules::AlertEvent;

/// An alert together with the subscription that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub scope: String,
    /// Subscription key, not the name as rendered on the page.
    pub nickname: String,
    pub destination: Option<String>,
    pub event: AlertEvent,
    pub timestamp: DateTime<Utc>,
}

impl AlertNotice {
    pub fn new(
        scope: impl Into<String>,
        nickname: impl Into<String>,
        destination: Option<String>,
        event: AlertEvent,
    ) -> Self {
        Self {
            scope: scope.into(),
            nickname: nickname.into(),
            destination,
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcaster for alert notices.
#[derive(Clone)]
pub struct AlertBroadcaster {
    sender: broadcast::Sender<AlertNotice>,
}

impl AlertBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertNotice> {
        self.sender.subscribe()
    }

    /// Publish a notice. Returns the number of receivers reached; having no
    /// receivers is not an error.
    pub fn publish(&self, notice: AlertNotice) -> usize {
        self.sender.send(notice).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AlertBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

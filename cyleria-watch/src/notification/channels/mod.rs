//! Alert delivery channels.
//!
//! - Discord (bot REST API or webhook URL)
//! - Log output

mod discord;

pub use discord::{DiscordConfig, DiscordNotifier};

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::monitor::AlertEvent;

/// Delivery surface for alerts.
///
/// Delivery is fire-and-forget from the scheduler's point of view: an error
/// is logged by the caller and the alert is not retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Deliver `event` to `destination`.
    async fn notify(&self, destination: &str, event: &AlertEvent) -> Result<()>;
}

/// Writes alerts to the log instead of delivering them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, destination: &str, event: &AlertEvent) -> Result<()> {
        info!(
            destination,
            nickname = event.nickname(),
            title = %event.title(),
            "{}",
            event.description()
        );
        Ok(())
    }
}

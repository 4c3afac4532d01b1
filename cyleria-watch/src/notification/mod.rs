//! Alert delivery.

pub mod channels;

pub use channels::{DiscordConfig, DiscordNotifier, LogNotifier, Notifier};

use std::sync::Arc;

use tracing::warn;

use crate::Result;

/// Pick the notifier for a configuration: Discord when a bot token or a
/// webhook destination can be used, otherwise the log.
pub fn build_notifier(config: &DiscordConfig) -> Result<Arc<dyn Notifier>> {
    if config.enabled {
        let notifier = DiscordNotifier::new(config.clone())?;
        if !notifier.has_token() {
            warn!("Discord bot token not set; only webhook destinations will be delivered");
        }
        Ok(Arc::new(notifier))
    } else {
        Ok(Arc::new(LogNotifier))
    }
}

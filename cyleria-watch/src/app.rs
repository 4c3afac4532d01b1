//! Wiring of store, fetcher, notifier, scheduler and subscription commands.

use std::sync::Arc;

use profile_parser::{HttpProfileFetcher, ProfileExtractor, ProfileFetcher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::AppConfig;
use crate::monitor::{MonitorState, PollScheduler, RateLimiterConfig, SharedRateLimiter, SharedState};
use crate::notification::{Notifier, build_notifier};
use crate::store::{StateStore, open_store};
use crate::subscription::SubscriptionManager;
use crate::watchlist::read_watchlist;

pub struct App {
    config: AppConfig,
    state: SharedState,
    subscriptions: SubscriptionManager,
    scheduler: PollScheduler,
}

impl App {
    /// Build from configuration with the real HTTP fetcher, configured store
    /// and notifier.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let store = open_store(config.store.backend, &config.store.path).await?;
        let fetcher = Arc::new(HttpProfileFetcher::new(config.request_timeout())?);
        let notifier = build_notifier(&config.discord)?;
        Ok(Self::with_parts(config, store, fetcher, notifier).await)
    }

    /// Build from explicit collaborators.
    pub async fn with_parts(
        config: AppConfig,
        store: Arc<dyn StateStore>,
        fetcher: Arc<dyn ProfileFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let state = MonitorState::load(store).await.into_shared();
        let rate_limiter = SharedRateLimiter::new(RateLimiterConfig::spacing(config.fetch_delay()));
        let extractor = ProfileExtractor::with_max_death_len(config.monitor.death_max_len);

        let subscriptions =
            SubscriptionManager::new(state.clone(), fetcher.clone(), rate_limiter.clone())
                .with_template(config.source.profile_url_template.clone())
                .with_nickname_case(config.nickname_case)
                .with_extractor(extractor.clone());

        let scheduler = PollScheduler::new(
            state.clone(),
            fetcher,
            notifier,
            rate_limiter,
            config.scheduler_config(),
        )
        .with_extractor(extractor);

        Self {
            config,
            state,
            subscriptions,
            scheduler,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Merge the configured watch-list file into its scope.
    pub async fn merge_watchlist(&self) -> Result<usize> {
        let Some(path) = &self.config.watchlist.path else {
            return Ok(0);
        };
        let nicknames = read_watchlist(path).await?;
        self.subscriptions
            .merge_watchlist(
                &self.config.watchlist.scope,
                nicknames,
                self.config.watchlist.destination.clone(),
            )
            .await
    }

    /// Merge the watch-list, then poll until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        match self.merge_watchlist().await {
            Ok(added) if added > 0 => info!(added, "watch-list nicknames subscribed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to merge watch-list"),
        }

        self.scheduler.run(cancel).await;

        // Per-pair writes already happened; this is a final full flush.
        if let Err(e) = self.state.lock().await.flush().await {
            warn!(error = %e, "failed to flush subscriptions on shutdown");
        }
        Ok(())
    }
}

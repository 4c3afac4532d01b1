//! Poll scheduler.
//!
//! Every `interval` the scheduler walks all subscriptions in stable order,
//! fetches each profile through the shared rate limiter, evaluates the alert
//! rules against the stored record and delivers whatever they produce.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use profile_parser::fetcher::DEFAULT_PROFILE_URL_TEMPLATE;
use profile_parser::{Extraction, ProfileExtractor, ProfileFetcher, lookup};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{AlertBroadcaster, AlertNotice};
use super::rate_limiter::SharedRateLimiter;
use super::rules::{self, DEFAULT_LEVEL_THRESHOLD};
use super::state::SharedState;
use crate::notification::Notifier;

/// Configuration for the poll scheduler.
#[derive(Debug, Clone)]
pub struct PollSchedulerConfig {
    /// Time between the starts of two cycles.
    pub interval: Duration,
    pub level_threshold: u32,
    pub profile_url_template: String,
}

impl Default for PollSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            level_threshold: DEFAULT_LEVEL_THRESHOLD,
            profile_url_template: DEFAULT_PROFILE_URL_TEMPLATE.to_string(),
        }
    }
}

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerPhase {
    #[default]
    Idle,
    Fetching,
    Diffing,
    Notifying,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Fetching => "fetching",
            SchedulerPhase::Diffing => "diffing",
            SchedulerPhase::Notifying => "notifying",
        };
        f.write_str(name)
    }
}

/// Outcome of one pass over all subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pairs for which a fetch was attempted.
    pub checked: usize,
    /// Pairs left untouched: fetch failure, missing character, or removed mid-cycle.
    pub skipped: usize,
    /// Alerts produced.
    pub alerts: usize,
    /// Alerts accepted by the notifier.
    pub delivered: usize,
    /// Cycle stopped early by shutdown.
    pub interrupted: bool,
}

/// The poll scheduler.
pub struct PollScheduler {
    state: SharedState,
    fetcher: Arc<dyn ProfileFetcher>,
    extractor: ProfileExtractor,
    notifier: Arc<dyn Notifier>,
    rate_limiter: SharedRateLimiter,
    broadcaster: AlertBroadcaster,
    phase: watch::Sender<SchedulerPhase>,
    config: PollSchedulerConfig,
}

impl PollScheduler {
    pub fn new(
        state: SharedState,
        fetcher: Arc<dyn ProfileFetcher>,
        notifier: Arc<dyn Notifier>,
        rate_limiter: SharedRateLimiter,
        config: PollSchedulerConfig,
    ) -> Self {
        let (phase, _) = watch::channel(SchedulerPhase::Idle);
        Self {
            state,
            fetcher,
            extractor: ProfileExtractor::default(),
            notifier,
            rate_limiter,
            broadcaster: AlertBroadcaster::new(),
            phase,
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: ProfileExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Watch the scheduler phase.
    pub fn phase(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase.subscribe()
    }

    /// Subscribe to every alert the scheduler produces, delivered or not.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertNotice> {
        self.broadcaster.subscribe()
    }

    pub fn config(&self) -> &PollSchedulerConfig {
        &self.config
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        self.phase.send_replace(phase);
    }

    /// Run cycles every `interval` until `cancel` fires. The first cycle
    /// starts immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold = self.config.level_threshold,
            "poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.run_cycle(&cancel).await;
            if report.interrupted {
                break;
            }
        }

        self.set_phase(SchedulerPhase::Idle);
        info!("poll scheduler stopped");
    }

    /// One pass over every subscription.
    ///
    /// Each pair is fetched without holding the state lock, then evaluated and
    /// persisted under it, and only then notified. A pair whose update cannot
    /// be persisted is not notified. A failure on one pair never affects the
    /// others.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let pairs: Vec<(String, String)> = {
            let state = self.state.lock().await;
            state
                .set()
                .iter()
                .map(|(scope, nickname, _)| (scope.to_string(), nickname.to_string()))
                .collect()
        };

        debug!(pairs = pairs.len(), "poll cycle starting");
        let mut report = CycleReport::default();

        for (scope, nickname) in pairs {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            self.set_phase(SchedulerPhase::Fetching);
            let lookup_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                result = async {
                    self.rate_limiter.acquire().await;
                    lookup(
                        self.fetcher.as_ref(),
                        &self.extractor,
                        &self.config.profile_url_template,
                        &nickname,
                    )
                    .await
                } => result,
            };
            report.checked += 1;

            let snapshot = match lookup_result {
                Ok(Extraction::Found(snapshot)) => snapshot,
                Ok(Extraction::NotFound) => {
                    debug!(scope = %scope, nickname = %nickname, "character not found, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(scope = %scope, nickname = %nickname, error = %e, "profile fetch failed, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            self.set_phase(SchedulerPhase::Diffing);
            let (events, destination) = {
                let mut state = self.state.lock().await;
                let Some(record) = state.get(&scope, &nickname).cloned() else {
                    debug!(scope = %scope, nickname = %nickname, "unsubscribed during fetch, skipping");
                    report.skipped += 1;
                    continue;
                };

                let events = rules::evaluate(&record, &snapshot, self.config.level_threshold);
                let updated = rules::apply(&record, &snapshot);
                if updated != record
                    && let Err(e) = state.put(&scope, &nickname, updated).await
                {
                    // Nothing changed in memory either; the next cycle sees
                    // the same transition and retries.
                    warn!(scope = %scope, nickname = %nickname, error = %e, "failed to persist record, alerts deferred");
                    report.skipped += 1;
                    continue;
                }
                (events, record.destination_channel)
            };

            if events.is_empty() {
                continue;
            }

            self.set_phase(SchedulerPhase::Notifying);
            report.alerts += events.len();
            for event in events {
                self.broadcaster.publish(AlertNotice::new(
                    scope.as_str(),
                    nickname.as_str(),
                    destination.clone(),
                    event.clone(),
                ));

                let Some(destination) = destination.as_deref() else {
                    debug!(scope = %scope, nickname = %nickname, title = %event.title(), "no destination, alert dropped");
                    continue;
                };

                match self.notifier.notify(destination, &event).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => warn!(
                        scope = %scope,
                        nickname = %nickname,
                        channel = self.notifier.channel_type(),
                        error = %e,
                        "failed to deliver alert"
                    ),
                }
            }
        }

        self.set_phase(SchedulerPhase::Idle);
        info!(
            checked = report.checked,
            skipped = report.skipped,
            alerts = report.alerts,
            delivered = report.delivered,
            interrupted = report.interrupted,
            "poll cycle finished"
        );
        report
    }
}

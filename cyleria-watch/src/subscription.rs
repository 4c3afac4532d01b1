//! Subscribe / unsubscribe commands.
//!
//! A new subscription starts from the character's current state, so the
//! first poll cycle after subscribing never alerts on history.

use std::sync::Arc;

use profile_parser::fetcher::DEFAULT_PROFILE_URL_TEMPLATE;
use profile_parser::{Extraction, FetchError, ProfileExtractor, ProfileFetcher, lookup};
use tracing::{debug, info, warn};

use crate::domain::{MonitorRecord, NicknameCase, normalize_nickname};
use crate::monitor::{SharedRateLimiter, SharedState};
use crate::{Error, Result};

pub struct SubscriptionManager {
    state: SharedState,
    fetcher: Arc<dyn ProfileFetcher>,
    extractor: ProfileExtractor,
    rate_limiter: SharedRateLimiter,
    profile_url_template: String,
    nickname_case: NicknameCase,
}

impl SubscriptionManager {
    pub fn new(
        state: SharedState,
        fetcher: Arc<dyn ProfileFetcher>,
        rate_limiter: SharedRateLimiter,
    ) -> Self {
        Self {
            state,
            fetcher,
            extractor: ProfileExtractor::default(),
            rate_limiter,
            profile_url_template: DEFAULT_PROFILE_URL_TEMPLATE.to_string(),
            nickname_case: NicknameCase::default(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.profile_url_template = template.into();
        self
    }

    pub fn with_nickname_case(mut self, case: NicknameCase) -> Self {
        self.nickname_case = case;
        self
    }

    pub fn with_extractor(mut self, extractor: ProfileExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn normalize(&self, nickname: &str) -> String {
        normalize_nickname(nickname, self.nickname_case)
    }

    async fn fetch(&self, nickname: &str) -> std::result::Result<Extraction, FetchError> {
        self.rate_limiter.acquire().await;
        lookup(
            self.fetcher.as_ref(),
            &self.extractor,
            &self.profile_url_template,
            nickname,
        )
        .await
    }

    /// Start monitoring `nickname` in `scope`, or refresh the baseline and
    /// destination of an existing subscription.
    ///
    /// An unreachable or missing profile gives a level 0 / no death baseline.
    pub async fn subscribe(
        &self,
        scope: &str,
        nickname: &str,
        destination: Option<String>,
    ) -> Result<MonitorRecord> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err(Error::validation("scope must not be empty"));
        }
        let nickname = self.normalize(nickname);
        if nickname.is_empty() {
            return Err(Error::validation("nickname must not be empty"));
        }
        let destination = destination
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let before = self.state.lock().await.get(scope, &nickname).cloned();

        let snapshot = match self.fetch(&nickname).await {
            Ok(Extraction::Found(snapshot)) => Some(snapshot),
            Ok(Extraction::NotFound) => {
                warn!(scope, nickname = %nickname, "character not found, subscribing with empty baseline");
                None
            }
            Err(e) => {
                warn!(scope, nickname = %nickname, error = %e, "baseline fetch failed, subscribing with empty baseline");
                None
            }
        };
        let mut state = self.state.lock().await;
        let record = match state.get(scope, &nickname) {
            // A poll cycle stored this pair while the baseline was in flight;
            // its level and death are at least as recent.
            Some(current) if before.as_ref() != Some(current) => {
                debug!(scope, nickname = %nickname, "record changed during baseline fetch, keeping it");
                MonitorRecord::new(current.last_level, current.last_death.clone(), destination)
            }
            _ => MonitorRecord::baseline(snapshot.as_ref(), destination),
        };
        let previous = state.put(scope, &nickname, record.clone()).await?;
        info!(
            scope,
            nickname = %nickname,
            level = record.last_level,
            refreshed = previous.is_some(),
            "subscribed"
        );
        Ok(record)
    }

    /// Stop monitoring. Returns whether a subscription existed.
    pub async fn unsubscribe(&self, scope: &str, nickname: &str) -> Result<bool> {
        let nickname = self.normalize(nickname);
        let mut state = self.state.lock().await;
        let removed = state.remove(scope.trim(), &nickname).await?.is_some();
        if removed {
            info!(scope = scope.trim(), nickname = %nickname, "unsubscribed");
        } else {
            debug!(scope = scope.trim(), nickname = %nickname, "unsubscribe: no such subscription");
        }
        Ok(removed)
    }

    /// Subscriptions of one scope in nickname order.
    pub async fn list(&self, scope: &str) -> Vec<(String, MonitorRecord)> {
        let state = self.state.lock().await;
        state
            .set()
            .scope(scope.trim())
            .map(|(nickname, record)| (nickname.to_string(), record.clone()))
            .collect()
    }

    pub async fn scopes(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.set().scopes().map(str::to_string).collect()
    }

    /// Read-only profile lookup. Touches no subscription state.
    pub async fn query(&self, nickname: &str) -> std::result::Result<Extraction, FetchError> {
        let nickname = normalize_nickname(nickname, NicknameCase::Preserve);
        self.fetch(&nickname).await
    }

    /// Subscribe every nickname not yet present in `scope`. Returns how many
    /// were added.
    pub async fn merge_watchlist<I, S>(
        &self,
        scope: &str,
        nicknames: I,
        destination: Option<String>,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for raw in nicknames {
            let nickname = self.normalize(raw.as_ref());
            if nickname.is_empty() {
                continue;
            }
            let present = self.state.lock().await.get(scope.trim(), &nickname).is_some();
            if present {
                continue;
            }
            self.subscribe(scope, &nickname, destination.clone()).await?;
            added += 1;
        }
        if added > 0 {
            info!(scope, added, "watch-list merged");
        }
        Ok(added)
    }
}

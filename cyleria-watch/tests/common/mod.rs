#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cyleria_watch::app::App;
use cyleria_watch::config::AppConfig;
use cyleria_watch::monitor::AlertEvent;
use cyleria_watch::notification::Notifier;
use cyleria_watch::store::{MemoryStateStore, StateStore};
use parking_lot::Mutex;
use profile_parser::fetcher::DEFAULT_PROFILE_URL_TEMPLATE;
use profile_parser::{FetchError, ProfileFetcher, profile_url};

/// What the fake site answers for one nickname.
#[derive(Debug, Clone)]
pub enum Profile {
    Page {
        level: u32,
        death: Option<(String, String)>,
    },
    Missing,
    Timeout,
}

impl Profile {
    pub fn level(level: u32) -> Self {
        Profile::Page { level, death: None }
    }

    pub fn died(level: u32, date: &str, description: &str) -> Self {
        Profile::Page {
            level,
            death: Some((date.to_string(), description.to_string())),
        }
    }
}

pub fn render_page(nickname: &str, level: u32, death: Option<&(String, String)>) -> String {
    let deaths = match death {
        Some((date, description)) => format!(
            r#"<h3>Ostatnie zgony</h3>
            <table class="table deaths">
              <tr><th>Data</th><th>Opis</th></tr>
              <tr><td>{date}</td><td>{description}</td></tr>
            </table>"#
        ),
        None => "<p>Brak zgonów.</p>".to_string(),
    };
    format!(
        r#"<html><body>
        <div class="d-flex align-items-baseline justify-content-center gap-1">
          <h2 class="text-success">{nickname}</h2>
          <span>({level})</span>
        </div>
        {deaths}
        </body></html>"#
    )
}

/// Serves profiles keyed by the URL the scheduler will request.
#[derive(Default)]
pub struct FakeFetcher {
    profiles: Mutex<HashMap<String, (String, Profile)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `nickname` is both the lookup key and the name rendered on the page.
    pub fn set(&self, nickname: &str, profile: Profile) {
        let url = profile_url(DEFAULT_PROFILE_URL_TEMPLATE, nickname);
        self.profiles
            .lock()
            .insert(url, (nickname.to_string(), profile));
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ProfileFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.lock().push(url.to_string());
        let entry = self.profiles.lock().get(url).cloned();
        match entry {
            Some((nickname, Profile::Page { level, death })) => {
                Ok(render_page(&nickname, level, death.as_ref()))
            }
            Some((_, Profile::Missing)) => {
                Ok("<html><body><p>Character does not exist.</p></body></html>".to_string())
            }
            Some((_, Profile::Timeout)) => Err(FetchError::Timeout),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// Keeps every delivered alert.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, AlertEvent)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::default(),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<(String, AlertEvent)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, destination: &str, event: &AlertEvent) -> cyleria_watch::Result<()> {
        if self.fail {
            return Err(cyleria_watch::Error::notification("channel unavailable"));
        }
        self.sent
            .lock()
            .push((destination.to_string(), event.clone()));
        Ok(())
    }
}

/// Defaults without fetch spacing or a watch-list file.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.monitor.fetch_delay_ms = 0;
    config.watchlist.path = None;
    config
}

pub async fn build_app(
    fetcher: Arc<dyn ProfileFetcher>,
    notifier: Arc<dyn Notifier>,
) -> (App, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::new());
    let app = App::with_parts(test_config(), store.clone(), fetcher, notifier).await;
    (app, store)
}

pub async fn build_app_with_store(
    store: Arc<dyn StateStore>,
    fetcher: Arc<dyn ProfileFetcher>,
    notifier: Arc<dyn Notifier>,
) -> App {
    App::with_parts(test_config(), store, fetcher, notifier).await
}

//! Profile retrieval.
//!
//! The HTTP transport sits behind [`ProfileFetcher`] so callers can swap it
//! for a fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, trace};

use crate::error::FetchError;
use crate::extractor::ProfileExtractor;
use crate::snapshot::Extraction;

/// Default profile URL template. `{name}` is replaced by the encoded nickname.
pub const DEFAULT_PROFILE_URL_TEMPLATE: &str = "https://cyleria.pl/?subtopic=characters&name={name}";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_USER_AGENT: &str = concat!("cyleria-watch/", env!("CARGO_PKG_VERSION"));

/// Retrieves raw profile documents.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Build the profile URL for `nickname` from `template`.
pub fn profile_url(template: &str, nickname: &str) -> String {
    template.replace("{name}", &urlencoding::encode(nickname))
}

/// Client builder preconfigured with the user agent and timeout.
pub fn create_client_builder(timeout: Duration) -> ClientBuilder {
    Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
}

/// [`ProfileFetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProfileFetcher {
    client: Client,
}

impl HttpProfileFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = create_client_builder(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        trace!(url, "fetching profile");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "profile request rejected");
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Fetch and extract the profile of `nickname`.
pub async fn lookup<F>(
    fetcher: &F,
    extractor: &ProfileExtractor,
    template: &str,
    nickname: &str,
) -> Result<Extraction, FetchError>
where
    F: ProfileFetcher + ?Sized,
{
    let url = profile_url(template, nickname);
    let document = fetcher.fetch(&url).await?;
    Ok(extractor.extract(&document, &url))
}

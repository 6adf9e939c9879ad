use crate::scrapers::traits::PageFetcher;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, REFERER, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

pub const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub const BROWSER_ACCEPT_LANGUAGE: &str = "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7";

/// Pick a desktop user agent at random
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Why a page could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {url}")]
    NotFound { url: String },
    #[error("blocked ({status}): {url}")]
    Blocked { url: String, status: u16 },
    #[error("unexpected status {status}: {url}")]
    Status { url: String, status: u16 },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("browser failed: {0}")]
    Browser(String),
}

impl FetchError {
    /// Wait before retry number `attempt + 1`
    fn backoff(&self, retry_delay: Duration, attempt: u32) -> Duration {
        match self {
            FetchError::Blocked { .. } => retry_delay * (attempt + 1) * 2,
            _ => retry_delay * (attempt + 1),
        }
    }
}

/// Retry and timeout settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Plain GET fetcher with user-agent rotation and retry/backoff
pub struct HttpFetcher {
    client: Client,
    options: FetchOptions,
    headers: HeaderMap,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(options.timeout).build()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        Ok(Self { client, options, headers })
    }

    /// Send this referer with every request
    pub fn with_referer(mut self, referer: &'static str) -> Self {
        self.headers.insert(REFERER, HeaderValue::from_static(referer));
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .header(USER_AGENT, random_user_agent())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.text().await?);
        }

        let url = url.to_string();
        Err(match status {
            StatusCode::NOT_FOUND => FetchError::NotFound { url },
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => FetchError::Blocked {
                url,
                status: status.as_u16(),
            },
            _ => FetchError::Status {
                url,
                status: status.as_u16(),
            },
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.options.retries + 1;
        let mut attempt = 0;

        loop {
            debug!("[HTTP] Fetching {} (attempt {}/{})", url, attempt + 1, attempts);

            let err = match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(err @ FetchError::NotFound { .. }) => {
                    warn!("[HTTP] {}", err);
                    return Err(err);
                }
                Err(err) => err,
            };

            if attempt >= self.options.retries {
                warn!("[HTTP] Giving up on {} after {} attempts: {}", url, attempts, err);
                return Err(err);
            }

            let wait = err.backoff(self.options.retry_delay, attempt);
            warn!("[HTTP] {}; retrying in {}ms", err, wait.as_millis());
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

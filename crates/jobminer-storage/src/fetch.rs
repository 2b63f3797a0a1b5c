//! Page fetch collaborators: live HTTP and on-disk fixtures.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};

/// One fetched page. Lives only until the parser has consumed it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub source: String,
    pub url: String,
    pub page_index: u32,
    pub body: String,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub source: String,
    pub page_index: u32,
    /// Set when the request is for one offer's own page rather than a
    /// search result page; `page_index` is then the page that listed it.
    pub offer_id: Option<String>,
}

impl PageParams {
    pub fn new(source: impl Into<String>, page_index: u32) -> Self {
        Self {
            source: source.into(),
            page_index,
            offer_id: None,
        }
    }

    pub fn for_offer(mut self, offer_id: impl Into<String>) -> Self {
        self.offer_id = Some(offer_id.into());
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("page not found: {url}")]
    NotFound { url: String },
    #[error("rate limited while fetching {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        transient: bool,
        message: String,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network { transient: true, .. })
    }
}

/// Maps a non-success status onto the fetch error taxonomy.
pub fn classify_status(status: StatusCode, url: &str, retry_after: Option<Duration>) -> FetchError {
    let url = url.to_string();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::NotFound { url },
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited { url, retry_after },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => FetchError::Network {
            url,
            transient: true,
            message: format!("http status {}", s.as_u16()),
        },
        s => FetchError::Network {
            url,
            transient: false,
            message: format!("http status {}", s.as_u16()),
        },
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        transient: err.is_timeout() || err.is_connect() || err.is_request() || err.is_body(),
        message: err.to_string(),
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Single attempt; retry policy belongs to the caller.
    async fn fetch(&self, url: &str, params: &PageParams) -> Result<RawPage, FetchError>;
}

/// When to try a failed page fetch again. Only transient network failures
/// are retried; the wait doubles per retry up to `ceiling`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub first_delay: Duration,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            first_delay: Duration::from_millis(500),
            ceiling: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            first_delay: Duration::ZERO,
            ceiling: Duration::ZERO,
        }
    }

    /// Wait before retry number `retry` (zero-based) after `err`, or `None`
    /// when the failure should be returned to the caller.
    pub fn delay_before_retry(&self, retry: usize, err: &FetchError) -> Option<Duration> {
        if retry >= self.max_retries || !err.is_transient() {
            return None;
        }
        let mut delay = self.first_delay;
        for _ in 0..retry {
            if delay >= self.ceiling {
                break;
            }
            delay = delay.saturating_mul(2);
        }
        Some(delay.min(self.ceiling))
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Minimum spacing between requests; `None` disables pacing.
    pub request_interval: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            request_interval: Some(Duration::from_millis(1500)),
        }
    }
}

/// Spaces request starts at least `interval` apart and lets a board's
/// `Retry-After` push every later request back.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Waits for this request's slot and reserves the following one.
    pub async fn wait_turn(&self) {
        let wait = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next_slot).max(now);
            *next_slot = slot + self.interval;
            slot - now
        };
        if !wait.is_zero() {
            debug!(?wait, "pacing request");
            tokio::time::sleep(wait).await;
        }
    }

    /// No request starts before `delay` from now has passed.
    pub async fn hold_off(&self, delay: Duration) {
        let mut next_slot = self.next_slot.lock().await;
        *next_slot = (*next_slot).max(Instant::now() + delay);
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    pacer: Arc<RequestPacer>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        let pacer = Arc::new(RequestPacer::new(config.request_interval.unwrap_or(Duration::ZERO)));

        Ok(Self { client, pacer })
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, params: &PageParams) -> Result<RawPage, FetchError> {
        self.pacer.wait_turn().await;

        let span = info_span!(
            "http_fetch",
            source = %params.source,
            page = params.page_index,
            offer = params.offer_id.as_deref(),
            url
        );
        async {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| classify_reqwest_error(&err, url))?;

            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                let err = classify_status(status, &final_url, retry_after(resp.headers()));
                if let FetchError::RateLimited {
                    retry_after: Some(delay),
                    ..
                } = &err
                {
                    self.pacer.hold_off(*delay).await;
                }
                return Err(err);
            }

            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp
                .text()
                .await
                .map_err(|err| classify_reqwest_error(&err, &final_url))?;
            debug!(status = status.as_u16(), bytes = body.len(), "fetched page");

            Ok(RawPage {
                source: params.source.clone(),
                url: final_url,
                page_index: params.page_index,
                body,
                content_type,
                fetched_at: Utc::now(),
            })
        }
        .instrument(span)
        .await
    }
}

/// Serves `fixtures/<source>/page-<n>.<ext>` (and `offer-<id>.html` for offer
/// pages) from disk. A missing page reads as `NotFound`, which ends
/// pagination the same way a live board does.
#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    root: PathBuf,
}

impl FixtureFetcher {
    const EXTENSIONS: [(&'static str, &'static str); 2] =
        [("html", "text/html"), ("json", "application/json")];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_path(&self, source: &str, page_index: u32, extension: &str) -> PathBuf {
        self.root
            .join(source)
            .join(format!("page-{page_index}.{extension}"))
    }

    pub fn offer_path(&self, source: &str, offer_id: &str, extension: &str) -> PathBuf {
        self.root
            .join(source)
            .join(format!("offer-{offer_id}.{extension}"))
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, params: &PageParams) -> Result<RawPage, FetchError> {
        for (extension, content_type) in Self::EXTENSIONS {
            let path = match &params.offer_id {
                Some(offer_id) => self.offer_path(&params.source, offer_id, extension),
                None => self.page_path(&params.source, params.page_index, extension),
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(body) => {
                    debug!(path = %path.display(), "serving fixture page");
                    return Ok(RawPage {
                        source: params.source.clone(),
                        url: url.to_string(),
                        page_index: params.page_index,
                        body,
                        content_type: Some(content_type.to_string()),
                        fetched_at: Utc::now(),
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        transient: false,
                        message: format!("reading {}: {err}", path.display()),
                    })
                }
            }
        }
        Err(FetchError::NotFound {
            url: url.to_string(),
        })
    }
}

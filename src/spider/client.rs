//! Blocking HTTP fetcher with retry/backoff and an injectable transport.
//!
//! The transport seam exists so tests can swap the network for an in-process
//! responder; production code uses [`HttpTransport`] over reqwest.

use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Retry attempts after the initial request, for transport errors and 429.
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Base backoff before a retry; doubled per attempt.
const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(5);
/// Upper bound for a single backoff wait.
const DEFAULT_RETRY_MAX_WAIT: Duration = Duration::from_secs(20);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone;CPU iPhone OS 9_1 like Mac OS X) AppleWebKit/601.1.46 (KHTML, like Gecko)Version/9.0 Mobile/13B143 Safari/601.1 (compatible; Baiduspider-render/2.0;+http://www.baidu.com/search/spider.html)";
const DEFAULT_ACCEPT: &str = "text/html, application/xhtml+xml";
const DEFAULT_ACCEPT_LANGUAGE: &str =
    "zh-CN,zh;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6,mt;q=0.5,ru;q=0.4,de;q=0.3";

/// Errors surfaced by [`Fetcher::get`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: could not reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("HTTP {status} when fetching: {url}")]
    Status { status: u16, url: String },

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A fetched page: status, optional Content-Type, and the raw body.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The wire seam: one GET, no retries. Implemented by [`HttpTransport`] and
/// by the in-process responder used in tests.
pub trait Transport {
    fn get(&self, url: &str) -> Result<FetchResponse, BoxError>;
}

/// Production transport over a blocking reqwest client with the shared
/// default header map.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<FetchResponse, BoxError> {
        let response = self.client.get(url).send()?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes()?.to_vec();
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

/// GET with retries. Transport errors and HTTP 429 are retried up to the
/// configured count with exponential backoff; any other non-200 status fails
/// immediately.
pub struct Fetcher {
    transport: Box<dyn Transport>,
    retry_count: u32,
    retry_wait: Duration,
    retry_max_wait: Duration,
}

impl Fetcher {
    /// Fetcher with the default HTTP transport and retry policy.
    pub fn new() -> Result<Self, FetchError> {
        Self::builder().build()
    }

    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::default()
    }

    /// Fetch one URL. Returns the response only on HTTP 200.
    pub fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.transport.get(url) {
                Ok(response) => {
                    if response.status == 200 {
                        return Ok(response);
                    }
                    if response.status == 429 && attempt < self.retry_count {
                        self.backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Status {
                        status: response.status,
                        url: url.to_string(),
                    });
                }
                Err(source) => {
                    if attempt < self.retry_count {
                        self.backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) {
        let factor = 1u32 << attempt.min(16);
        let wait = self.retry_wait.saturating_mul(factor).min(self.retry_max_wait);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

/// Builder for [`Fetcher`] with optional User-Agent, timeout, retry settings,
/// and transport override.
pub struct FetcherBuilder {
    user_agent: String,
    timeout: Duration,
    retry_count: u32,
    retry_wait: Duration,
    retry_max_wait: Duration,
    transport: Option<Box<dyn Transport>>,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_wait: DEFAULT_RETRY_WAIT,
            retry_max_wait: DEFAULT_RETRY_MAX_WAIT,
            transport: None,
        }
    }
}

impl FetcherBuilder {
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry attempts after the initial request. Default 3.
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n;
        self
    }

    /// Base backoff wait, doubled per attempt. Default 5 s.
    pub fn retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    /// Cap for a single backoff wait. Default 20 s.
    pub fn retry_max_wait(mut self, wait: Duration) -> Self {
        self.retry_max_wait = wait;
        self
    }

    /// Replace the HTTP transport with an in-process one.
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Fetcher, FetchError> {
        let transport = match self.transport {
            Some(t) => t,
            None => Box::new(
                HttpTransport::new(&self.user_agent, self.timeout).map_err(FetchError::Client)?,
            ),
        };
        Ok(Fetcher {
            transport,
            retry_count: self.retry_count,
            retry_wait: self.retry_wait,
            retry_max_wait: self.retry_max_wait,
        })
    }
}

//! Resilient text retrieval for the demand feeds
//!
//! One fetch is a bounded retry loop under a single overall deadline:
//! - up to `max_attempts` attempts, `retry_delay` apart;
//! - a failed attempt before the last is retried, a failed final attempt
//!   becomes `FetchFailure`;
//! - the deadline spans every attempt and every backoff wait; hitting it
//!   aborts the fetch as `FetchTimeout` with no further attempts.
//!
//! The body is decoded with the caller's encoding label, never sniffed.

use crate::config::FetchConfig;
use crate::error::{PowerMapError, Result};
use crate::logging::{StructuredLogger, get_logger};
use encoding_rs::Encoding;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Retrieves decoded text bodies
#[async_trait::async_trait]
pub trait TextFetcher: Send + Sync {
    /// Fetch `url` and decode the body as `encoding`.
    ///
    /// An empty `Ok` body is a valid result; callers decide what it means.
    async fn fetch_text(&self, url: &str, encoding: &str) -> Result<String>;
}

/// Attempt/deadline policy for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub deadline: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            deadline: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Run `attempt` under `policy`.
///
/// `attempt` receives the 1-based attempt number.
pub async fn retry_with_deadline<F, Fut, T>(
    policy: &RetryPolicy,
    logger: &StructuredLogger,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = async {
        let mut n = 0;
        loop {
            n += 1;
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) if n >= policy.max_attempts => {
                    return Err(PowerMapError::fetch_failure(format!(
                        "attempt {}/{}: {}",
                        n, policy.max_attempts, e
                    )));
                }
                Err(e) => {
                    logger.debug(&format!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        n, policy.max_attempts, policy.retry_delay, e
                    ));
                    sleep(policy.retry_delay).await;
                }
            }
        }
    };

    match timeout(policy.deadline, attempts).await {
        Ok(result) => result,
        Err(_) => Err(PowerMapError::fetch_timeout(format!(
            "no response within {:?}",
            policy.deadline
        ))),
    }
}

/// Look up an encoding by WHATWG label (e.g. `shift_jis`, `utf-8`)
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| PowerMapError::encoding(format!("Unknown encoding label '{}'", label)))
}

/// Decode a response body with the given encoding; malformed sequences
/// become U+FFFD. A BOM is only stripped if it matches `encoding`.
pub fn decode_body(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _had_errors) = encoding.decode_with_bom_removal(bytes);
    text.into_owned()
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    logger: StructuredLogger,
}

impl HttpFetcher {
    /// Create a new fetcher from fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            policy: RetryPolicy::from_config(config),
            logger: get_logger("fetcher"),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, url: &reqwest::Url, encoding: &'static Encoding) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        self.logger.trace(&format!("Received {} bytes from {}", bytes.len(), url));
        Ok(decode_body(&bytes, encoding))
    }
}

#[async_trait::async_trait]
impl TextFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str, encoding: &str) -> Result<String> {
        let encoding = resolve_encoding(encoding)?;
        let url = reqwest::Url::parse(url)
            .map_err(|e| PowerMapError::fetch_failure(format!("Invalid URL '{}': {}", url, e)))?;

        self.logger.debug(&format!("Fetching {}", url));
        let url = &url;
        retry_with_deadline(&self.policy, &self.logger, |_| self.attempt(url, encoding)).await
    }
}

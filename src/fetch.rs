//! Network fetching with bounded retries and exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};

/// Source of remote bytes for the orchestrator.
///
/// Implementations make up to `retries + 1` attempts and must return
/// [`Error::Cancelled`] as soon as `cancel` fires.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches the full body of `url`.
    async fn fetch(&self, url: &str, retries: u32, cancel: &CancellationToken) -> Result<Bytes>;
}

/// Returns the delay before retry number `attempt + 1`: `base * 2^attempt`.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `retries` retries are spent.
///
/// The token is checked before every attempt; a cancelled token returns
/// [`Error::Cancelled`] without spending further attempts, and also cuts
/// short an in-flight attempt or backoff sleep.
///
/// # Errors
///
/// Returns the last attempt's error, or [`Error::Cancelled`].
pub async fn retry_with_backoff<T, F, Fut>(
    retries: u32,
    base: Duration,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut index = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            res = attempt(index) => res,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && index < retries => {
                let delay = backoff_delay(base, index);
                log::warn!(
                    "Attempt {}/{} failed: {e}; retrying in {delay:?}",
                    index + 1,
                    retries + 1
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                index += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`Fetch`] implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff_base: Duration,
}

impl HttpFetcher {
    /// Builds a fetcher with an HTTP client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self::with_client(
            builder.build()?,
            Duration::from_millis(config.backoff_base_ms),
        ))
    }

    /// Creates a fetcher from an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, backoff_base: Duration) -> Self {
        Self {
            client,
            backoff_base,
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, retries: u32, cancel: &CancellationToken) -> Result<Bytes> {
        retry_with_backoff(retries, self.backoff_base, cancel, |attempt| {
            log::trace!("GET {url} (attempt {})", attempt + 1);
            self.get_bytes(url)
        })
        .await
    }
}

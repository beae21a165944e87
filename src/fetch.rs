//! The remote fetch boundary and its bounded-retry policy.
//!
//! The coordinator never talks to the network itself; it goes through the
//! [`Fetcher`] trait. Implementations bring their own transport and backoff,
//! the coordinator layers attempt counting on top: transient failures are
//! reissued back-to-back up to the configured attempt cap, permanent
//! failures are terminal immediately.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;

/// A single remote fetch of raw bytes for one locator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetch `locator` with up to `max_attempts` total attempts.
///
/// Transient errors are retried without delay; the adapter is expected to
/// apply its own backoff if it needs one. Exhausting the cap converts the
/// last transient error into a permanent one. An optional per-attempt
/// `timeout` counts a timed-out attempt as transient.
pub(crate) async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    locator: &str,
    max_attempts: u32,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, FetchError> {
    let max_attempts = max_attempts.max(1);
    let mut last = FetchError::Transient("no attempt issued".to_owned());

    for attempt in 1..=max_attempts {
        let fetch = fetcher.fetch(locator);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Transient(format!(
                    "attempt timed out after {limit:?}"
                ))),
            },
            None => fetch.await,
        };

        match outcome {
            Ok(bytes) => return Ok(bytes),
            Err(error @ FetchError::Permanent(_)) => {
                log::warn!("fetch {locator} failed on attempt {attempt}: {error}");
                return Err(error);
            }
            Err(error) => {
                log::warn!("fetch {locator} attempt {attempt}/{max_attempts} failed: {error}");
                last = error;
            }
        }
    }

    Err(FetchError::Permanent(format!(
        "gave up after {max_attempts} attempts: {last}"
    )))
}

/// Plain HTTP GET fetcher.
///
/// Connection errors, timeouts and 5xx responses are transient; malformed
/// locators and 4xx responses are permanent.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let url = reqwest::Url::parse(locator)
            .map_err(|e| FetchError::Permanent(format!("invalid locator {locator}: {e}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(FetchError::Permanent(format!("{status} for {locator}")));
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("{status} for {locator}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

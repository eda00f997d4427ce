//! Feed transport with exponential backoff retry logic.
//!
//! Fetching sits outside the pure core: it hands the raw feed document to
//! the parser and surfaces [`FeedError::SourceUnavailable`] when the source
//! cannot be reached. Cancellation and timeouts live here too, through the
//! HTTP client configuration.
//!
//! # Architecture
//!
//! - [`FetchFeed`]: Core trait for retrieving a feed document
//! - [`HttpFetcher`]: `reqwest` implementation with a fixed User-Agent and timeout
//! - [`RetryFetch`]: Decorator that adds retry logic to any `FetchFeed` implementation
//!
//! # Retry Strategy
//!
//! - Configurable number of retry attempts
//! - Exponential backoff starting at the base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Trait for retrieving a feed document.
pub trait FetchFeed {
    /// Fetch the document at `url` and return its body as text.
    async fn fetch(&self, url: &Url) -> FeedResult<String>;
}

/// HTTP fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: StdDuration) -> FeedResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl FetchFeed for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> FeedResult<String> {
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let body = response.text().await?;
        info!(bytes = body.len(), elapsed = ?t0.elapsed(), "Fetched feed");
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchFeed`] implementation.
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    /// Retries after the first attempt before giving up.
    max_retries: usize,
    /// Doubles with each attempt.
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchFeed,
{
    /// Create a new retry wrapper around an existing [`FetchFeed`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = HttpFetcher::new("salam_events", Duration::from_secs(10))?;
    /// let retrying = RetryFetch::new(fetcher, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> RetryFetch<T> {
    /// Delay before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl<T> FetchFeed for RetryFetch<T>
where
    T: FetchFeed,
{
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> FeedResult<String> {
        let started = Instant::now();
        let mut attempt = 1usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => {
                    if attempt > 1 {
                        info!(attempt, elapsed = ?started.elapsed(), "Feed fetched after retry");
                    }
                    return Ok(body);
                }
                Err(e) if attempt > self.max_retries => {
                    error!(attempt, elapsed = ?started.elapsed(), error = %e, "Feed source unavailable; giving up");
                    return Err(FeedError::SourceUnavailable(format!(
                        "{url}: {e} (after {attempt} attempts)"
                    )));
                }
                Err(e) => {
                    let jitter = StdDuration::from_millis(rng().random_range(0..=250));
                    let delay = self.backoff(attempt) + jitter;
                    warn!(attempt, max_retries = self.max_retries, ?delay, error = %e, "Feed fetch failed; retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Fetch the configured feed with retries.
///
/// This is the entry point used by `main`.
///
/// # Errors
///
/// [`FeedError::SourceUnavailable`] once every attempt failed, or a client
/// construction error.
#[instrument(level = "info", skip_all, fields(feed_url = %config.feed_url))]
pub async fn fetch_with_backoff(config: &FeedConfig) -> FeedResult<String> {
    let url = config.feed_url()?;
    let fetcher = HttpFetcher::new(&config.user_agent, StdDuration::from_secs(config.timeout_secs))?;
    RetryFetch::new(fetcher, config.max_retries, StdDuration::from_secs(1))
        .fetch(&url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails a fixed number of times, then returns a body.
    #[derive(Debug)]
    struct FlakyFetcher {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyFetcher {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FetchFeed for FlakyFetcher {
        async fn fetch(&self, _url: &Url) -> FeedResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(FeedError::Io(std::io::Error::other("connection reset")))
            } else {
                Ok("<rss/>".to_string())
            }
        }
    }

    fn url() -> Url {
        Url::parse("https://salamcenter.org/events/feed/").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failures() {
        let retrying = RetryFetch::new(FlakyFetcher::new(2), 3, StdDuration::from_millis(10));

        let body = retrying.fetch(&url()).await.unwrap();
        assert_eq!(body, "<rss/>");
        assert_eq!(retrying.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_as_source_unavailable() {
        let retrying = RetryFetch::new(FlakyFetcher::new(10), 2, StdDuration::from_millis(10));

        let err = retrying.fetch(&url()).await.unwrap_err();
        assert!(matches!(err, FeedError::SourceUnavailable(_)));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(retrying.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_needed() {
        let retrying = RetryFetch::new(FlakyFetcher::new(0), 0, StdDuration::from_millis(10));
        assert!(retrying.fetch(&url()).await.is_ok());
        assert_eq!(retrying.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let retrying = RetryFetch::new(FlakyFetcher::new(0), 10, StdDuration::from_secs(1));
        assert_eq!(retrying.backoff(1), StdDuration::from_secs(1));
        assert_eq!(retrying.backoff(2), StdDuration::from_secs(2));
        assert_eq!(retrying.backoff(4), StdDuration::from_secs(8));
        assert_eq!(retrying.backoff(6), StdDuration::from_secs(30));
        assert_eq!(retrying.backoff(40), StdDuration::from_secs(30));
    }

    #[test]
    fn test_retry_fetch_debug_hides_inner() {
        let retrying = RetryFetch::new(FlakyFetcher::new(0), 5, StdDuration::from_secs(1));
        let debug = format!("{retrying:?}");
        assert!(debug.contains("max_retries: 5"));
        assert!(!debug.contains("FlakyFetcher"));
    }
}

//! Per-source rate limiting and retry with exponential backoff.
//!
//! Each lookup waits for its source's governor permit via `until_ready()`,
//! which spaces requests at the configured rate across all workers. Transient
//! failures (429, transport errors, 408, 5xx) are retried with
//! `min(base * 2^attempt, max)` backoff plus jitter; a 429 also slows the
//! source's governor down.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;

use crate::db::MetadataSource;
use crate::{CandidateRecord, ConfigError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Error returned by a metadata lookup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    /// Server returned 429 Too Many Requests.
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    /// Connection, DNS, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}")]
    Http { status: u16 },
    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LookupError {
    /// Whether retrying the same request can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LookupError::RateLimited { .. } | LookupError::Transport(_) => true,
            LookupError::Http { status } => *status == 408 || (500..600).contains(status),
            LookupError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LookupError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            LookupError::Http {
                status: status.as_u16(),
            }
        } else {
            LookupError::Transport(e.to_string())
        }
    }
}

/// Map a non-success HTTP status to a [`LookupError`], extracting Retry-After on 429.
pub fn check_response_status(resp: &reqwest::Response) -> Result<(), LookupError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(LookupError::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(LookupError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: use a conservative fixed wait instead of parsing it
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Retry settings for transient lookup failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Add up to 25% random jitter to each computed backoff.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_backoff > self.max_backoff {
            return Err(ConfigError::Backoff {
                base: self.base_backoff,
                max: self.max_backoff,
            });
        }
        Ok(())
    }

    /// `min(base * 2^attempt, max)`, without jitter. `attempt` is 0-based.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay before the next attempt, honoring Retry-After when present.
    fn delay_for(&self, attempt: u32, err: &LookupError) -> Duration {
        if let LookupError::RateLimited {
            retry_after: Some(wait),
        } = err
        {
            return (*wait).min(self.max_backoff);
        }
        let backoff = self.backoff_for(attempt);
        if self.jitter {
            let max_jitter = (backoff.as_millis() / 4) as u64;
            backoff + Duration::from_millis(fastrand::u64(0..=max_jitter))
        } else {
            backoff
        }
    }
}

/// Per-source rate limiter with adaptive slowdown via ArcSwap.
///
/// On a 429 the governor is atomically swapped to a slower rate. After 60s
/// without another 429 the original rate is restored.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 = normal, 2 = half rate, ... capped at 16.
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

impl AdaptiveLimiter {
    pub fn new(period: Duration) -> Self {
        let limiter = Arc::new(DirectLimiter::direct(quota_for(period)));
        Self {
            limiter: ArcSwap::from(limiter),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    /// A limiter allowing `n` requests per second.
    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the governor allows a request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Double the slowdown factor and swap in a slower governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }
        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(16))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= 60))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// Rate limiters keyed by source name, shared by all workers.
pub struct RateLimiters {
    limiters: HashMap<&'static str, AdaptiveLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl RateLimiters {
    /// Build limiters based on whether a CrossRef mailto and S2 key are configured.
    pub fn new(has_crossref_mailto: bool, has_s2_api_key: bool) -> Self {
        let mut limiters = HashMap::new();

        // CrossRef "polite pool" allows more with a mailto
        let crossref_rate = if has_crossref_mailto { 3 } else { 1 };
        limiters.insert("CrossRef", AdaptiveLimiter::per_second(crossref_rate));

        limiters.insert("arXiv", AdaptiveLimiter::per_second(3));

        if has_s2_api_key {
            limiters.insert("Semantic Scholar", AdaptiveLimiter::per_second(1));
        } else {
            limiters.insert(
                "Semantic Scholar",
                AdaptiveLimiter::new(Duration::from_secs(3)),
            );
        }

        Self { limiters }
    }

    /// A set with no limiters at all, for tests and offline sources.
    pub fn unlimited() -> Self {
        Self {
            limiters: HashMap::new(),
        }
    }

    pub fn get(&self, source_name: &str) -> Option<&AdaptiveLimiter> {
        self.limiters.get(source_name)
    }
}

impl std::fmt::Debug for RateLimiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.limiters.keys().collect();
        names.sort();
        f.debug_struct("RateLimiters").field("sources", &names).finish()
    }
}

/// Called before each retry with the 1-based retry number and the wait.
pub type RetryHook<'a> = &'a (dyn Fn(u32, Duration, &LookupError) + Send + Sync);

/// Query a source through its rate limiter, retrying transient failures.
///
/// Non-transient errors are returned immediately. After `max_retries`
/// retries the last error is returned.
#[allow(clippy::too_many_arguments)]
pub async fn query_with_retry(
    source: &dyn MetadataSource,
    title: &str,
    limit: usize,
    client: &reqwest::Client,
    timeout: Duration,
    rate_limiters: &RateLimiters,
    policy: &RetryPolicy,
    on_retry: RetryHook<'_>,
) -> Result<Vec<CandidateRecord>, LookupError> {
    let limiter = rate_limiters.get(source.name());
    let mut attempt: u32 = 0;

    loop {
        if let Some(lim) = limiter {
            lim.acquire().await;
        }

        let err = match source.search_by_title(title, limit, client, timeout).await {
            Ok(candidates) => return Ok(candidates),
            Err(e) => e,
        };

        if matches!(err, LookupError::RateLimited { .. })
            && let Some(lim) = limiter
        {
            lim.on_rate_limited();
        }

        if !err.is_transient() || attempt >= policy.max_retries {
            return Err(err);
        }

        let wait = policy.delay_for(attempt, &err);
        attempt += 1;
        tracing::debug!(
            source = source.name(),
            attempt,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "retrying lookup"
        );
        on_retry(attempt, wait, &err);
        tokio::time::sleep(wait).await;
    }
}

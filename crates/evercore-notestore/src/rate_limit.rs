//! Adaptive rate limiting for note store RPC calls
//!
//! Provides proactive rate limiting so the synchronization core rarely
//! triggers a server-side throttle response in the first place.
//!
//! - [`TokenBucket`]: classic token bucket algorithm for per-endpoint-class
//!   rate limiting.
//! - [`AdaptiveRateLimiter`]: manages one bucket per endpoint class and
//!   adjusts its effective capacity based on observed throttle/success
//!   events.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evercore_notestore::rate_limit::{AdaptiveRateLimiter, RateLimitConfig};
//!
//! # async fn example() {
//! let limiter = AdaptiveRateLimiter::new(RateLimitConfig::default());
//! limiter.acquire("sync_chunk").await;
//! // ... issue the RPC call ...
//! limiter.on_success("sync_chunk");
//! # }
//! ```

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

/// Internal mutable state for the token bucket, protected by a Mutex.
#[derive(Debug)]
struct TokenBucketInner {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter for a single endpoint class.
///
/// Tokens are consumed on each request and refilled at a constant rate.
/// When no tokens are available, callers wait for refill. Thread safety is
/// provided by an internal `Mutex<TokenBucketInner>`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    effective_capacity: Mutex<u32>,
    refill_rate: f64,
    inner: Mutex<TokenBucketInner>,
    success_count: Mutex<u64>,
    original_capacity: u32,
}

impl TokenBucket {
    /// Creates a new bucket, starting full (`tokens == capacity`).
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            effective_capacity: Mutex::new(capacity),
            refill_rate,
            inner: Mutex::new(TokenBucketInner {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
            success_count: Mutex::new(0),
            original_capacity: capacity,
        }
    }

    fn refill(inner: &mut TokenBucketInner, refill_rate: f64, effective_capacity: u32) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(inner.last_refill).as_secs_f64();

        if elapsed_secs > 0.0 {
            let new_tokens = elapsed_secs * refill_rate;
            inner.tokens = (inner.tokens + new_tokens).min(effective_capacity as f64);
            inner.last_refill = now;
        }
    }

    /// Attempts to acquire a single token. Refills first, then subtracts
    /// 1.0 if at least one token is available.
    pub fn try_acquire(&self) -> bool {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);

        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait time in seconds until a token becomes available.
    pub fn time_until_available(&self) -> f64 {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);

        if inner.tokens >= 1.0 {
            0.0
        } else {
            let deficit = 1.0 - inner.tokens;
            if self.refill_rate > 0.0 {
                deficit / self.refill_rate
            } else {
                f64::MAX
            }
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);
        inner.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        *self.effective_capacity.lock().unwrap()
    }

    /// Records a successful call. Every 100 consecutive successes the
    /// effective capacity grows by 5%, up to the original capacity.
    pub fn on_success(&self) {
        let mut count = self.success_count.lock().unwrap();
        *count += 1;

        if *count % 100 == 0 {
            let mut eff_cap = self.effective_capacity.lock().unwrap();
            if *eff_cap < self.original_capacity {
                let increase = (*eff_cap as f64 * 0.05).max(1.0) as u32;
                let new_cap = (*eff_cap + increase).min(self.original_capacity);
                debug!(
                    old_capacity = *eff_cap,
                    new_capacity = new_cap,
                    successes = *count,
                    "adaptive recovery: increasing bucket capacity"
                );
                *eff_cap = new_cap;
            }
        }
    }

    /// Records a throttle event, halving effective capacity (floor 1) and
    /// resetting the success counter.
    pub fn on_throttle(&self) {
        let mut eff_cap = self.effective_capacity.lock().unwrap();
        let old = *eff_cap;
        *eff_cap = (*eff_cap / 2).max(1);
        warn!(
            old_capacity = old,
            new_capacity = *eff_cap,
            "throttle detected: reducing bucket capacity by 50%"
        );

        *self.success_count.lock().unwrap() = 0;
    }
}

/// Marker returned by [`AdaptiveRateLimiter::acquire`]. `TokenBucket`
/// already subtracts the token on acquisition; this exists as a seam for
/// future per-call bookkeeping.
#[derive(Debug)]
pub struct RateLimitGuard {
    _endpoint: String,
}

impl RateLimitGuard {
    fn new(endpoint: String) -> Self {
        Self { _endpoint: endpoint }
    }
}

/// Configuration for the adaptive rate limiter.
///
/// Endpoint classes match the four request shapes the downloader and
/// sender issue: `sync_chunk` (delta-style paging calls), `notes` and
/// `resources` (full-entity downloads), and `create_update` (uploads).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_capacity: u32,
    pub default_refill_rate: f64,
    pub endpoint_overrides: HashMap<String, (u32, f64)>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert("sync_chunk".to_string(), (30, 30.0 / 60.0));
        overrides.insert("create_update".to_string(), (60, 1.0));
        overrides.insert("resources".to_string(), (120, 2.0));
        overrides.insert("notes".to_string(), (100, 100.0 / 60.0));

        Self {
            default_capacity: 300,
            default_refill_rate: 5.0,
            endpoint_overrides: overrides,
        }
    }
}

/// Adaptive rate limiter managing one token bucket per endpoint class.
///
/// Thread-safe, intended to be shared via `Arc<AdaptiveRateLimiter>`
/// across all note store clients a [`crate::provider::NoteStoreProvider`]
/// hands out.
pub struct AdaptiveRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    fn get_or_create_bucket<F, R>(&self, endpoint: &str, f: F) -> R
    where
        F: FnOnce(&TokenBucket) -> R,
    {
        let mut buckets = self.buckets.lock().unwrap();
        if !buckets.contains_key(endpoint) {
            let (capacity, refill_rate) = self
                .config
                .endpoint_overrides
                .get(endpoint)
                .copied()
                .unwrap_or((self.config.default_capacity, self.config.default_refill_rate));

            debug!(endpoint, capacity, refill_rate, "creating new token bucket for endpoint");
            buckets.insert(endpoint.to_string(), TokenBucket::new(capacity, refill_rate));
        }
        f(buckets.get(endpoint).unwrap())
    }

    /// Acquires a token for `endpoint`, sleeping until one is available.
    pub async fn acquire(&self, endpoint: &str) -> RateLimitGuard {
        loop {
            let acquired = self.get_or_create_bucket(endpoint, |bucket| bucket.try_acquire());
            if acquired {
                debug!(endpoint, "rate limit token acquired");
                return RateLimitGuard::new(endpoint.to_string());
            }

            let wait_secs = self.get_or_create_bucket(endpoint, |bucket| bucket.time_until_available());
            let wait = Duration::from_secs_f64(wait_secs.max(0.01));
            debug!(endpoint, wait_ms = wait.as_millis(), "no tokens available, waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn on_success(&self, endpoint: &str) {
        self.get_or_create_bucket(endpoint, |bucket| bucket.on_success());
    }

    pub fn on_throttle(&self, endpoint: &str) {
        info!(endpoint, "recording throttle event for endpoint");
        self.get_or_create_bucket(endpoint, |bucket| bucket.on_throttle());
    }

    pub fn available_tokens(&self, endpoint: &str) -> Option<f64> {
        let buckets = self.buckets.lock().unwrap();
        buckets.get(endpoint).map(|b| b.available_tokens())
    }

    pub fn effective_capacity(&self, endpoint: &str) -> Option<u32> {
        let buckets = self.buckets.lock().unwrap();
        buckets.get(endpoint).map(|b| b.effective_capacity())
    }
}

/// Parses a `Retry-After` header: an integer number of seconds, or an
/// HTTP-date. Falls back to `default` if neither parses.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff.num_seconds().try_into().ok().filter(|&s: &u64| s <= 3600) {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "could not parse Retry-After header, using default");
    default
}

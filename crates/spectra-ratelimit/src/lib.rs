// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-ratelimit
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Per-principal token-bucket admission control (§4.2).
//!
//! Buckets are created lazily on first use and refilled on demand —
//! `elapsed · rate` tokens, capped at capacity — rather than on a ticking
//! timer, so an idle principal costs nothing between requests. A background
//! sweep reclaims buckets that have gone idle past a configured age.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default idle age after which an unused bucket is swept away.
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(60 * 60);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_touched: Instant,
}

impl Bucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_touched: now,
        }
    }

    fn refill(&mut self, capacity: f64, rate_per_sec: f64, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// A token-bucket rate limiter keyed by an arbitrary principal string.
///
/// Two preconfigured instances are used by the daemon: [`RateLimiter::ingest`]
/// (60/min) and [`RateLimiter::query`] (30/min).
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    capacity: u32,
    window: Duration,
}

impl RateLimiter {
    /// Build a limiter that admits `capacity` requests per `window`, per
    /// principal key.
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            window,
        }
    }

    /// The ingest admission limiter: 60 requests per minute (§4.2).
    #[must_use]
    pub fn ingest() -> Self {
        Self::new(60, Duration::from_secs(60))
    }

    /// The query admission limiter: 30 requests per minute (§4.2).
    #[must_use]
    pub fn query() -> Self {
        Self::new(30, Duration::from_secs(60))
    }

    /// Bucket capacity (the `X-RateLimit-Limit` value).
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Refill window (the `X-RateLimit-Window` value, rendered by the
    /// caller as e.g. `"1m"`).
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn rate_per_sec(&self) -> f64 {
        f64::from(self.capacity) / self.window.as_secs_f64()
    }

    /// Attempt to admit one request for `key`. Returns `true` if a token was
    /// available and consumed.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let capacity = f64::from(self.capacity);
        let rate = self.rate_per_sec();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(capacity, now));
        bucket.refill(capacity, rate, now);
        bucket.last_touched = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remove buckets that have not been touched in over `max_idle`.
    pub async fn sweep(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        buckets.retain(|_, bucket| now.duration_since(bucket.last_touched) <= max_idle);
    }

    /// Number of buckets currently tracked (for diagnostics/tests).
    pub async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }

    /// Spawn a background task that sweeps idle buckets every `interval`,
    /// evicting buckets idle for more than `max_idle`. The task runs until
    /// the returned handle is dropped or aborted.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        max_idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep(max_idle).await;
                tracing::debug!(
                    target: "spectra.ratelimit",
                    "swept idle rate-limit buckets"
                );
            }
        })
    }
}

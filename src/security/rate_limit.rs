//! Per-key token bucket rate limiting.
//!
//! # Design Decisions
//! - Buckets are created lazily on first use and start full
//! - Refill is lazy: computed from elapsed time on each `allow`
//! - A DashMap entry lock makes each withdrawal atomic per key
//! - `allow` never waits for capacity
//! - Idle buckets are evicted by `evict_idle`; a key that comes back simply
//!   starts again with a full bucket

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Requests allowed per period, plus burst capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quota {
    pub requests: u32,
    pub period: Duration,
    pub burst: u32,
}

impl Quota {
    pub fn per_second(requests: u32) -> Self {
        Self {
            requests,
            period: Duration::from_secs(1),
            burst: requests,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.requests as f64 / self.period.as_secs_f64()
    }

    /// Time to refill one token.
    pub fn refill_interval(&self) -> Duration {
        self.period / self.requests.max(1)
    }
}

/// Parses `10req/s`, `100req/min;burst=20` or `5req/30s`.
impl FromStr for Quota {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';').map(str::trim).filter(|p| !p.is_empty());
        let rate = parts.next().ok_or("missing rate, expected e.g. '10req/s'")?;

        let (count, window) = rate
            .split_once("req/")
            .ok_or_else(|| format!("malformed rate '{rate}', expected '<n>req/<unit>'"))?;
        let requests: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("request count '{count}' is not a positive integer"))?;
        if requests == 0 {
            return Err("request count must be greater than zero".into());
        }

        let digits = window.chars().take_while(char::is_ascii_digit).count();
        let multiplier: u32 = match &window[..digits] {
            "" => 1,
            n => n.parse().map_err(|_| format!("bad window multiplier '{n}'"))?,
        };
        let unit_secs = match &window[digits..] {
            "s" | "sec" | "second" => 1,
            "m" | "min" | "minute" => 60,
            "h" | "hour" => 3600,
            other => return Err(format!("unknown time unit '{other}'")),
        };
        if multiplier == 0 {
            return Err("time window must be greater than zero".into());
        }

        let mut quota = Quota {
            requests,
            period: Duration::from_secs(u64::from(multiplier) * unit_secs),
            burst: requests,
        };
        for option in parts {
            match option.split_once('=') {
                Some(("burst", n)) => {
                    quota.burst = n
                        .trim()
                        .parse()
                        .ok()
                        .filter(|b| *b > 0)
                        .ok_or_else(|| format!("burst '{n}' is not a positive integer"))?;
                }
                _ => return Err(format!("unknown rate-limit option '{option}'")),
            }
        }
        Ok(quota)
    }
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        // A caller holding an older `now` refills nothing.
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        if now > self.last_update {
            self.last_update = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token bucket limiter shared across concurrent requests.
pub struct RateLimiter {
    quota: Quota,
    idle_ttl: Duration,
    buckets: DashMap<String, TokenBucket>,
    calls: AtomicU64,
}

impl RateLimiter {
    pub fn new(quota: Quota, idle_ttl: Duration) -> Self {
        Self {
            quota,
            idle_ttl,
            buckets: DashMap::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Withdraw one token for `key`. Returns false when the bucket is empty.
    pub fn allow(&self, key: &str, now: Instant) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let capacity = self.quota.burst as f64;
        let rate = self.quota.refill_rate();

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(now, capacity, rate);
        }
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(capacity, now))
            .try_acquire(now, capacity, rate)
    }

    /// Drop buckets untouched for at least the idle TTL. Returns how many were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_update) < self.idle_ttl);
        before.saturating_sub(self.buckets.len())
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Number of `allow` calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("quota", &self.quota)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

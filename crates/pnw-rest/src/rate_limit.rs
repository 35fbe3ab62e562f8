//! Token-bucket rate limiter for the REST Client (§4.3): at most `quota`
//! requests per `duration`. Grounded on ethers-rs's `RateAwareClient`
//! period-tracking strategy (`rate_aware.rs`), extended with the spec's
//! HTTP 429 behavior: force-fill the bucket so every waiter blocks until the
//! next period, then retry the same request (§7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct RateLimiter {
    quota: u64,
    duration: Duration,
    period_start: AtomicU64,
    requests_made: AtomicU64,
}

impl RateLimiter {
    pub fn new(quota: u64, duration: Duration) -> Self {
        Self {
            quota,
            duration,
            period_start: AtomicU64::new(Self::unix_now_secs()),
            requests_made: AtomicU64::new(0),
        }
    }

    /// Blocks until a request slot is available, then records the request.
    pub async fn acquire(&self) {
        loop {
            if self.requests_left() > 0 {
                self.record_request();
                return;
            }
            tokio::time::sleep(self.time_until_next_period()).await;
        }
    }

    /// Forces the bucket to appear exhausted for the remainder of the
    /// current period, so every subsequent `acquire` blocks until it rolls
    /// over (§4.3: "On HTTP 429: fill the bucket to cap").
    pub fn force_fill(&self) {
        self.requests_made.store(self.quota, Ordering::SeqCst);
    }

    fn requests_left(&self) -> u64 {
        if self.is_new_period() {
            return self.quota;
        }
        self.quota.saturating_sub(self.requests_made.load(Ordering::SeqCst))
    }

    fn is_new_period(&self) -> bool {
        Self::unix_now_secs() > self.current_period_end()
    }

    fn current_period_end(&self) -> u64 {
        self.period_start.load(Ordering::SeqCst) + self.duration.as_secs()
    }

    fn time_until_next_period(&self) -> Duration {
        let now = Self::unix_now_secs();
        let end = self.current_period_end();
        if now >= end {
            Duration::from_secs(0)
        } else {
            Duration::from_secs(end - now)
        }
    }

    fn record_request(&self) {
        if self.is_new_period() {
            self.requests_made.store(1, Ordering::SeqCst);
            self.period_start.store(Self::unix_now_secs(), Ordering::SeqCst);
        } else {
            self.requests_made.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn unix_now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_consumes_quota_without_blocking() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.requests_left(), 0);
    }

    #[test]
    fn force_fill_exhausts_remaining_quota() {
        let limiter = RateLimiter::new(60, Duration::from_secs(60));
        limiter.force_fill();
        assert_eq!(limiter.requests_left(), 0);
    }
}

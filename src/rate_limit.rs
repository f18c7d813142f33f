//! Per-IP token-bucket rate limiting for the admin HTTP surface,
//! grounded on the teacher's `RateLimitManager`: a `DashMap` of
//! independent `governor` direct rate limiters, one per key, built
//! from a single shared quota.

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

const MAX_TRACKED_IPS: usize = 10_000;

#[derive(Clone)]
pub struct RateLimiter {
    limiters: Arc<DashMap<IpAddr, DirectRateLimiter>>,
    quota: Quota,
}

impl RateLimiter {
    /// `max_requests` tokens are spread evenly across `window_ms`,
    /// with a burst allowance equal to `max_requests` so a client
    /// that has been idle can catch up to the full window at once.
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        let max_requests = NonZeroU32::new(max_requests).unwrap_or(nonzero!(1u32));
        let period = Duration::from_millis(window_ms.max(1)) / max_requests.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(max_requests);
        Self {
            limiters: Arc::new(DashMap::new()),
            quota,
        }
    }

    /// Returns `true` if the request should be allowed.
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiters.len() > MAX_TRACKED_IPS {
            self.limiters.clear();
        }
        let limiter = self
            .limiters
            .entry(ip)
            .or_insert_with(|| GovRateLimiter::direct(self.quota));
        limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_burst_then_rejects() {
        let limiter = RateLimiter::new(60_000, 3);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn different_ips_are_tracked_independently() {
        let limiter = RateLimiter::new(60_000, 1);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }
}

//! Per-user message rate limiter (C4, §4.4). Grounded on the
//! double-checked-locking, lazily-created-entry shape of
//! `services/server/src/state.rs`'s `get_or_create_broadcast`, adapted from a
//! broadcast-channel registry to a token bucket.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    rate_per_sec: f64,
}

impl TokenBucket {
    fn new(capacity: f64, rate_per_sec: f64) -> Self {
        // Starts full; `try_take` debits the first call's token as part of
        // normal consumption, so the initial burst is exactly `capacity`,
        // never `capacity + 1` (§4.4).
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
            capacity,
            rate_per_sec,
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Non-blocking, constant-time-per-call rate limiter keyed by user id. Never
/// sleeps or awaits — a denied call returns immediately so the session
/// runtime can enqueue a rejection notice without stalling the reader loop.
pub struct RateLimiter {
    capacity: f64,
    rate_per_sec: f64,
    buckets: RwLock<HashMap<String, Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, capacity: u32) -> Self {
        Self {
            capacity: capacity as f64,
            rate_per_sec,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// `Allow(userID) -> bool` (§4.4).
    pub fn allow(&self, user_id: &str) -> bool {
        {
            let buckets = self.buckets.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(bucket) = buckets.get(user_id) {
                return bucket
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .try_take();
            }
        }
        let mut buckets = self.buckets.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let bucket = buckets
            .entry(user_id.to_owned())
            .or_insert_with(|| Mutex::new(TokenBucket::new(self.capacity, self.rate_per_sec)));
        bucket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .try_take()
    }

    /// Drops a user's bucket, e.g. on session close, so memory does not grow
    /// unbounded across a long server lifetime (§4.4).
    pub fn forget(&self, user_id: &str) {
        self.buckets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_on_capacity_one_succeeds_then_the_next_is_denied() {
        let limiter = RateLimiter::new(1.0, 1);
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"), "capacity 1 has no token left after the first call");
    }

    #[test]
    fn burst_up_to_capacity_then_denies() {
        let limiter = RateLimiter::new(1.0, 3);
        assert!(limiter.allow("alice"));
        assert!(limiter.allow("alice"));
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"), "burst is exactly capacity, never capacity + 1");
    }

    #[test]
    fn users_have_independent_buckets() {
        let limiter = RateLimiter::new(1.0, 1);
        assert!(limiter.allow("alice"));
        assert!(limiter.allow("bob"), "bob's bucket is independent of alice's");
    }

    #[test]
    fn forget_resets_the_bucket() {
        let limiter = RateLimiter::new(1.0, 1);
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"));
        limiter.forget("alice");
        assert!(limiter.allow("alice"), "a fresh bucket starts full again");
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct RateLimitPolicy {
  pub max_requests: u32,
  pub window: Duration,
}

impl Default for RateLimitPolicy {
  fn default() -> Self {
    Self {
      max_requests: 100,
      window: Duration::from_secs(60 * 60),
    }
  }
}

/// Admission check consulted before any upstream call. Implementations own
/// their storage, so a multi-instance deployment can swap in one backed by
/// a shared counter service; `FixedWindowLimiter` is the default.
pub trait RateLimiter: Send + Sync {
  fn allow(&self, key: &str) -> bool;
}

struct Bucket {
  count: u32,
  reset_at: Instant,
}

/// Per-key fixed-window counter, process-local and in-memory. Entries are
/// never evicted: memory grows with the number of distinct keys seen, and
/// separate processes do not see each other's counts.
pub struct FixedWindowLimiter {
  policy: RateLimitPolicy,
  buckets: Mutex<HashMap<String, Bucket>>,
}

impl FixedWindowLimiter {
  pub fn new(policy: RateLimitPolicy) -> Self {
    Self {
      policy,
      buckets: Mutex::new(HashMap::new()),
    }
  }

  fn allow_at(&self, key: &str, now: Instant) -> bool {
    let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
    match buckets.get_mut(key) {
      Some(bucket) if now <= bucket.reset_at => {
        // The count keeps rising past the limit; a burst after denial
        // never moves reset_at, so the window stays anchored at the
        // bucket's creation.
        bucket.count = bucket.count.saturating_add(1);
        bucket.count <= self.policy.max_requests
      }
      _ => {
        buckets.insert(
          key.to_string(),
          Bucket {
            count: 1,
            reset_at: now + self.policy.window,
          },
        );
        true
      }
    }
  }
}

impl RateLimiter for FixedWindowLimiter {
  fn allow(&self, key: &str) -> bool {
    self.allow_at(key, Instant::now())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy(max_requests: u32, window_secs: u64) -> RateLimitPolicy {
    RateLimitPolicy {
      max_requests,
      window: Duration::from_secs(window_secs),
    }
  }

  #[test]
  fn allows_up_to_the_limit_then_denies() {
    let limiter = FixedWindowLimiter::new(RateLimitPolicy::default());
    let now = Instant::now();
    for _ in 0..100 {
      assert!(limiter.allow_at("10.0.0.1", now));
    }
    assert!(!limiter.allow_at("10.0.0.1", now));
    assert!(!limiter.allow_at("10.0.0.1", now));
  }

  #[test]
  fn window_rollover_resets_the_count() {
    let limiter = FixedWindowLimiter::new(policy(2, 60));
    let start = Instant::now();
    assert!(limiter.allow_at("key", start));
    assert!(limiter.allow_at("key", start));
    assert!(!limiter.allow_at("key", start));

    let later = start + Duration::from_secs(61);
    assert!(limiter.allow_at("key", later));
    // Fresh bucket: one request used, one left.
    assert!(limiter.allow_at("key", later));
    assert!(!limiter.allow_at("key", later));
  }

  #[test]
  fn burst_after_denial_does_not_extend_the_window() {
    let limiter = FixedWindowLimiter::new(policy(1, 60));
    let start = Instant::now();
    assert!(limiter.allow_at("key", start));
    for i in 1..50 {
      assert!(!limiter.allow_at("key", start + Duration::from_secs(i)));
    }
    assert!(limiter.allow_at("key", start + Duration::from_secs(61)));
  }

  #[test]
  fn distinct_keys_never_share_a_bucket() {
    let limiter = FixedWindowLimiter::new(policy(1, 60));
    let now = Instant::now();
    assert!(limiter.allow_at("203.0.113.7", now));
    assert!(!limiter.allow_at("203.0.113.7", now));
    assert!(limiter.allow_at("203.0.113.8", now));
  }

  #[test]
  fn colliding_keys_share_one_bucket() {
    // Clients without a forwarded address all derive the same sentinel
    // key and throttle together.
    let limiter = FixedWindowLimiter::new(policy(1, 60));
    let now = Instant::now();
    assert!(limiter.allow_at("unknown", now));
    assert!(!limiter.allow_at("unknown", now));
  }

  #[test]
  fn boundary_instant_still_counts_into_the_window() {
    let limiter = FixedWindowLimiter::new(policy(1, 60));
    let start = Instant::now();
    assert!(limiter.allow_at("key", start));
    // Exactly at reset_at the bucket has not rolled over yet.
    assert!(!limiter.allow_at("key", start + Duration::from_secs(60)));
  }
}

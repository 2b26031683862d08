use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::AppError;
use crate::metrics::RATE_LIMITED_TOTAL;

// Logical limiter keys
pub const COMPLETION_KEY: &str = "openai-api";
pub const CONTACT_FORM_KEY: &str = "contact-form";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

// Sliding window limiter - one timestamp queue per key
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<u64>>, // key -> request times (ms), oldest first
    default_policy: RateLimitPolicy,
    overrides: Vec<(String, RateLimitPolicy)>, // key prefix -> policy
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(default_policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            default_policy,
            overrides: Vec::new(),
            clock,
        }
    }

    // Keys starting with `prefix` use `policy` instead of the default
    pub fn with_policy(mut self, prefix: impl Into<String>, policy: RateLimitPolicy) -> Self {
        self.overrides.push((prefix.into(), policy));
        self
    }

    pub fn policy_for(&self, key: &str) -> RateLimitPolicy {
        self.overrides
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map(|(_, policy)| *policy)
            .unwrap_or(self.default_policy)
    }

    // true when the caller must not proceed. Allowed attempts are recorded
    pub fn is_rate_limited(&self, key: &str) -> bool {
        let policy = self.policy_for(key);
        let now = self.clock.now_ms();

        let mut timestamps = self.windows.entry(key.to_string()).or_default();
        prune(&mut timestamps, now, policy.window_ms());

        if timestamps.len() >= policy.max_requests {
            return true;
        }

        timestamps.push_back(now);
        false
    }

    pub fn remaining_requests(&self, key: &str) -> usize {
        let policy = self.policy_for(key);
        let now = self.clock.now_ms();

        let count = self
            .windows
            .get_mut(key)
            .map(|mut timestamps| {
                prune(&mut timestamps, now, policy.window_ms());
                timestamps.len()
            })
            .unwrap_or(0);
        if count == 0 {
            self.forget_if_idle(key);
        }

        policy.max_requests.saturating_sub(count)
    }

    // Time until the oldest recorded request leaves the window
    pub fn reset_time(&self, key: &str) -> Duration {
        let policy = self.policy_for(key);
        let now = self.clock.now_ms();

        let oldest = self.windows.get_mut(key).and_then(|mut timestamps| {
            prune(&mut timestamps, now, policy.window_ms());
            timestamps.front().copied()
        });

        match oldest {
            Some(oldest) => {
                Duration::from_millis((oldest + policy.window_ms()).saturating_sub(now))
            }
            None => {
                self.forget_if_idle(key);
                Duration::ZERO
            }
        }
    }

    // Drops every key whose window has emptied, returns how many went
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.windows.len();

        self.windows.retain(|key, timestamps| {
            prune(timestamps, now, self.policy_for(key).window_ms());
            !timestamps.is_empty()
        });

        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn forget_if_idle(&self, key: &str) {
        self.windows.remove_if(key, |_, timestamps| timestamps.is_empty());
    }

    pub fn check(&self, key: &str) -> Result<(), AppError> {
        if self.is_rate_limited(key) {
            RATE_LIMITED_TOTAL.inc();
            tracing::warn!(key, "Rate limit exceeded");
            return Err(AppError::RateLimited {
                retry_after: self.reset_time(key),
            });
        }
        Ok(())
    }
}

// drop everything at or before the window start
fn prune(timestamps: &mut VecDeque<u64>, now: u64, window_ms: u64) {
    let window_start = now.saturating_sub(window_ms);
    while timestamps.front().is_some_and(|t| *t <= window_start) {
        timestamps.pop_front();
    }
}

// Per-client limiter key, e.g. "contact-form:203.0.113.7"
pub fn client_key(base: &str, client: &str) -> String {
    format!("{}:{}", base, client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(max: usize, window_secs: u64) -> (SlidingWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = SlidingWindowLimiter::new(
            RateLimitPolicy::new(max, Duration::from_secs(window_secs)),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_sixth_contact_submission_is_rejected() {
        let (limiter, _clock) = limiter(5, 900);

        for _ in 0..5 {
            assert!(!limiter.is_rate_limited(CONTACT_FORM_KEY));
        }
        assert!(limiter.is_rate_limited(CONTACT_FORM_KEY));
    }

    #[test]
    fn test_rejected_attempts_are_not_recorded() {
        let (limiter, clock) = limiter(2, 60);

        assert!(!limiter.is_rate_limited("k"));
        clock.advance(Duration::from_secs(30));
        assert!(!limiter.is_rate_limited("k"));
        for _ in 0..10 {
            assert!(limiter.is_rate_limited("k"));
        }

        // only the first request leaves the window, the rejected ones never counted
        clock.advance(Duration::from_secs(31));
        assert_eq!(limiter.remaining_requests("k"), 1);
        assert!(!limiter.is_rate_limited("k"));
    }

    #[test]
    fn test_accepts_again_after_window_slides() {
        let (limiter, clock) = limiter(3, 60);

        for _ in 0..3 {
            assert!(!limiter.is_rate_limited("openai-api"));
        }
        assert!(limiter.is_rate_limited("openai-api"));

        clock.advance(Duration::from_secs(59));
        assert!(limiter.is_rate_limited("openai-api"));

        // a timestamp exactly window-old is outside the window
        clock.advance(Duration::from_secs(1));
        assert!(!limiter.is_rate_limited("openai-api"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter(1, 60);

        assert!(!limiter.is_rate_limited("a"));
        assert!(limiter.is_rate_limited("a"));
        assert!(!limiter.is_rate_limited("b"));
    }

    #[test]
    fn test_remaining_requests_does_not_record() {
        let (limiter, _clock) = limiter(3, 60);

        assert_eq!(limiter.remaining_requests("k"), 3);
        assert_eq!(limiter.remaining_requests("k"), 3);
        limiter.is_rate_limited("k");
        assert_eq!(limiter.remaining_requests("k"), 2);
    }

    #[test]
    fn test_reset_time() {
        let (limiter, clock) = limiter(2, 60);

        assert_eq!(limiter.reset_time("k"), Duration::ZERO);

        limiter.is_rate_limited("k");
        clock.advance(Duration::from_secs(20));
        limiter.is_rate_limited("k");
        assert_eq!(limiter.reset_time("k"), Duration::from_secs(40));

        clock.advance(Duration::from_secs(40));
        assert_eq!(limiter.reset_time("k"), Duration::from_secs(20));

        clock.advance(Duration::from_secs(20));
        assert_eq!(limiter.reset_time("k"), Duration::ZERO);
    }

    #[test]
    fn test_prefix_policy_overrides_default() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::new(
            RateLimitPolicy::new(100, Duration::from_secs(900)),
            clock,
        )
        .with_policy(CONTACT_FORM_KEY, RateLimitPolicy::new(5, Duration::from_secs(900)));

        let key = client_key(CONTACT_FORM_KEY, "203.0.113.7");
        assert_eq!(limiter.policy_for(&key).max_requests, 5);
        assert_eq!(limiter.policy_for(COMPLETION_KEY).max_requests, 100);
        assert_eq!(limiter.remaining_requests(&key), 5);
    }

    #[test]
    fn test_check_reports_retry_after() {
        let (limiter, clock) = limiter(1, 60);

        assert!(limiter.check("k").is_ok());
        clock.advance(Duration::from_secs(15));
        match limiter.check("k") {
            Err(AppError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(45))
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_emptied_windows_are_dropped() {
        let (limiter, clock) = limiter(5, 60);

        for i in 0..50 {
            let key = client_key(CONTACT_FORM_KEY, &format!("10.0.0.{}", i));
            assert!(!limiter.is_rate_limited(&key));
        }
        assert!(!limiter.is_rate_limited(COMPLETION_KEY));
        assert_eq!(limiter.tracked_keys(), 51);

        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.sweep(), 0);

        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.sweep(), 51);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_reads_forget_idle_keys() {
        let (limiter, clock) = limiter(2, 60);

        limiter.is_rate_limited("k");
        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.remaining_requests("k"), 2);
        assert_eq!(limiter.tracked_keys(), 0);

        // unknown keys are never inserted by a read
        assert_eq!(limiter.reset_time("other"), Duration::ZERO);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}

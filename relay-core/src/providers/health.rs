//! Per-backend cool-down tracking
//!
//! One `HealthTracker` is shared by every concurrent resolution. The map sits
//! behind a `std::sync::Mutex` that is never held across an `.await`; every
//! operation is a short read-modify-write, so concurrent failures are never
//! lost and a cool-down timestamp is never observed half-written.
//!
//! Cool-downs only ever move forward: a failure sets
//! `cooldown_until = max(existing, now + window)`.

use crate::config::HealthConfig;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Roughly thirty years; stands in for "never" when a duration cannot be added
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + duration`, saturating instead of overflowing
pub(crate) fn instant_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Backoff curve for cool-downs
#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    /// Consecutive retryable failures before the first cool-down
    pub failure_threshold: u32,
    /// Window applied when the threshold is first reached
    pub base_cooldown: Duration,
    /// Growth per failure beyond the threshold
    pub backoff_multiplier: f64,
    /// Cap for retryable windows (before jitter)
    pub max_cooldown: Duration,
    /// Window applied on every fatal (auth) failure
    pub auth_cooldown: Duration,
    /// Random spread (0.0 - 1.0) applied to retryable windows
    pub jitter_factor: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for HealthPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            base_cooldown: Duration::from_millis(config.base_cooldown_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_cooldown: Duration::from_millis(config.max_cooldown_ms),
            auth_cooldown: Duration::from_millis(config.auth_cooldown_ms),
            jitter_factor: config.jitter_factor,
        }
    }
}

impl HealthPolicy {
    /// Policy without jitter, for deterministic windows
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Window after `consecutive_failures` retryable failures, if any
    pub fn retryable_cooldown(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures < self.failure_threshold {
            return None;
        }

        let exponent = (consecutive_failures - self.failure_threshold).min(64) as i32;
        let base_ms = self.base_cooldown.as_millis() as f64;
        let capped = (base_ms * self.backoff_multiplier.powi(exponent))
            .min(self.max_cooldown.as_millis() as f64);

        let with_jitter = if self.jitter_factor > 0.0 {
            let spread = capped * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-spread..=spread);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Some(Duration::from_millis(with_jitter as u64))
    }
}

#[derive(Debug, Clone, Default)]
struct HealthRecord {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

/// Point-in-time view of one backend's health
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub consecutive_failures: u32,
    /// Time left in the active cool-down
    pub cooldown_remaining: Option<Duration>,
}

impl HealthSnapshot {
    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_remaining.is_some()
    }
}

/// Shared health state for all backends
#[derive(Debug, Default)]
pub struct HealthTracker {
    policy: HealthPolicy,
    records: Mutex<HashMap<String, HealthRecord>>,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, HealthRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while `now < cooldown_until`
    pub fn is_cooling_down(&self, backend: &str) -> bool {
        let now = Instant::now();
        self.records()
            .get(backend)
            .and_then(|r| r.cooldown_until)
            .is_some_and(|until| now < until)
    }

    /// Reset the failure count and clear any cool-down
    pub fn record_success(&self, backend: &str) {
        let previous = self.records().remove(backend);
        if let Some(record) = previous {
            if record.consecutive_failures > 0 {
                debug!(
                    backend,
                    failures = record.consecutive_failures,
                    "backend recovered"
                );
            }
        }
    }

    /// Count a failure and extend the cool-down when the policy says so.
    ///
    /// Returns the window applied by this failure, if any.
    pub fn record_failure(&self, backend: &str, fatal: bool) -> Option<Duration> {
        let now = Instant::now();
        let mut records = self.records();
        let record = records.entry(backend.to_string()).or_default();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);

        let window = if fatal {
            Some(self.policy.auth_cooldown)
        } else {
            self.policy.retryable_cooldown(record.consecutive_failures)
        };

        if let Some(window) = window {
            let until = instant_after(now, window);
            record.cooldown_until = Some(match record.cooldown_until {
                Some(existing) if existing > until => existing,
                _ => until,
            });
            warn!(
                backend,
                fatal,
                failures = record.consecutive_failures,
                cooldown_ms = window.as_millis() as u64,
                "backend cooling down"
            );
        }

        window
    }

    /// Make the cool-down last at least `at_least` from now.
    ///
    /// Hints longer than the auth window are cut to it.
    pub fn extend_cooldown(&self, backend: &str, at_least: Duration) {
        let at_least = at_least.min(self.policy.auth_cooldown);
        let until = instant_after(Instant::now(), at_least);
        let mut records = self.records();
        let record = records.entry(backend.to_string()).or_default();
        if record.cooldown_until.map_or(true, |existing| existing < until) {
            record.cooldown_until = Some(until);
            debug!(
                backend,
                cooldown_ms = at_least.as_millis() as u64,
                "cool-down extended by retry hint"
            );
        }
    }

    pub fn snapshot(&self, backend: &str) -> HealthSnapshot {
        let now = Instant::now();
        self.records()
            .get(backend)
            .map(|r| Self::view(r, now))
            .unwrap_or_default()
    }

    /// Snapshot of every backend with recorded state, sorted by name
    pub fn snapshot_all(&self) -> Vec<(String, HealthSnapshot)> {
        let now = Instant::now();
        let mut all: Vec<_> = self
            .records()
            .iter()
            .map(|(name, r)| (name.clone(), Self::view(r, now)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    fn view(record: &HealthRecord, now: Instant) -> HealthSnapshot {
        HealthSnapshot {
            consecutive_failures: record.consecutive_failures,
            cooldown_remaining: record
                .cooldown_until
                .filter(|until| *until > now)
                .map(|until| until - now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new(HealthPolicy::default().without_jitter())
    }

    #[test]
    fn test_backoff_curve() {
        let policy = HealthPolicy::default().without_jitter();
        assert_eq!(policy.retryable_cooldown(2), None);
        assert_eq!(policy.retryable_cooldown(3), Some(Duration::from_secs(30)));
        assert_eq!(policy.retryable_cooldown(4), Some(Duration::from_secs(60)));
        assert_eq!(policy.retryable_cooldown(5), Some(Duration::from_secs(120)));
        assert_eq!(policy.retryable_cooldown(40), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = HealthPolicy::default();
        for _ in 0..50 {
            let window = policy.retryable_cooldown(3).unwrap();
            assert!(window >= Duration::from_secs(27) && window <= Duration::from_secs(33));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_then_cooldown() {
        let health = tracker();
        assert_eq!(health.record_failure("groq", false), None);
        assert_eq!(health.record_failure("groq", false), None);
        assert!(!health.is_cooling_down("groq"));
        assert_eq!(
            health.record_failure("groq", false),
            Some(Duration::from_secs(30))
        );
        assert!(health.is_cooling_down("groq"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!health.is_cooling_down("groq"));
        assert_eq!(health.snapshot("groq").consecutive_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_cools_down_immediately() {
        let health = tracker();
        assert_eq!(
            health.record_failure("cohere", true),
            Some(Duration::from_secs(1800))
        );
        assert!(health.is_cooling_down("cohere"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_never_shorten_cooldown() {
        let health = tracker();
        health.record_failure("a", true);
        let before = health.snapshot("a").cooldown_remaining.unwrap();

        for _ in 0..3 {
            health.record_failure("a", false);
        }
        let after = health.snapshot("a").cooldown_remaining.unwrap();
        assert!(after >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let health = tracker();
        health.record_failure("a", true);
        health.record_success("a");
        assert!(!health.is_cooling_down("a"));
        assert_eq!(health.snapshot("a"), HealthSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_cooldown_is_monotonic() {
        let health = tracker();
        health.extend_cooldown("a", Duration::from_secs(90));
        health.extend_cooldown("a", Duration::from_secs(10));
        let remaining = health.snapshot("a").cooldown_remaining.unwrap();
        assert_eq!(remaining, Duration::from_secs(90));
        assert_eq!(health.snapshot("a").consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_cooldown_caps_at_auth_window() {
        let health = tracker();
        health.extend_cooldown("a", Duration::MAX);
        let remaining = health.snapshot("a").cooldown_remaining.unwrap();
        assert_eq!(remaining, health.policy().auth_cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_policy_windows_do_not_overflow() {
        let policy = HealthPolicy {
            auth_cooldown: Duration::MAX,
            max_cooldown: Duration::MAX,
            ..HealthPolicy::default().without_jitter()
        };
        let health = HealthTracker::new(policy);
        assert_eq!(health.record_failure("a", true), Some(Duration::MAX));
        assert!(health.is_cooling_down("a"));
        health.extend_cooldown("a", Duration::MAX);
        assert!(health.is_cooling_down("a"));
    }

    #[test]
    fn test_instant_after_saturates() {
        let now = Instant::now();
        assert_eq!(instant_after(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert!(instant_after(now, Duration::MAX) > now + Duration::from_secs(86_400 * 365));
    }
}

//! Per-backend request budget
//!
//! Each backend gets a concurrency cap (`max_concurrent`, queued on a tokio
//! semaphore) and an optional rolling per-minute window. A full window, or a
//! backend that reported zero remaining requests in its `x-ratelimit-*`
//! headers, refuses the attempt locally as `throttled` instead of bursting
//! past the backend's own limit.

use super::error::{retry_hint_from_secs, Failure};
use super::health::instant_after;
use super::registry::BackendDescriptor;
use reqwest::header::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Limits reported by the backend itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportedLimits {
    pub limit_requests: Option<u32>,
    pub remaining_requests: Option<u32>,
    /// When the reported window resets
    pub reset_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct BudgetState {
    sent: VecDeque<Instant>,
    reported: ReportedLimits,
}

/// Held for the duration of one attempt
#[derive(Debug)]
pub struct BudgetPermit {
    _permit: OwnedSemaphorePermit,
}

/// Request budget of one backend
#[derive(Debug)]
pub struct RequestBudget {
    semaphore: Arc<Semaphore>,
    requests_per_minute: Option<u32>,
    state: Mutex<BudgetState>,
}

impl RequestBudget {
    pub fn new(max_concurrent: u32, requests_per_minute: Option<u32>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1) as usize)),
            requests_per_minute,
            state: Mutex::new(BudgetState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a concurrency slot, then take one request from the window.
    ///
    /// Waiting is unbounded here; callers bound it and report an expired wait as throttled.
    pub async fn acquire(&self) -> Result<BudgetPermit, Failure> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Failure::throttled("request budget closed"))?;

        let now = Instant::now();
        let mut state = self.state();

        if let Some(reset_at) = state.reported.reset_at {
            if state.reported.remaining_requests == Some(0) && now < reset_at {
                return Err(Failure::throttled("backend reported no remaining requests")
                    .with_retry_after(Some(reset_at - now)));
            }
        }

        while state
            .sent
            .front()
            .is_some_and(|sent| now.duration_since(*sent) >= WINDOW)
        {
            state.sent.pop_front();
        }

        if let Some(limit) = self.requests_per_minute {
            if state.sent.len() >= limit as usize {
                let retry_after = state
                    .sent
                    .front()
                    .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)));
                return Err(
                    Failure::throttled(format!("{} requests per minute used", limit))
                        .with_retry_after(retry_after),
                );
            }
        }

        state.sent.push_back(now);
        Ok(BudgetPermit { _permit: permit })
    }

    /// Record the backend's own view of its limits
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let read = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let mut state = self.state();
        if let Some(limit) = read("x-ratelimit-limit-requests").and_then(|v| v.parse().ok()) {
            state.reported.limit_requests = Some(limit);
        }
        if let Some(remaining) = read("x-ratelimit-remaining-requests").and_then(|v| v.parse().ok())
        {
            state.reported.remaining_requests = Some(remaining);
        }
        if let Some(reset) = read("x-ratelimit-reset-requests").and_then(parse_reset_duration) {
            state.reported.reset_at = Some(instant_after(Instant::now(), reset));
        }
    }

    pub fn reported(&self) -> ReportedLimits {
        self.state().reported.clone()
    }

    /// Concurrency slots currently free
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Parse reset values such as `"1m30.5s"`, `"2.4s"`, `"250ms"` or `"12"` (seconds).
///
/// Values are capped at `MAX_RETRY_HINT`.
pub fn parse_reset_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        return retry_hint_from_secs(secs);
    }

    let mut total = 0.0f64;
    let mut number = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let amount: f64 = number.parse().ok()?;
        number.clear();
        let seconds = match c {
            'h' => amount * 3600.0,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                amount / 1000.0
            }
            'm' => amount * 60.0,
            's' => amount,
            _ => return None,
        };
        total += seconds;
    }

    if !number.is_empty() {
        return None;
    }
    retry_hint_from_secs(total)
}

/// Budgets for every backend, created on first use
#[derive(Debug, Default)]
pub struct RateLimiter {
    budgets: Mutex<HashMap<String, Arc<RequestBudget>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn budget_for(&self, descriptor: &BackendDescriptor) -> Arc<RequestBudget> {
        let mut budgets = self.budgets.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(budgets.entry(descriptor.name.clone()).or_insert_with(|| {
            Arc::new(RequestBudget::new(
                descriptor.max_concurrent,
                descriptor.requests_per_minute,
            ))
        }))
    }
}

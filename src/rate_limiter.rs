use crate::error::{ResilienceError, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-key request counter for one fixed window.
#[derive(Debug, Clone)]
struct WindowCounter {
    count: u32,
    window_reset_at_ms: u64,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    /// Seconds until the window resets, rounded up, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let now = now_ms();
        let remaining_ms = self.reset_at_ms.saturating_sub(now);
        (remaining_ms / 1000 + u64::from(remaining_ms % 1000 != 0)).max(1)
    }

    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at_ms / 1000
    }
}

/// Fixed-window request counter per key.
///
/// Windows reset lazily on access; a key with no traffic costs nothing
/// between windows. The algorithm admits the known boundary burst of up
/// to 2x the budget in a short span straddling a window boundary. That
/// is an accepted property of fixed windows, not a defect, and the test
/// suite pins it down as such.
pub struct WindowRateLimiter {
    max_requests: u32,
    window: Duration,
    counters: RwLock<HashMap<String, WindowCounter>>,
}

impl WindowRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Check against the limiter's default budget and window.
    pub fn check(&self, key: &str) -> Result<RateLimitDecision> {
        self.check_with(key, self.max_requests, self.window)
    }

    /// Check with per-call parameters, sharing the same counter table.
    pub fn check_with(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let now = now_ms();
        let window_ms = window.as_millis() as u64;

        let mut counters = self
            .counters
            .write()
            .map_err(|_| ResilienceError::LockPoisoned("rate limiter counters".to_string()))?;

        let counter = counters.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            window_reset_at_ms: now + window_ms,
        });

        if now >= counter.window_reset_at_ms {
            counter.count = 0;
            counter.window_reset_at_ms = now + window_ms;
        }

        counter.count += 1;

        Ok(RateLimitDecision {
            allowed: counter.count <= max_requests,
            remaining: max_requests.saturating_sub(counter.count),
            reset_at_ms: counter.window_reset_at_ms,
        })
    }

    /// Forget the counter for a key, starting it fresh on next check.
    pub fn reset(&self, key: &str) -> Result<()> {
        let mut counters = self
            .counters
            .write()
            .map_err(|_| ResilienceError::LockPoisoned("rate limiter counters".to_string()))?;
        counters.remove(key);
        Ok(())
    }

    /// Drop counters whose window closed more than `max_idle` ago.
    pub fn prune(&self, max_idle: Duration) -> Result<usize> {
        let now = now_ms();
        let max_idle_ms = max_idle.as_millis() as u64;

        let mut counters = self
            .counters
            .write()
            .map_err(|_| ResilienceError::LockPoisoned("rate limiter counters".to_string()))?;

        let initial = counters.len();
        counters.retain(|_, counter| now.saturating_sub(counter.window_reset_at_ms) < max_idle_ms);

        Ok(initial - counters.len())
    }

    pub fn active_windows(&self) -> Result<usize> {
        let counters = self
            .counters
            .read()
            .map_err(|_| ResilienceError::LockPoisoned("rate limiter counters".to_string()))?;
        Ok(counters.len())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

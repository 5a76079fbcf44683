//! Anonymous-tier rate limiting using a sliding window.
//!
//! State is process-local by design: replicas do not share counters, and an
//! attacker colocating across replicas receives proportionally more budget.
//! That trade-off is accepted for the anonymous trial tier.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Requests allowed per source within one window.
pub const ANONYMOUS_BUDGET: u32 = 3;
/// Window length.
pub const WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct SourceEntry {
    /// Budget remaining in the current window
    tokens: u32,
    /// Start of the current window
    window_start: Instant,
    /// Last request time, for sliding replenishment
    last_request: Instant,
}

impl SourceEntry {
    fn new(budget: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: budget,
            window_start: now,
            last_request: now,
        }
    }
}

/// Thread-safe per-source limiter.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<IpAddr, SourceEntry>,
    budget: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            budget,
            window,
        }
    }

    /// Consume one point for `source`. Returns `Err(retry_after_seconds)`
    /// when the budget is exhausted.
    pub fn check(&self, source: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(source)
            .or_insert_with(|| SourceEntry::new(self.budget));

        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.tokens = self.budget;
            entry.window_start = now;
        } else {
            // Sliding window: the budget decays back as time advances.
            let since_last = now.duration_since(entry.last_request);
            let replenish_rate = self.budget as f64 / self.window.as_secs_f64();
            let replenished = (since_last.as_secs_f64() * replenish_rate) as u32;
            entry.tokens = (entry.tokens + replenished).min(self.budget);
        }

        entry.last_request = now;

        if entry.tokens > 0 {
            entry.tokens -= 1;
            Ok(())
        } else {
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            Err(retry_after)
        }
    }

    /// Drop entries idle past two windows so the map does not grow without
    /// bound.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(ANONYMOUS_BUDGET, WINDOW)
    }
}

/// Periodically evict idle sources.
pub fn spawn_cleanup_task(limiter: Arc<RateLimiter>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            limiter.cleanup_expired();
            tracing::debug!(
                "rate limiter cleanup complete, {} sources tracked",
                limiter.entry_count()
            );
        }
    });
}

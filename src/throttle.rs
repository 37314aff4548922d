//! # Request Throttle Module
//!
//! ## Purpose
//! Per-client fixed-window admission control. Each client identifier gets an
//! independent counter that resets when its window elapses; requests beyond
//! the per-window limit are rejected without being counted.
//!
//! ## Input/Output Specification
//! - **Input**: Opaque client identifier per request
//! - **Output**: `ThrottleDecision` with remaining quota and time to reset
//! - **Guarantee**: At most `limit` admissions per client per window
//!
//! ## Key Features
//! - Lock-free shared state via sharded concurrent map
//! - Rejected requests never consume quota
//! - Periodic sweep evicts idle client entries to bound memory

use crate::config::ThrottleConfig;
use crate::errors::CorpusError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub admitted: bool,
    /// Admissions left in the current window, after this request
    pub remaining: u32,
    /// Time until the client's window resets
    pub reset_after: Duration,
}

impl ThrottleDecision {
    /// Convert a rejection into the error surfaced to callers. Admitted
    /// decisions have no error form.
    pub fn into_error(self, client: &str) -> Option<CorpusError> {
        if self.admitted {
            return None;
        }
        Some(CorpusError::RateLimited {
            client: client.to_string(),
            remaining: self.remaining,
            reset_after_seconds: self.reset_after.as_secs(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request throttle keyed by client identifier.
pub struct FixedWindowThrottle {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl FixedWindowThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            limit: config.limit,
            window: Duration::from_secs(config.window_seconds),
            windows: DashMap::new(),
        }
    }

    /// Check and count one request for `client`.
    ///
    /// An expired window is reset before evaluation, so the first request
    /// after expiry always starts a fresh window at count one. A request at
    /// the limit is rejected and does not increment the counter.
    pub fn check(&self, client: &str) -> ThrottleDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        let reset_after = entry.reset_at.saturating_duration_since(now);
        if entry.count >= self.limit {
            tracing::debug!(client, "request rejected by throttle");
            return ThrottleDecision {
                admitted: false,
                remaining: 0,
                reset_after,
            };
        }

        entry.count += 1;
        ThrottleDecision {
            admitted: true,
            remaining: self.limit - entry.count,
            reset_after,
        }
    }

    /// Drop entries whose window has fully elapsed. Idle clients otherwise
    /// accumulate one map entry forever.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| now < window.reset_at);
        before - self.windows.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Run the eviction sweep on a fixed interval until the throttle is dropped
/// by every other holder.
pub fn spawn_sweeper(throttle: Arc<FixedWindowThrottle>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if Arc::strong_count(&throttle) == 1 {
                break;
            }
            let evicted = throttle.sweep_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired throttle windows");
            }
        }
    });
}

//! Call-count rate limiter for registry requests.
//!
//! The registry tolerates bursts but throttles sustained traffic, so every
//! `calls_per_window` requests the robot backs off for a fixed pause. The
//! limiter counts individual registry calls, not institutions or queue
//! elements: one institution usually costs two calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::info;

use crate::config::RateLimitConfig;
use crate::metrics;

/// Shared call counter with a pause policy.
///
/// Call number `n` is preceded by a pause when `n > 1` and
/// `(n - 1) % calls_per_window == 0`, i.e. before calls 201, 401, ...
/// with the default window of 200.
#[derive(Debug)]
pub struct RateLimiter {
    calls_per_window: u64,
    pause: Duration,
    calls: AtomicU64,
    pauses: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter pausing for `pause` after every `calls_per_window` calls.
    ///
    /// A window of 0 disables pausing.
    pub fn new(calls_per_window: u64, pause: Duration) -> Self {
        Self {
            calls_per_window,
            pause,
            calls: AtomicU64::new(0),
            pauses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.calls_per_window, Duration::from_secs(config.pause_secs))
    }

    /// A limiter that counts calls but never pauses.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Record that a registry call is about to be made, pausing first if the
    /// previous call completed a window.
    pub async fn record_call(&self) {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.calls_per_window > 0
            && call_number > 1
            && (call_number - 1) % self.calls_per_window == 0
        {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            metrics::RATE_LIMIT_PAUSES.inc();
            info!(
                calls = call_number - 1,
                pause_secs = self.pause.as_secs(),
                "Registry call window exhausted, pausing"
            );
            tokio::time::sleep(self.pause).await;
        }
    }

    /// Number of calls recorded so far.
    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of pauses taken so far.
    pub fn pauses_taken(&self) -> u64 {
        self.pauses.load(Ordering::SeqCst)
    }
}

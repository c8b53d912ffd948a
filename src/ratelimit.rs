//! Sliding-window admission control for quota-limited services.
//!
//! One [`RateLimiter`] is built per shared quota (usually once per process)
//! and handed to every collaborator that spends that quota.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default extra delay added on top of the computed wait.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Admits at most `max_requests` calls in any trailing `time_window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    time_window: Duration,
    safety_margin: Duration,
    /// Admission timestamps, oldest first.
    admitted: Mutex<VecDeque<Instant>>,
    total_admitted: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter. A `max_requests` of zero is treated as one.
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            time_window,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            admitted: Mutex::new(VecDeque::new()),
            total_admitted: AtomicU64::new(0),
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    /// Wait until one more call fits in the window, then record it.
    ///
    /// Never rejects. The lock is released while sleeping.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();
                self.evict_expired(&mut admitted, now);

                if admitted.len() < self.max_requests {
                    admitted.push_back(now);
                    let total = self.total_admitted.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        "Rate limiter admitted call ({}/{} in window, {} total)",
                        admitted.len(),
                        self.max_requests,
                        total
                    );
                    return;
                }

                // Non-empty here since max_requests >= 1.
                let oldest = admitted.front().copied().unwrap_or(now);
                self.time_window
                    .saturating_sub(now.saturating_duration_since(oldest))
            };

            info!(
                "⏳ Rate limit reached, waiting {:.1}s before next call",
                (wait + self.safety_margin).as_secs_f64()
            );
            tokio::time::sleep(wait + self.safety_margin).await;
        }
    }

    /// Number of admissions currently inside the window.
    pub async fn in_flight_window(&self) -> usize {
        let mut admitted = self.admitted.lock().await;
        self.evict_expired(&mut admitted, Instant::now());
        admitted.len()
    }

    /// Total admissions since creation.
    pub fn total_admitted(&self) -> u64 {
        self.total_admitted.load(Ordering::Relaxed)
    }

    fn evict_expired(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.time_window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    /// 55 calls per minute, leaving headroom under a 60 RPM quota.
    fn default() -> Self {
        Self::new(55, Duration::from_secs(60))
    }
}

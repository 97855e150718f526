//! Keep-alive watchdog
//!
//! Tracks the time of the last received frame. Any frame (keep-alive, data,
//! ping, anything decodable or not) resets the deadline. Timestamps are
//! stored as milliseconds since an internal epoch so they fit an atomic u64.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub struct Watchdog {
    epoch: Instant,
    last_frame_ms: AtomicU64,
    /// `None` disables expiry
    timeout: Option<Duration>,
}

impl Watchdog {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            epoch: Instant::now(),
            last_frame_ms: AtomicU64::new(0),
            timeout,
        }
    }

    /// Record that a frame just arrived
    pub fn touch(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_frame_ms.store(ms, Ordering::Release);
    }

    /// Instant at which the watchdog fires, if enabled
    pub fn deadline(&self) -> Option<Instant> {
        let timeout = self.timeout?;
        let last = Duration::from_millis(self.last_frame_ms.load(Ordering::Acquire));
        Some(self.epoch + last + timeout)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline().is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn time_since_last_frame(&self) -> Duration {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now_ms.saturating_sub(self.last_frame_ms.load(Ordering::Acquire)))
    }
}

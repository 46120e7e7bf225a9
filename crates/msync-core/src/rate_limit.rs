//! Sliding-window rate limiting
//!
//! Providers such as MoySklad enforce per-minute ceilings that differ between
//! cheap entity requests and heavy report requests. The limiter keeps one
//! timestamp window per request class and admits a request only while the
//! trailing 60-second window holds fewer entries than the class ceiling.
//!
//! The window lives in process memory only. After a restart the window is
//! empty, which merely allows one early burst and never violates correctness.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Length of the trailing admission window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Request class for admission control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Regular entity/list requests
    Normal,
    /// Expensive report-style requests with a much lower ceiling
    Heavy,
}

/// Per-minute ceilings per request class
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub normal_per_minute: usize,
    pub heavy_per_minute: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            normal_per_minute: 45,
            heavy_per_minute: 5,
        }
    }
}

/// Sliding-window request limiter
///
/// One instance per stream (or per provider account), owned by the
/// orchestrator and passed into the client explicitly.
pub struct RateLimiter {
    limits: RateLimits,
    normal: VecDeque<Instant>,
    heavy: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            normal: VecDeque::new(),
            heavy: VecDeque::new(),
        }
    }

    /// Try to admit a request of the given class.
    ///
    /// Returns `None` when admitted (the timestamp is recorded), or
    /// `Some(wait)` with the time until the oldest window entry expires. The
    /// rejected path records nothing; callers must sleep and re-check rather
    /// than assume admission after the wait.
    pub fn admit(&mut self, class: RequestClass) -> Option<Duration> {
        let now = Instant::now();
        let ceiling = match class {
            RequestClass::Normal => self.limits.normal_per_minute,
            RequestClass::Heavy => self.limits.heavy_per_minute,
        };
        let window = match class {
            RequestClass::Normal => &mut self.normal,
            RequestClass::Heavy => &mut self.heavy,
        };

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= RATE_WINDOW)
        {
            window.pop_front();
        }

        if window.len() >= ceiling {
            let wait = window
                .front()
                .map(|oldest| RATE_WINDOW - now.duration_since(*oldest))
                .unwrap_or(RATE_WINDOW);
            return Some(wait);
        }

        window.push_back(now);
        None
    }

    /// Sleep-and-recheck until a request of the given class is admitted.
    pub async fn acquire(&mut self, class: RequestClass) {
        while let Some(wait) = self.admit(class) {
            debug!(
                class = ?class,
                wait_ms = wait.as_millis() as u64,
                "rate ceiling reached, waiting"
            );
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(normal: usize, heavy: usize) -> RateLimiter {
        RateLimiter::new(RateLimits {
            normal_per_minute: normal,
            heavy_per_minute: heavy,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_ceiling() {
        let mut rl = limiter(3, 5);

        for _ in 0..3 {
            assert!(rl.admit(RequestClass::Normal).is_none());
        }
        let wait = rl.admit(RequestClass::Normal);
        assert!(wait.is_some_and(|w| w > Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_records_nothing() {
        let mut rl = limiter(1, 5);

        assert!(rl.admit(RequestClass::Normal).is_none());
        // Repeated rejected calls must not extend the wait.
        let first = rl.admit(RequestClass::Normal).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = rl.admit(RequestClass::Normal).unwrap();
        assert!(second < first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readmission_after_window() {
        let mut rl = limiter(2, 5);

        assert!(rl.admit(RequestClass::Normal).is_none());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(rl.admit(RequestClass::Normal).is_none());
        assert!(rl.admit(RequestClass::Normal).is_some());

        // The first entry leaves the window after 60s; exactly one slot opens.
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(rl.admit(RequestClass::Normal).is_none());
        assert!(rl.admit(RequestClass::Normal).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_classes_are_independent() {
        let mut rl = limiter(1, 1);

        assert!(rl.admit(RequestClass::Normal).is_none());
        assert!(rl.admit(RequestClass::Heavy).is_none());
        assert!(rl.admit(RequestClass::Normal).is_some());
        assert!(rl.admit(RequestClass::Heavy).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_then_proceeds() {
        let mut rl = limiter(1, 5);

        rl.acquire(RequestClass::Normal).await;
        // The paused clock makes the inner sleep return instantly while still
        // advancing time past the window boundary.
        rl.acquire(RequestClass::Normal).await;

        // Two admissions more than 60s apart; window holds only the second.
        assert!(rl.admit(RequestClass::Normal).is_some());
    }
}

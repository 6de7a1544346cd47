//! Sliding-window rate limiting — admission control for the upstream lookup.
//!
//! Each client identity gets its own window of recent request timestamps.
//! On every check the window is pruned of timestamps older than the
//! configured width before counting; a client at the limit is rejected and
//! leaves no trace, an admitted client has the current instant recorded.
//!
//! The limiter is fail-closed: callers with no client identity all share
//! one [`ANONYMOUS_CLIENT`] bucket rather than bypassing the limit.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Bucket for callers that present no client identity.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Per-client sliding-window admission control.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_per_window: usize,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `max_per_window` requests per
    /// client within any `window`-wide interval.
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_per_window,
            window,
        }
    }

    /// Checks and, if admitted, records one request for `client_id`.
    ///
    /// Returns `false` when the client already has `max_per_window` requests
    /// inside the window; a rejected request is **not** recorded, so being
    /// rate-limited never extends the rejection.
    pub fn check(&self, client_id: &str) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let horizon = now.checked_sub(self.window);

        let window = windows.entry(client_id.to_owned()).or_default();
        if let Some(horizon) = horizon {
            // Strictly older than the window; a timestamp aged exactly the
            // window width still counts against the budget.
            while window.front().is_some_and(|&t| t < horizon) {
                window.pop_front();
            }
        }

        if window.len() >= self.max_per_window {
            debug!(client_id, in_window = window.len(), "rate limit rejected request");
            return false;
        }
        window.push_back(now);
        true
    }

    /// Number of requests currently counted against `client_id`.
    ///
    /// Does not prune; intended for diagnostics and tests.
    pub fn in_window(&self, client_id: &str) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(client_id)
            .map_or(0, VecDeque::len)
    }

    /// Drops every client window. Used by the engine's test-isolation reset.
    pub fn clear(&self) {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn admits_up_to_the_limit() {
        let limiter = RateLimiter::new(5, WINDOW);
        for _ in 0..5 {
            assert!(limiter.check("client-a"));
        }
        // The (N+1)-th call inside the window is rejected.
        assert!(!limiter.check("client-a"));
    }

    #[tokio::test]
    async fn rejection_is_not_recorded() {
        let limiter = RateLimiter::new(2, WINDOW);
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-a"));
        assert!(!limiter.check("client-a"));
        assert_eq!(limiter.in_window("client-a"), 2);
    }

    #[tokio::test]
    async fn clients_are_independent() {
        let limiter = RateLimiter::new(1, WINDOW);
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-b"));
        assert!(!limiter.check("client-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_elapses_and_admits_again() {
        let limiter = RateLimiter::new(5, WINDOW);
        for _ in 0..5 {
            assert!(limiter.check("client-a"));
        }
        assert!(!limiter.check("client-a"));

        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;
        assert!(limiter.check("client-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_expiry_frees_partial_budget() {
        let limiter = RateLimiter::new(2, WINDOW);
        assert!(limiter.check("client-a"));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(limiter.check("client-a"));
        assert!(!limiter.check("client-a"));

        // First timestamp ages out; the second is still inside the window.
        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(limiter.check("client-a"));
        assert!(!limiter.check("client-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn timestamp_at_exact_window_age_still_counts() {
        let limiter = RateLimiter::new(1, WINDOW);
        assert!(limiter.check("client-a"));

        tokio::time::advance(WINDOW).await;
        assert!(!limiter.check("client-a"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check("client-a"));
    }

    #[tokio::test]
    async fn anonymous_bucket_is_shared() {
        let limiter = RateLimiter::new(1, WINDOW);
        assert!(limiter.check(ANONYMOUS_CLIENT));
        assert!(!limiter.check(ANONYMOUS_CLIENT));
    }
}

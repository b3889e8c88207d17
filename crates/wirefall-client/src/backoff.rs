//! Failure bookkeeping for the persistent channel.

use std::time::{Duration, Instant};

/// Tracks the last persistent-channel failure and decides whether a new
/// connection attempt is allowed yet.
///
/// Pure state, no I/O. Invariant: once a failure is recorded, the channel is
/// not eligible again until the window has elapsed, across however many
/// calls arrive in between. This is what prevents connection-storm retries
/// against a down endpoint.
#[derive(Debug)]
pub struct BackoffController {
    window: Duration,
    last_failure_at: Option<Instant>,
}

impl BackoffController {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_failure_at: None,
        }
    }

    /// True if the channel has never failed, or the window has elapsed.
    pub fn is_eligible(&self, now: Instant) -> bool {
        match self.last_failure_at {
            None => true,
            Some(failed_at) => now.duration_since(failed_at) >= self.window,
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.last_failure_at = Some(now);
    }

    pub fn record_success(&mut self) {
        self.last_failure_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligible_before_any_failure() {
        let backoff = BackoffController::new(Duration::from_secs(30));
        assert!(backoff.is_eligible(Instant::now()));
    }

    #[test]
    fn test_not_eligible_within_window() {
        let mut backoff = BackoffController::new(Duration::from_secs(30));
        let now = Instant::now();
        backoff.record_failure(now);

        assert!(!backoff.is_eligible(now));
        assert!(!backoff.is_eligible(now + Duration::from_secs(29)));
    }

    #[test]
    fn test_eligible_after_window_elapses() {
        let mut backoff = BackoffController::new(Duration::from_secs(30));
        let now = Instant::now();
        backoff.record_failure(now);

        assert!(backoff.is_eligible(now + Duration::from_secs(30)));
    }

    #[test]
    fn test_success_clears_failure_state() {
        let mut backoff = BackoffController::new(Duration::from_secs(30));
        let now = Instant::now();
        backoff.record_failure(now);
        backoff.record_success();

        assert!(backoff.is_eligible(now));
    }

    #[test]
    fn test_new_failure_restarts_window() {
        let mut backoff = BackoffController::new(Duration::from_secs(10));
        let now = Instant::now();
        backoff.record_failure(now);
        backoff.record_failure(now + Duration::from_secs(9));

        assert!(!backoff.is_eligible(now + Duration::from_secs(12)));
        assert!(backoff.is_eligible(now + Duration::from_secs(19)));
    }
}

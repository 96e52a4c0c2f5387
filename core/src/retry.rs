//! Retry policy for outbound requests.
//!
//! A policy is a pure value: given the attempt number and what happened, it
//! says whether to return or to wait and try again. The client owns the loop;
//! this module owns the rules.

use std::time::Duration;

/// What a single attempt produced, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A response arrived with this status.
    Status(u16),
    /// Network failure or timeout.
    Transient,
    /// The request could not be sent at all; another attempt cannot help.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Return,
    RetryAfter(Duration),
}

/// Linear backoff: at most `retries + 1` attempts, waiting
/// `base_delay * attempt` after failed attempt number `attempt` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self { retries, base_delay }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Server errors are transient; client errors and everything below 400
    /// are final answers.
    pub fn is_retryable(outcome: Outcome) -> bool {
        match outcome {
            Outcome::Status(status) => status >= 500,
            Outcome::Transient => true,
            Outcome::Fatal => false,
        }
    }

    pub fn decide(&self, attempt: u32, outcome: Outcome) -> Decision {
        if !Self::is_retryable(outcome) || attempt >= self.max_attempts() {
            return Decision::Return;
        }
        Decision::RetryAfter(self.delay_for(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100))
    }

    #[test]
    fn client_errors_return_on_first_attempt() {
        for status in [400, 401, 404, 422, 499] {
            assert_eq!(policy().decide(1, Outcome::Status(status)), Decision::Return);
        }
    }

    #[test]
    fn success_returns_immediately() {
        assert_eq!(policy().decide(1, Outcome::Status(200)), Decision::Return);
        assert_eq!(policy().decide(1, Outcome::Status(304)), Decision::Return);
    }

    #[test]
    fn server_errors_retry_with_linear_delay() {
        let p = policy();
        assert_eq!(
            p.decide(1, Outcome::Status(503)),
            Decision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            p.decide(2, Outcome::Status(500)),
            Decision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            p.decide(3, Outcome::Transient),
            Decision::RetryAfter(Duration::from_millis(300))
        );
    }

    #[test]
    fn last_attempt_returns_whatever_happened() {
        let p = policy();
        assert_eq!(p.max_attempts(), 4);
        assert_eq!(p.decide(4, Outcome::Status(503)), Decision::Return);
        assert_eq!(p.decide(4, Outcome::Transient), Decision::Return);
    }

    #[test]
    fn fatal_failures_never_retry() {
        assert_eq!(policy().decide(1, Outcome::Fatal), Decision::Return);
    }

    #[test]
    fn zero_retries_means_one_attempt() {
        let p = RetryPolicy::none();
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.decide(1, Outcome::Status(500)), Decision::Return);
    }

    #[test]
    fn delays_are_non_decreasing() {
        let p = policy();
        let delays: Vec<Duration> = (1..=p.retries).map(|a| p.delay_for(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }
}

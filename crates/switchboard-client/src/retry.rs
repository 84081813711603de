//! Bounded retry with exponential backoff and full jitter.

use rand::Rng;
use std::time::Duration;
use switchboard_core::LogicalAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Attempts allowed for `action`; session-bearing and generative actions get exactly one.
    pub fn attempts_for(&self, action: LogicalAction) -> u32 {
        if action.is_idempotent() {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Upper bound of the wait after failed attempt `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full jitter: uniform in `[0, ceiling(attempt)]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.ceiling(attempt).as_millis() as u64;
        if cap == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idempotent_actions_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts_for(LogicalAction::Search), 3);
        assert_eq!(policy.attempts_for(LogicalAction::Suggest), 3);
        assert_eq!(policy.attempts_for(LogicalAction::Chat), 1);
        assert_eq!(policy.attempts_for(LogicalAction::Answer), 1);
        assert_eq!(policy.attempts_for(LogicalAction::Content), 1);
    }

    #[test]
    fn ceiling_grows_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(1), Duration::from_millis(200));
        assert_eq!(policy.ceiling(2), Duration::from_millis(400));
        assert_eq!(policy.ceiling(10), Duration::from_secs(2));
        for attempt in 1..6 {
            assert!(policy.backoff(attempt) <= policy.ceiling(attempt));
        }
    }
}

use std::time::Duration;

use creditwatch_core::config::AgentConfig;
use rand::Rng;

/// Bounded retry with exponential backoff for agent queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: u32,
    pub jitter: bool,
    pub per_attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_multiplier: 2,
            jitter: false,
            per_attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_multiplier: config.backoff_multiplier.max(1),
            jitter: config.jitter,
            per_attempt_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = u64::from(self.backoff_multiplier).saturating_pow(exponent);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms)
    }

    /// `backoff` with jitter applied, picked uniformly in `[delay/2, delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let upper = delay.as_millis() as u64;
        let lower = upper / 2;
        Duration::from_millis(rand::thread_rng().gen_range(lower..=upper))
    }

    /// Sum of the un-jittered waits between all attempts of one query.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.backoff(attempt)).sum()
    }

    /// Worst case for `queries` sequential queries, each using every attempt.
    pub fn deadline_for(&self, queries: u32) -> Duration {
        let per_query =
            self.per_attempt_timeout.saturating_mul(self.max_attempts) + self.total_backoff();
        per_query.saturating_mul(queries)
    }
}

//! Bounded-attempt retry state machine.
//!
//! The machine only decides; callers perform the wait through a
//! [`DelayPort`](crate::app::ports::DelayPort), so retry timing can be
//! asserted without real time passing.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based):
    /// `min(base_delay * backoff_factor^(retry - 1), max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = u64::from(self.backoff_factor)
            .checked_pow(exponent)
            .unwrap_or(u64::MAX);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier)).min(self.max_delay)
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: self.clone(),
            failures: 0,
        }
    }
}

/// What the caller should do after a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait `delay`, then make attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.failures
    }

    pub fn on_transient_failure(&mut self) -> RetryStep {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            RetryStep::Exhausted {
                attempts: self.failures,
            }
        } else {
            RetryStep::Retry {
                attempt: self.failures + 1,
                delay: self.policy.delay_for(self.failures),
            }
        }
    }
}

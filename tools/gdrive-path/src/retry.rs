use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::Result;

/// Total number of attempts for a call that keeps failing with a 5xx,
/// including the first one.
pub const NUM_TRIES: u32 = 3;

/// Delay to wait before the retry that follows failed attempt `n` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Linear(Duration),
    Exponential(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential(base) => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NUM_TRIES,
            backoff: Backoff::Linear(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
        }
    }

    /// Runs `op`, retrying while it fails with a transient error and attempts
    /// remain. Any other error is returned straight away. When attempts run
    /// out the last error is returned.
    pub fn call<T, F>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        op_name, attempt, attempts, e, delay
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

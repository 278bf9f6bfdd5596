//! Bounded retry for the backend handshake.
//!
//! The handshake is the only call the lifecycle retries. Attempts are capped
//! at [`MAX_HANDSHAKE_ATTEMPTS`] no matter how the policy is configured.

use std::future::Future;
use std::time::Duration;

use crate::types::Credential;

/// Hard ceiling on handshake attempts per connect.
pub const MAX_HANDSHAKE_ATTEMPTS: u32 = 3;

/// Base wait between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Largest accepted growth factor between attempts.
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// Grown delays never exceed this (or the base delay, if larger).
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_HANDSHAKE_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            backoff_factor: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Build a policy with a fixed delay. `max_attempts` is clamped to
    /// `1..=MAX_HANDSHAKE_ATTEMPTS`.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_HANDSHAKE_ATTEMPTS),
            delay,
            backoff_factor: 1.0,
        }
    }

    /// Grow the delay by `factor` after each failed attempt. Factors below
    /// 1.0 (or NaN) are treated as 1.0, factors above [`MAX_BACKOFF_FACTOR`]
    /// as the maximum.
    pub fn with_backoff(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_nan() {
            1.0
        } else {
            factor.clamp(1.0, MAX_BACKOFF_FACTOR)
        };
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.delay
    }

    /// Wait applied after attempt `attempt` (1-based) fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = self.delay.max(MAX_RETRY_DELAY);
        let exponent = attempt.saturating_sub(1).min(MAX_HANDSHAKE_ATTEMPTS) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(cap, |d| d.min(cap))
    }
}

/// One handshake try: which attempt this is, the pair being registered and
/// how long to wait if it fails.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeAttempt<'a> {
    pub number: u32,
    pub max_attempts: u32,
    pub account: &'a str,
    pub credential: &'a Credential,
    pub delay: Duration,
}

impl HandshakeAttempt<'_> {
    pub fn is_last(&self) -> bool {
        self.number >= self.max_attempts
    }
}

/// All attempts failed; carries the error from the final one.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `call` until it succeeds or the policy's attempts are used up.
///
/// Sleeps `attempt.delay` between failures. Dropping the returned future
/// stops retrying without side effects beyond calls already made.
pub async fn run_handshake<'a, T, E, F, Fut>(
    policy: &RetryPolicy,
    account: &'a str,
    credential: &'a Credential,
    mut call: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(HandshakeAttempt<'a>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut number = 1;

    loop {
        let attempt = HandshakeAttempt {
            number,
            max_attempts: policy.max_attempts(),
            account,
            credential,
            delay: policy.delay_after(number),
        };

        tracing::debug!(
            "Handshake attempt {}/{} for {}",
            attempt.number,
            attempt.max_attempts,
            account
        );

        match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt.is_last() => {
                tracing::error!(
                    "Handshake attempt {}/{} for {} failed, giving up: {}",
                    attempt.number,
                    attempt.max_attempts,
                    account,
                    e
                );
                return Err(Exhausted {
                    attempts: attempt.number,
                    last_error: e,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Handshake attempt {}/{} for {} failed, retrying in {:?}: {}",
                    attempt.number,
                    attempt.max_attempts,
                    account,
                    attempt.delay,
                    e
                );
                tokio::time::sleep(attempt.delay).await;
                number += 1;
            }
        }
    }
}

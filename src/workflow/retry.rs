//! Bounded polling for read-after-write lag
//!
//! Only the confirmation and observability loops poll. Transaction
//! submission is never retried here: a resend has to be a newly built
//! transaction, which is the caller's decision.

use crate::metrics::metrics;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    /// Doubles the delay after every attempt, capped at `max_delay_ms`
    Exponential { max_delay_ms: u64 },
}

/// Retry policy expressed as data
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of polls (including the first)
    pub max_attempts: u32,
    /// Delay after the first failed poll
    pub delay: Duration,
    pub backoff: Backoff,
    /// Jitter factor (0.0 to 1.0) applied to each delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
            backoff: Backoff::Fixed,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            jitter_factor: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential {
                max_delay_ms: max_delay.as_millis() as u64,
            },
            jitter_factor: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-based), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay_ms } => {
                let exp = attempt.saturating_sub(1).min(31);
                let scaled = self.delay.saturating_mul(1u32 << exp);
                scaled.min(Duration::from_millis(max_delay_ms))
            }
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let base_ms = base.as_millis() as f64;
        let range = base_ms * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-range..=range);
        Duration::from_millis((base_ms + jitter).max(0.0) as u64)
    }
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    /// Not there yet; the reason is kept for the final report
    Pending(String),
}

/// Why polling ended without a ready value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// Every attempt came back pending
    Exhausted { attempts: u32, last_reason: String },
    /// A poll failed in a way waiting will not fix
    Aborted { attempts: u32, error: E },
}

/// Poll until ready, at most `policy.max_attempts` times.
///
/// Returns the ready value and the attempt it arrived on. No delay follows
/// the final attempt.
pub async fn poll_until<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut check: F,
) -> Result<(T, u32), PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
    E: Display,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::from("no attempt made");

    for attempt in 1..=max_attempts {
        metrics().poll_attempts.inc();
        match check(attempt).await {
            Ok(PollStatus::Ready(value)) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Ready after retry"
                    );
                }
                return Ok((value, attempt));
            }
            Ok(PollStatus::Pending(reason)) => {
                last_reason = reason;
            }
            Err(error) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "Permanent error, not retrying"
                );
                return Err(PollError::Aborted {
                    attempts: attempt,
                    error,
                });
            }
        }

        if attempt < max_attempts {
            let delay = policy.jittered(policy.delay_for(attempt));
            debug!(
                operation = operation_name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %last_reason,
                "Not ready, waiting before next attempt"
            );
            sleep(delay).await;
        }
    }

    warn!(
        operation = operation_name,
        attempts = max_attempts,
        reason = %last_reason,
        "All attempts exhausted"
    );
    Err(PollError::Exhausted {
        attempts: max_attempts,
        last_reason,
    })
}

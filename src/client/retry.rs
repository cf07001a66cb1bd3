// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Timeout-bounded retry loop shared by every [`Transport`](super::Transport).
//!
//! Each attempt runs under the per-attempt timeout, clipped to whatever is
//! left of the overall budget. Retryable failures (see
//! [`Error::is_retryable`]) sleep with exponential backoff and try again until
//! the overall budget runs out, which is reported as [`Error::Timeout`].
//! Cancellation interrupts both the attempt and the backoff sleep.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff parameters for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Timeout budget of one logical operation.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// All attempts combined. `None` means unbounded.
    pub overall: Option<Duration>,
    /// One attempt.
    pub attempt: Duration,
}

/// Run `attempt` until it succeeds, fails permanently, runs out of budget or is cancelled.
///
/// `attempt` receives the 1-based attempt number.
pub async fn execute_with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    budget: Budget,
    cancel_token: &CancellationToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // A zero attempt budget times out every attempt and never ends an
    // unbounded retry loop.
    if budget.attempt.is_zero() {
        return Err(Error::Config(format!(
            "{}: attempt timeout must be positive",
            label
        )));
    }

    let start = Instant::now();
    let deadline = budget.overall.map(|overall| start + overall);
    let mut attempts: u32 = 0;

    loop {
        if cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        attempts += 1;

        let attempt_budget = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(budget_exhausted(label, start, None));
                }
                budget.attempt.min(remaining)
            }
            None => budget.attempt,
        };

        debug!("{} (attempt {}, budget {:?})", label, attempts, attempt_budget);

        let outcome = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("{} cancelled during attempt {}", label, attempts);
                return Err(Error::Cancelled);
            }
            outcome = timeout(attempt_budget, attempt(attempts)) => outcome,
        };

        let error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout {
                elapsed: attempt_budget,
                message: format!("{} attempt {} timed out", label, attempts),
            },
        };

        if !error.is_retryable() {
            return Err(error);
        }

        let delay = policy.backoff(attempts);
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                return Err(budget_exhausted(label, start, Some(&error)));
            }
        }

        warn!(
            "{} failed (attempt {}): {}, retrying in {:?}",
            label, attempts, error, delay
        );

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("{} cancelled during backoff", label);
                return Err(Error::Cancelled);
            }
            _ = sleep(delay) => {}
        }
    }
}

fn budget_exhausted(label: &str, start: Instant, last_error: Option<&Error>) -> Error {
    let message = match last_error {
        Some(e) => format!("{} exhausted its timeout budget, last error: {}", label, e),
        None => format!("{} exhausted its timeout budget", label),
    };
    Error::Timeout {
        elapsed: start.elapsed(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn budget(overall: Option<u64>, attempt: u64) -> Budget {
        Budget {
            overall: overall.map(Duration::from_secs),
            attempt: Duration::from_secs(attempt),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(5), Duration::from_secs(16));
        assert_eq!(policy.backoff(30), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = execute_with_retry(
            "test",
            &RetryPolicy::default(),
            budget(Some(60), 16),
            &CancellationToken::new(),
            move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::Transport("connection reset".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = execute_with_retry(
            "test",
            &RetryPolicy::default(),
            budget(None, 16),
            &CancellationToken::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Unauthorized { status: 403 }) }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Unauthorized { status: 403 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried_until_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = execute_with_retry(
            "test",
            &RetryPolicy::default(),
            budget(Some(40), 16),
            &CancellationToken::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending()
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        // 16s + 1s backoff + 16s + 2s backoff leaves 5s for a clipped third attempt.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempt_timeout_is_rejected() {
        for overall in [None, Some(60)] {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);

            let result: Result<()> = execute_with_retry(
                "test",
                &RetryPolicy::default(),
                budget(overall, 0),
                &CancellationToken::new(),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
            )
            .await;

            assert!(matches!(result, Err(Error::Config(_))), "{result:?}");
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_attempt() {
        let cancel_token = CancellationToken::new();
        let trigger = cancel_token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<()> = execute_with_retry(
            "test",
            &RetryPolicy::default(),
            budget(None, 16),
            &cancel_token,
            |_| std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_attempt() {
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        let result: Result<()> = execute_with_retry(
            "test",
            &RetryPolicy::default(),
            budget(None, 16),
            &cancel_token,
            |_| async { Err(Error::Internal("attempt must not run".into())) },
        )
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

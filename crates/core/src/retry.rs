//! Bounded backoff policies for calls that race concurrent mutations of the
//! same cluster object.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::PipelineResult;

/// Strategy deciding how long to wait before the next attempt.
///
/// `attempt` counts the retries already made, starting at 0. Returning `None`
/// stops the loop and surfaces the last error.
pub trait BackoffPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Fixed interval with a hard ceiling on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantBackoff {
    pub interval: Duration,
    pub max_retries: u32,
}

impl ConstantBackoff {
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
        }
    }
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_retries: 10,
        }
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_retries).then_some(self.interval)
    }
}

/// Exponential backoff with jitter, capped both in interval and in retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Random jitter range (0.0-1.0) applied around the computed interval
    pub jitter_factor: f64,
    pub max_retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_retries: 5,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let base = self.initial_interval.as_secs_f64();
        let capped = (base * self.multiplier.powi(attempt as i32))
            .min(self.max_interval.as_secs_f64());
        let jitter = capped * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        Some(Duration::from_secs_f64((capped + jitter).max(0.0)))
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy gives
/// up. Only errors reporting `is_retryable()` are retried.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &dyn BackoffPolicy,
    operation_name: &str,
    mut operation: F,
) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => match policy.next_delay(attempt) {
                Some(delay) => {
                    debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "Giving up after exhausting retries"
                    );
                    return Err(err);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_retries: u32) -> ConstantBackoff {
        ConstantBackoff::new(Duration::ZERO, max_retries)
    }

    #[test]
    fn test_constant_backoff_ceiling() {
        let policy = ConstantBackoff::new(Duration::from_millis(100), 3);
        assert_eq!(policy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = ExponentialBackoff {
            jitter_factor: 0.0,
            ..ExponentialBackoff::default()
        };
        assert_eq!(policy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_millis(1600)));
        assert_eq!(policy.next_delay(5), None);

        let long = ExponentialBackoff {
            jitter_factor: 0.0,
            max_retries: 20,
            ..ExponentialBackoff::default()
        };
        assert_eq!(long.next_delay(15), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&instant(5), "patch", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(PipelineError::Conflict("stale resource version".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_ceiling() {
        let calls = AtomicU32::new(0);
        let result: PipelineResult<()> = retry_with_backoff(&instant(3), "patch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Conflict("still conflicting".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_not_found() {
        let calls = AtomicU32::new(0);
        let result: PipelineResult<()> = retry_with_backoff(&instant(10), "patch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::not_found("workflow", "wf-1"))
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

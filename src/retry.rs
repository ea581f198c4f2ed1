use std::future::Future;
use std::time::Duration;

use crate::error::SlidecastResult;

/// Exponential backoff policy for transient upstream failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 means up to 4 attempts total).
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Delay multiplier applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given 0-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_delay = Duration::from_secs(30);
        let delay_ms =
            (self.base_delay.as_millis() as f64) * self.multiplier.powi(attempt.min(16) as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(max_delay)
    }
}

/// Run `op` until it succeeds or the policy is exhausted; the final error is
/// surfaced, not swallowed.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> SlidecastResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SlidecastResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::SlidecastError;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delays_double_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 20,
            base_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(12), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SlidecastError::synthesis("transient"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_final_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result: SlidecastResult<()> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SlidecastError::synthesis("still down")) }
        })
        .await;
        assert!(matches!(result, Err(SlidecastError::Synthesis(_))));
        // 1 initial attempt + 3 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}

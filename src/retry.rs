use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Fixed-delay retry policy for fallible operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total invocations, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// All attempts failed. Callers must treat this as "the operation produced
/// nothing" and decide explicitly what that means for them.
#[derive(Debug, Error)]
#[error("{operation} gave up after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    pub operation: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Invokes `op` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between attempts. Each failure is logged.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> std::result::Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                error!("{} failed on attempt {}: {}", operation, attempt, e);
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    info!("Retrying {} in {:?}...", operation, policy.delay);
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    warn!(
        "{} reached maximum retry count of {}",
        operation, policy.max_attempts
    );
    Err(RetryExhausted {
        operation: operation.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScraperError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_on_final_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(policy(3), "flaky_op", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ScraperError::Fetch(format!("attempt {n} failed")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: std::result::Result<(), _> = with_retry(policy(3), "doomed_op", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ScraperError::Fetch("always fails".to_string()))
            }
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.operation, "doomed_op");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_attempt_success_invokes_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(policy(5), "steady_op", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

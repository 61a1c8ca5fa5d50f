use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ProvisionError;
use crate::models::RetryPolicy;

/// Waits between attempts. Injected so tests can run retries without real time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt cap is reached.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation: &str,
    mut op: F,
) -> Result<T, ProvisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProvisionError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation, attempt, max_attempts, delay, e
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use calendar_sync_cell::error::ProviderError;

    use super::*;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_with_backoff() {
        let sleeper = RecordingSleeper::default();
        let calls = &AtomicU32::new(0);

        let result = retry_with_backoff(&RetryPolicy::default(), &sleeper, "create calendar", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProvisionError::Provider(ProviderError::RateLimited("slow down".into())))
            } else {
                Ok("cal-1")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "cal-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_cap() {
        let sleeper = RecordingSleeper::default();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&RetryPolicy::default(), &sleeper, "create calendar", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisionError::Provider(ProviderError::Timeout("deadline".into())))
        })
        .await;

        assert_matches!(result, Err(ProvisionError::Provider(ProviderError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_failures_are_not_retried() {
        let sleeper = RecordingSleeper::default();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&RetryPolicy::default(), &sleeper, "create calendar", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisionError::Provider(ProviderError::InvalidRequest("invalid email".into())))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }
}

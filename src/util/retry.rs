use crate::storage::error::StorageError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        StorageError::is_retryable(self)
    }
}

/// Retry `operation` on retryable errors, at most `max_retries` extra attempts.
///
/// Backoff doubles from `base_backoff` (capped at 2^10 multiples).
pub async fn retry_with_backoff<F, Fut, T, E>(
    max_retries: usize,
    base_backoff: Duration,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                warn!(
                    "Retryable error in {} (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    max_retries,
                    e
                );
                tokio::time::sleep(base_backoff * (1u32 << attempt.min(10))).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error, retryable={}", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    const NO_WAIT: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let result = retry_with_backoff(3, NO_WAIT, "op", || async {
            Ok::<i32, TestError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_success_after_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(5, NO_WAIT, "op", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { retryable: true })
                } else {
                    Ok(100)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 100);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(5, NO_WAIT, "op", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, TestError>(TestError { retryable: false })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_max_retries_exceeded() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(3, NO_WAIT, "op", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, TestError>(TestError { retryable: true })
            }
        })
        .await;

        assert!(result.is_err());
        // max_retries + 1 attempts
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_zero_max_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(0, NO_WAIT, "op", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, TestError>(TestError { retryable: true })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exponential_backoff() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let start = tokio::time::Instant::now();

        let result = retry_with_backoff(2, Duration::from_millis(100), "op", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { retryable: true })
                } else {
                    Ok(400)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 400);
        // 100ms + 200ms of backoff on the paused clock
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}

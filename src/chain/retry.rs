//! Exponential backoff for transient RPC errors, per spec §4.1: base 200ms,
//! factor 2, cap 5s, max 5 attempts. Logical errors are never retried here.

use std::future::Future;
use std::time::Duration;

use super::ChainError;

const BASE_DELAY: Duration = Duration::from_millis(200);
const FACTOR: u32 = 2;
const CAP: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 5;

pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY
                    .saturating_mul(FACTOR.saturating_pow(attempt - 1))
                    .min(CAP);
                tracing::debug!(attempt, ?delay, error = %err, "retrying transient chain error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ChainError> = with_retry(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ChainError::Transport("boom".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_logical_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ChainError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ChainError::Logical("revert".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ChainError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ChainError::Transport("always".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}

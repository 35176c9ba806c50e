//! Fail-open utilities for graceful degradation
//!
//! Use these where a failure must never stop a run: reading prior results,
//! closing the browser, draining late observations.
//!
//! DO NOT use fail-open for:
//! - Writing results (a failed write must surface)
//! - Fetching the listing (the run has nothing to do without it)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// ```no_run
/// use scout_core::fail_open::fail_open;
/// use scout_core::Result;
///
/// async fn close_browser() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let closed = fail_open("browser_close", || close_browser()).await;
///     // closed is None if close_browser() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`] but substitutes `T::default()` on failure
pub async fn fail_open_or_default<F, Fut, T>(operation_name: &str, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: Default,
{
    fail_open(operation_name, f).await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScoutError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, ScoutError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(ScoutError::Other("test error".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_or_default() {
        let records: Vec<u32> = fail_open_or_default("load", || async {
            Err(ScoutError::Storage("corrupt".to_string()))
        })
        .await;
        assert!(records.is_empty());

        let records: Vec<u32> =
            fail_open_or_default("load", || async { Ok(vec![1, 2]) }).await;
        assert_eq!(records, vec![1, 2]);
    }
}

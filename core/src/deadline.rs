//! Caller-imposed deadlines.
//!
//! Services open their unit of work inside the future they return, so when the deadline
//! fires the future is dropped together with the open transaction. Nothing it wrote
//! becomes visible.

use crate::error::{FulfillmentError, Result};
use crate::metrics::FulfillmentMetrics;
use std::future::Future;
use std::time::Duration;

/// Run `operation`, failing with [`FulfillmentError::Timeout`] once `deadline` elapses.
///
/// # Errors
///
/// Returns [`FulfillmentError::Timeout`] on expiry, otherwise whatever `operation` returns.
///
/// # Example
///
/// ```ignore
/// let outcome = with_deadline(Duration::from_secs(2), service.create_auto(order_id)).await;
/// ```
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Ok(outcome) = tokio::time::timeout(deadline, operation).await {
        outcome
    } else {
        FulfillmentMetrics::record_timeout();
        tracing::warn!(deadline_ms = deadline.as_millis(), "Operation deadline expired");
        Err(FulfillmentError::Timeout(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let outcome = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(outcome, Ok(7));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let outcome: Result<()> = with_deadline(Duration::from_secs(1), async {
            Err(FulfillmentError::InvalidQuantity)
        })
        .await;
        assert_eq!(outcome, Err(FulfillmentError::InvalidQuantity));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_yields_timeout() {
        let deadline = Duration::from_millis(50);
        let outcome: Result<()> = with_deadline(deadline, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(outcome, Err(FulfillmentError::Timeout(deadline)));
    }
}

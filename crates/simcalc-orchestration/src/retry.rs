//! Bounded retry for bookkeeping writes.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use simcalc_core::error::CalcError;

/// Run `op`, retrying exactly once after `backoff` if it fails.
///
/// Returns whether either attempt succeeded. A second failure is logged
/// and swallowed: the calculation itself may have succeeded, so a
/// bookkeeping failure must never surface as a calculation error.
pub async fn with_one_retry<F, Fut>(operation: &str, entity: &str, backoff: Duration, mut op: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), CalcError>>,
{
    match op().await {
        Ok(()) => return true,
        Err(e) => warn!(
            operation,
            entity,
            attempt = 1,
            error = %e,
            "Persistence failed, retrying once"
        ),
    }

    tokio::time::sleep(backoff).await;

    match op().await {
        Ok(()) => {
            info!(operation, entity, attempt = 2, "Persistence succeeded on retry");
            true
        }
        Err(e) => {
            error!(
                operation,
                entity,
                attempt = 2,
                error = %e,
                "Persistence failed after retry, giving up"
            );
            false
        }
    }
}

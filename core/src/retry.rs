// core/src/retry.rs

use crate::error::EngineResult;
use std::future::Future;
use tracing::warn;

/// Runs `op`, and runs it once more when the first attempt fails with a
/// retryable conflict. A second conflict is returned to the caller.
pub async fn retry_once_on_conflict<T, F, Fut>(operation: &str, mut op: F) -> EngineResult<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = EngineResult<T>>,
{
  match op().await {
    Err(e) if e.is_retryable() => {
      warn!(%operation, error = %e, "Conflict detected, retrying once.");
      op().await
    }
    other => other,
  }
}

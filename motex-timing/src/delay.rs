use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Terminal outcome of a suspension point whose token was cancelled.
///
/// Not a failure: callers clean up and propagate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sleeps for `duration` unless `cancel` fires first.
///
/// An already-cancelled token returns immediately without sleeping.
pub async fn delay(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

pub async fn delay_ms(ms: u64, cancel: &CancellationToken) -> Result<(), Cancelled> {
    delay(Duration::from_millis(ms), cancel).await
}

//! Time sources injected into the pipeline for deterministic tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use super::cancel::CancellationToken;
use super::error::OperationalError;

/// Monotonic and wall-clock time.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> Instant;

    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cancellable delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration` or until `signal` is cancelled, whichever is first.
    async fn delay(
        &self,
        duration: Duration,
        signal: &CancellationToken,
    ) -> Result<(), OperationalError>;
}

/// Clock backed by tokio's time driver (honours `tokio::time::pause`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn delay(
        &self,
        duration: Duration,
        signal: &CancellationToken,
    ) -> Result<(), OperationalError> {
        if signal.is_cancelled() {
            return Err(OperationalError::Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(OperationalError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

use std::{future::Future, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{PlayError, PlayResult};

/// Time source for reload pacing and live-edge positioning.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for `duration`, or fail with [`PlayError::Interrupted`] as soon as `cancel` fires.
    fn sleep(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PlayResult<()>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> PlayResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PlayError::Interrupted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Virtual clock. Sleeping returns immediately and moves time forward by the slept duration.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualClockState>,
}

#[derive(Debug)]
struct ManualClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualClockState {
                now: start,
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let Ok(delta) = chrono::Duration::from_std(duration) else {
            return;
        };
        if let Ok(mut state) = self.inner.lock() {
            if let Some(now) = state.now.checked_add_signed(delta) {
                state.now = now;
            }
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .map(|state| state.sleeps.clone())
            .unwrap_or_default()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner
            .lock()
            .map(|state| state.now)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> PlayResult<()> {
        if cancel.is_cancelled() {
            return Err(PlayError::Interrupted);
        }
        if let Ok(mut state) = self.inner.lock() {
            state.sleeps.push(duration);
        }
        self.advance(duration);
        Ok(())
    }
}

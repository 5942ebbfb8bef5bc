use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::Error;

/// Deadline-bounded ticker shared by every polling loop.
///
/// `wait` suspends until the next tick, or until the deadline when that comes
/// first, so the caller always gets one last attempt at the deadline itself.
/// Once the deadline has passed `wait` fails with `Error::Timeout`. Firing the
/// cancellation token makes both `wait` and `guard` fail with
/// `Error::Cancelled`.
pub struct Poller {
    operation: String,
    deadline: Instant,
    ticker: Interval,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        operation: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Self {
        let start = Instant::now();
        let mut ticker = tokio::time::interval_at(start + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Poller {
            operation: operation.into(),
            deadline: start + timeout,
            ticker,
            cancel: cancel.clone(),
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub async fn wait(&mut self) -> Result<(), Error> {
        if self.expired() {
            return Err(Error::Timeout(self.operation.clone()));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(self.operation.clone())),
            _ = self.ticker.tick() => Ok(()),
            _ = tokio::time::sleep_until(self.deadline) => Ok(()),
        }
    }

    /// Run one attempt, aborting it if the cancellation token fires first.
    pub async fn guard<T, F>(&self, attempt: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        cancellable(&self.cancel, &self.operation, attempt).await
    }
}

pub async fn cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &str,
    attempt: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(operation.to_string())),
        result = attempt => result,
    }
}

/// A fixed delay that still honours cancellation.
pub async fn settle(
    cancel: &CancellationToken,
    operation: &str,
    delay: Duration,
) -> Result<(), Error> {
    cancellable(cancel, operation, async {
        tokio::time::sleep(delay).await;
        Ok(())
    })
    .await
}

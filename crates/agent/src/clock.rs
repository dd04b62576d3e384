use std::time::Duration;

use teeclaim_core::{Error, Result};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Sleep unless the run is cancelled first.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    pause_until(Instant::now() + duration, cancel).await
}

pub(crate) async fn pause_until(at: Instant, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep_until(at) => Ok(()),
    }
}

/// Rate limiter for repetitive status lines.
#[derive(Debug)]
pub(crate) struct Throttle {
    every: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(every: Duration) -> Self {
        Self { every, last: None }
    }

    /// True at most once per interval; the first call always passes.
    pub(crate) fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.every => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

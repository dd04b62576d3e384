use std::time::Duration;

use teeclaim_core::config::TimingConfig;
use teeclaim_core::{PortalDriver, Result, RowRef, TeeRow};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::pause;

/// First row, in display order, with at least `threshold` empty seats.
pub fn first_qualifying(rows: &[TeeRow], threshold: u8) -> Option<&TeeRow> {
    rows.iter().find(|r| r.empty_seats >= threshold)
}

/// A scanned row. Advisory only: the seat count may be stale by the time
/// the row is acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHandle {
    pub row: RowRef,
    pub observed_seats: u8,
    pub observed_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(RowHandle),
    /// Attempt budget spent without a qualifying row.
    Exhausted { attempts: u32 },
    /// The caller's stop condition fired between scans.
    Stopped,
}

/// Scans against one attempt budget. The budget is shared by every `find`
/// on the same scanner, so a rescan after a refused row continues the count.
#[derive(Debug, Clone)]
pub struct SlotScanner {
    attempts: u32,
    used: u32,
    backoff: Duration,
}

impl SlotScanner {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            used: 0,
            backoff,
        }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.scan_attempts, timing.scan_backoff())
    }

    pub fn remaining(&self) -> u32 {
        self.attempts - self.used
    }

    /// Scan until a row qualifies, refreshing the tee sheet between scans.
    /// Rows labelled in `skip` are passed over. `stop` is checked before
    /// every scan.
    pub async fn find(
        &mut self,
        driver: &dyn PortalDriver,
        threshold: u8,
        skip: &[String],
        cancel: &CancellationToken,
        stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<ScanOutcome> {
        while self.used < self.attempts {
            if stop() {
                return Ok(ScanOutcome::Stopped);
            }
            self.used += 1;
            let attempt = self.used;
            match driver.scan_rows().await {
                Ok(rows) => {
                    let candidates: Vec<TeeRow> = rows
                        .into_iter()
                        .filter(|r| !skip.contains(&r.row.label))
                        .collect();
                    if let Some(found) = first_qualifying(&candidates, threshold) {
                        debug!(
                            row = %found.row.label,
                            empty_seats = found.empty_seats,
                            attempt,
                            "Qualifying row found"
                        );
                        return Ok(ScanOutcome::Found(RowHandle {
                            row: found.row.clone(),
                            observed_seats: found.empty_seats,
                            observed_at: Instant::now(),
                        }));
                    }
                    debug!(rows = candidates.len(), threshold, attempt, "No qualifying row");
                }
                Err(e) => warn!(error = %e, attempt, "Tee sheet scan failed"),
            }

            if self.used < self.attempts {
                pause(self.backoff, cancel).await?;
                if let Err(e) = driver.refresh_tee_sheet().await {
                    warn!(error = %e, "Tee sheet refresh failed");
                }
            }
        }
        Ok(ScanOutcome::Exhausted {
            attempts: self.used,
        })
    }
}

//! Reservation Session Controller: one bounded-time booking attempt, from
//! Book Group on a scanned row to a confirmed (or abandoned) booking.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use teeclaim_core::config::TimingConfig;
use teeclaim_core::{
    AgentEvent, Confirmation, Error, FailureKind, PortalDriver, ReservationTarget, RowAcquisition,
    RunRecorder, TargetKind,
};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scanner::RowHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    /// Book Group refused the row: seats gone or locked by someone else.
    RowUnavailable(String),
    /// A partner could not be added after one retry.
    RosterFill(String),
    /// The portal refused the confirmation.
    Rejected(String),
    Navigation(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Confirmed(String),
    Aborted(AbortReason),
    /// Not enough countdown left to finish.
    Timeout(String),
}

impl AttemptOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, AttemptOutcome::Confirmed(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttemptOutcome::Confirmed(_) => None,
            AttemptOutcome::Timeout(_) => Some(FailureKind::ConfirmationTimeout),
            AttemptOutcome::Aborted(reason) => Some(match reason {
                AbortReason::RowUnavailable(_) => FailureKind::RowUnavailable,
                AbortReason::RosterFill(_) => FailureKind::RosterFill,
                AbortReason::Rejected(_) => FailureKind::Rejected,
                AbortReason::Navigation(_) => FailureKind::Navigation,
                AbortReason::Cancelled => FailureKind::Cancelled,
            }),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            AttemptOutcome::Confirmed(text) | AttemptOutcome::Timeout(text) => text.clone(),
            AttemptOutcome::Aborted(AbortReason::Cancelled) => "cancelled".to_string(),
            AttemptOutcome::Aborted(
                AbortReason::RowUnavailable(text)
                | AbortReason::RosterFill(text)
                | AbortReason::Rejected(text)
                | AbortReason::Navigation(text),
            ) => text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReservationAttempt {
    pub target: TargetKind,
    pub required_slots: u8,
    pub row: RowHandle,
    pub partners_to_add: Vec<String>,
    /// End of the portal's reservation countdown. Set once the row is held.
    pub deadline: Option<Instant>,
    /// Partners verified on the reservation page, in order.
    pub added: Vec<String>,
    pub outcome: Option<AttemptOutcome>,
}

impl ReservationAttempt {
    pub fn new(target: &ReservationTarget, row: RowHandle, partners_to_add: Vec<String>) -> Self {
        Self {
            target: target.kind,
            required_slots: target.required_slots,
            row,
            partners_to_add,
            deadline: None,
            added: Vec::new(),
            outcome: None,
        }
    }
}

enum StepFailure {
    Expired,
    Cancelled,
    Failed(Error),
}

/// True when the partner input shows a resolved name rather than the raw
/// member number that was typed.
pub fn looks_resolved(displayed: &str, member_number: &str) -> bool {
    let shown = displayed.trim();
    !shown.is_empty() && shown != member_number && shown.chars().any(char::is_alphabetic)
}

pub struct ReservationController {
    member: String,
    countdown: Duration,
    safety_margin: Duration,
    step_timeout: Duration,
    autocomplete_timeout: Duration,
    recorder: Arc<dyn RunRecorder>,
}

impl ReservationController {
    pub fn new(member: &str, timing: &TimingConfig, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            member: member.to_string(),
            countdown: timing.reservation_countdown(),
            safety_margin: timing.safety_margin(),
            step_timeout: timing.step_timeout(),
            autocomplete_timeout: timing.autocomplete_timeout(),
            recorder,
        }
    }

    /// Run the attempt to completion. A held row that is not confirmed is
    /// handed back to the portal before returning.
    pub async fn run(
        &self,
        driver: &dyn PortalDriver,
        attempt: &mut ReservationAttempt,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let outcome = self.drive(driver, attempt, cancel).await;
        match &outcome {
            AttemptOutcome::Confirmed(text) => {
                info!(
                    member = %self.member,
                    target = %attempt.target,
                    row = %attempt.row.row.label,
                    partners = ?attempt.added,
                    confirmation = %text,
                    "Booking confirmed"
                );
            }
            failed => {
                warn!(
                    member = %self.member,
                    target = %attempt.target,
                    row = %attempt.row.row.label,
                    outcome = ?failed,
                    "Reservation attempt failed"
                );
                if attempt.deadline.is_some() {
                    self.abandon(driver).await;
                }
            }
        }
        let label = format!(
            "{}_{}",
            attempt.target,
            if outcome.is_confirmed() { "confirmed" } else { "failed" }
        );
        self.snapshot(driver, &label).await;
        attempt.outcome = Some(outcome.clone());
        outcome
    }

    async fn drive(
        &self,
        driver: &dyn PortalDriver,
        attempt: &mut ReservationAttempt,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        // 1. Book Group re-checks the seats; the scan result is only a hint.
        let acquired = self
            .bounded(
                Instant::now() + self.step_timeout,
                cancel,
                driver.click_book_group(&attempt.row.row, attempt.required_slots),
            )
            .await;
        match acquired {
            Ok(RowAcquisition::Acquired) => {}
            Ok(RowAcquisition::Unavailable(reason)) => {
                return AttemptOutcome::Aborted(AbortReason::RowUnavailable(reason));
            }
            Err(StepFailure::Cancelled) => return AttemptOutcome::Aborted(AbortReason::Cancelled),
            Err(StepFailure::Expired) => {
                return AttemptOutcome::Aborted(AbortReason::Navigation(
                    "book group did not respond".to_string(),
                ));
            }
            Err(StepFailure::Failed(e)) => {
                return AttemptOutcome::Aborted(AbortReason::Navigation(e.to_string()));
            }
        }
        let deadline = Instant::now() + self.countdown;
        attempt.deadline = Some(deadline);
        info!(
            member = %self.member,
            target = %attempt.target,
            row = %attempt.row.row.label,
            countdown_secs = self.countdown.as_secs(),
            "Row held, countdown running"
        );

        // 2. Never book the pre-set group.
        if let Some(out) = self.guard(deadline, "partner prompt", Duration::ZERO) {
            return out;
        }
        if let Err(f) = self
            .bounded(self.step_until(deadline), cancel, driver.decline_partner_prompt())
            .await
        {
            return self.step_failed(f, deadline, "partner prompt");
        }

        // 3. Partners one by one. Each must leave time for the ones after it.
        let partners = attempt.partners_to_add.clone();
        let mut spent = Duration::ZERO;
        for (i, partner) in partners.iter().enumerate() {
            let reserve = if i == 0 {
                Duration::ZERO
            } else {
                spent / i as u32 * (partners.len() - i) as u32
            };
            if let Some(out) = self.guard(deadline, &format!("partner {}", partner), reserve) {
                return out;
            }
            let started = Instant::now();
            if let Err(out) = self
                .add_partner(driver, attempt.target, partner, deadline, cancel)
                .await
            {
                return out;
            }
            spent += started.elapsed();
            attempt.added.push(partner.clone());
        }

        // 4. Confirm only a complete roster.
        if let Some(out) = self.guard(deadline, "confirmation", Duration::ZERO) {
            return out;
        }
        match self.bounded(deadline, cancel, driver.confirm_booking()).await {
            Ok(Confirmation::Confirmed(text)) => AttemptOutcome::Confirmed(text),
            Ok(Confirmation::Rejected(text)) => AttemptOutcome::Aborted(AbortReason::Rejected(text)),
            Err(StepFailure::Expired) => {
                AttemptOutcome::Timeout("countdown ran out during confirmation".to_string())
            }
            Err(StepFailure::Cancelled) => AttemptOutcome::Aborted(AbortReason::Cancelled),
            Err(StepFailure::Failed(e)) => AttemptOutcome::Aborted(AbortReason::Navigation(e.to_string())),
        }
    }

    /// Search, select and verify one partner, retrying once.
    async fn add_partner(
        &self,
        driver: &dyn PortalDriver,
        target: TargetKind,
        partner: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), AttemptOutcome> {
        let mut last = String::new();
        for try_no in 1..=2u32 {
            if try_no > 1 {
                if let Some(out) = self.guard(deadline, &format!("partner {} retry", partner), Duration::ZERO) {
                    return Err(out);
                }
            }
            match self.try_partner(driver, partner, deadline, cancel).await {
                Ok(displayed) if looks_resolved(&displayed, partner) => {
                    debug!(member = %self.member, partner, %displayed, "Partner added");
                    self.recorder.record(
                        &self.member,
                        &AgentEvent::PartnerAdded {
                            target,
                            member_number: partner.to_string(),
                            displayed,
                        },
                    );
                    return Ok(());
                }
                Ok(displayed) => last = format!("input shows '{}'", displayed),
                Err(StepFailure::Cancelled) => {
                    return Err(AttemptOutcome::Aborted(AbortReason::Cancelled));
                }
                Err(StepFailure::Expired) if Instant::now() >= deadline => {
                    return Err(AttemptOutcome::Timeout(format!(
                        "countdown ran out adding partner {}",
                        partner
                    )));
                }
                Err(StepFailure::Expired) => last = "autocomplete timed out".to_string(),
                Err(StepFailure::Failed(e)) => last = e.to_string(),
            }
            warn!(member = %self.member, partner, try_no, detail = %last, "Partner not resolved");
        }
        Err(AttemptOutcome::Aborted(AbortReason::RosterFill(format!(
            "partner {}: {}",
            partner, last
        ))))
    }

    async fn try_partner(
        &self,
        driver: &dyn PortalDriver,
        partner: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<String, StepFailure> {
        let search_until = (Instant::now() + self.autocomplete_timeout).min(deadline);
        let suggestion = self
            .bounded(search_until, cancel, driver.submit_partner_search(partner))
            .await?
            .ok_or_else(|| {
                StepFailure::Failed(Error::NotFound(format!("no suggestion for {}", partner)))
            })?;
        self.bounded(self.step_until(deadline), cancel, driver.select_suggestion(&suggestion))
            .await
    }

    /// Abandon when the remaining countdown cannot cover the safety margin
    /// plus `reserve`.
    fn guard(&self, deadline: Instant, step: &str, reserve: Duration) -> Option<AttemptOutcome> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining >= self.safety_margin + reserve {
            return None;
        }
        warn!(
            member = %self.member,
            step,
            remaining_ms = remaining.as_millis() as u64,
            reserve_ms = reserve.as_millis() as u64,
            "Countdown too short to finish, abandoning"
        );
        Some(AttemptOutcome::Timeout(format!(
            "{:.1}s left before {}",
            remaining.as_secs_f64(),
            step
        )))
    }

    fn step_until(&self, deadline: Instant) -> Instant {
        (Instant::now() + self.step_timeout).min(deadline)
    }

    fn step_failed(&self, failure: StepFailure, deadline: Instant, step: &str) -> AttemptOutcome {
        match failure {
            StepFailure::Cancelled => AttemptOutcome::Aborted(AbortReason::Cancelled),
            StepFailure::Expired if Instant::now() + self.safety_margin >= deadline => {
                AttemptOutcome::Timeout(format!("countdown ran out at {}", step))
            }
            StepFailure::Expired => {
                AttemptOutcome::Aborted(AbortReason::Navigation(format!("{} did not respond", step)))
            }
            StepFailure::Failed(e) => AttemptOutcome::Aborted(AbortReason::Navigation(format!(
                "{}: {}",
                step, e
            ))),
        }
    }

    async fn bounded<T>(
        &self,
        until: Instant,
        cancel: &CancellationToken,
        step: impl Future<Output = teeclaim_core::Result<T>>,
    ) -> Result<T, StepFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepFailure::Cancelled),
            res = timeout_at(until, step) => match res {
                Err(_) => Err(StepFailure::Expired),
                Ok(Err(e)) if e.is_interruption() => Err(StepFailure::Cancelled),
                Ok(Err(e)) => Err(StepFailure::Failed(e)),
                Ok(Ok(value)) => Ok(value),
            },
        }
    }

    async fn abandon(&self, driver: &dyn PortalDriver) {
        match timeout(self.step_timeout, driver.abandon_booking()).await {
            Ok(Ok(())) => debug!(member = %self.member, "Reservation page abandoned"),
            Ok(Err(e)) => warn!(member = %self.member, error = %e, "Failed to abandon reservation page"),
            Err(_) => warn!(member = %self.member, "Abandoning reservation page timed out"),
        }
    }

    async fn snapshot(&self, driver: &dyn PortalDriver, label: &str) {
        match timeout(self.step_timeout, driver.capture_screenshot()).await {
            Ok(Ok(Some(png))) => self.recorder.screenshot(&self.member, label, &png),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!(member = %self.member, error = %e, "Screenshot failed"),
            Err(_) => debug!(member = %self.member, "Screenshot timed out"),
        }
    }
}

//! One agent: a single identity driven from sign-in through the draw and
//! queue to its booking attempts.

use std::sync::Arc;

use serde::Serialize;
use teeclaim_core::{
    AgentEvent, Error, FailureKind, Identity, PortalDriver, PortalFactory, Result, RunRecorder,
    TargetKind,
};
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arbiter::{RaceArbiter, RaceSnapshot, TargetState};
use crate::clock::pause_until;
use crate::draw::{DrawQueue, DrawState};
use crate::plan::RunPlan;
use crate::reservation::{AbortReason, AttemptOutcome, ReservationAttempt, ReservationController};
use crate::roster::partners_for;
use crate::scanner::{RowHandle, ScanOutcome, SlotScanner};

/// How an agent's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentTerminal {
    Booked { target: TargetKind },
    StoodDown { reason: String },
    Failed { kind: FailureKind, detail: String },
}

/// What an agent did about one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Pursuit {
    Skipped {
        target: TargetKind,
        reason: String,
    },
    RaceLost {
        target: TargetKind,
    },
    NoCapacity {
        target: TargetKind,
    },
    Attempted {
        target: TargetKind,
        row: String,
        partners: Vec<String>,
        confirmed: bool,
        failure: Option<FailureKind>,
        detail: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub member_number: String,
    pub final_state: DrawState,
    pub terminal: AgentTerminal,
    pub pursuits: Vec<Pursuit>,
}

impl AgentReport {
    /// Report for an agent whose task never returned.
    pub fn interrupted(member_number: &str, deadline_exceeded: bool) -> Self {
        let (kind, detail) = if deadline_exceeded {
            (FailureKind::GlobalDeadline, "stopped at the run deadline")
        } else {
            (FailureKind::Cancelled, "task aborted")
        };
        Self {
            member_number: member_number.to_string(),
            final_state: DrawState::Done,
            terminal: AgentTerminal::Failed {
                kind,
                detail: detail.to_string(),
            },
            pursuits: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        match &self.terminal {
            AgentTerminal::Booked { target } => format!("{}: booked {}", self.member_number, target),
            AgentTerminal::StoodDown { reason } => {
                format!("{}: stood down ({})", self.member_number, reason)
            }
            AgentTerminal::Failed { kind, detail } => {
                format!("{}: {} ({})", self.member_number, kind, detail)
            }
        }
    }
}

pub struct Agent {
    identity: Identity,
    plan: Arc<RunPlan>,
    arbiter: Arc<RaceArbiter>,
    recorder: Arc<dyn RunRecorder>,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(
        identity: Identity,
        plan: Arc<RunPlan>,
        arbiter: Arc<RaceArbiter>,
        recorder: Arc<dyn RunRecorder>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            plan,
            arbiter,
            recorder,
            cancel,
        }
    }

    pub fn member_number(&self) -> &str {
        &self.identity.member_number
    }

    /// Run to completion. Never fails: every outcome ends up in the report.
    pub async fn run(self, factory: Arc<dyn PortalFactory>) -> AgentReport {
        let member = self.identity.member_number.clone();
        let mut draw = DrawQueue::new(&member, &self.plan, self.recorder.clone());
        let mut pursuits = Vec::new();

        let result = if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            match factory.open(&self.identity).await {
                Ok(driver) => {
                    let result = self.drive(driver.as_ref(), &mut draw, &mut pursuits).await;
                    self.close(driver.as_ref()).await;
                    result
                }
                Err(e) => Err(Error::Navigation(format!("portal session failed to open: {}", e))),
            }
        };
        draw.finish();

        let terminal = match result {
            Ok(terminal) => terminal,
            Err(e) => self.classify(e),
        };
        let report = AgentReport {
            member_number: member.clone(),
            final_state: draw.state(),
            terminal,
            pursuits,
        };
        info!(member = %member, summary = %report.summary(), "Agent finished");
        self.recorder.record(
            &member,
            &AgentEvent::Terminated {
                summary: report.summary(),
            },
        );
        report
    }

    async fn drive(
        &self,
        driver: &dyn PortalDriver,
        draw: &mut DrawQueue,
        pursuits: &mut Vec<Pursuit>,
    ) -> Result<AgentTerminal> {
        let member = self.member_number();
        if Instant::now() < self.plan.login_at {
            info!(member, "Waiting for login time");
            pause_until(self.plan.login_at, &self.cancel).await?;
        }
        driver
            .sign_in(&self.identity)
            .await
            .map_err(|e| Error::Navigation(format!("sign-in failed: {}", e)))?;
        info!(member, "Signed in");

        draw.run_to_tee_sheet(driver, &self.cancel).await?;

        let mut race_rx = self.arbiter.subscribe();
        // Targets this agent will not take up again: it held a claim on
        // them, or found nothing it could book.
        let mut given_up = [false; 2];
        let mut seen = [false; 2];
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let race = race_rx.borrow_and_update().clone();
            if let Some(booked) = race.booked_in(member) {
                return Ok(AgentTerminal::StoodDown {
                    reason: format!("already in the confirmed {} party", booked),
                });
            }

            let mut next = None;
            let mut pending = false;
            for kind in TargetKind::ALL {
                let i = kind.index();
                let state = &race.get(kind).state;
                if state.is_resolved() {
                    if !seen[i] {
                        info!(member, target = %kind, "Target already resolved, skipping");
                        pursuits.push(Pursuit::Skipped {
                            target: kind,
                            reason: "already resolved".to_string(),
                        });
                        seen[i] = true;
                    }
                    given_up[i] = true;
                    continue;
                }
                if given_up[i] {
                    continue;
                }
                if *state == TargetState::Open {
                    next = Some(kind);
                    break;
                }
                pending = true;
            }

            let Some(kind) = next else {
                if !pending {
                    return Ok(settle(pursuits));
                }
                debug!(member, "Waiting for a claimed target to be confirmed or reopened");
                self.await_race_change(&mut race_rx).await?;
                continue;
            };

            let pursuit = self.pursue(driver, kind, &race).await?;
            let booked = matches!(pursuit, Pursuit::Attempted { confirmed: true, .. });
            // Only a lost race leaves the target worth coming back to.
            if !matches!(pursuit, Pursuit::RaceLost { .. }) {
                given_up[kind.index()] = true;
            }
            seen[kind.index()] = true;
            pursuits.push(pursuit);
            if booked {
                return Ok(AgentTerminal::Booked { target: kind });
            }
        }
    }

    /// Block until the race state changes, the run is stopped or the
    /// deadline passes.
    async fn await_race_change(&self, race_rx: &mut watch::Receiver<RaceSnapshot>) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = sleep_until(self.plan.deadline) => Err(Error::DeadlineExceeded),
            changed = race_rx.changed() => changed.map_err(|_| Error::Cancelled),
        }
    }

    async fn pursue(
        &self,
        driver: &dyn PortalDriver,
        kind: TargetKind,
        race: &RaceSnapshot,
    ) -> Result<Pursuit> {
        let member = self.member_number();
        let target = self.plan.target(kind);
        let partners = partners_for(&self.plan, kind, member, race);
        let needed = usize::from(target.required_slots.saturating_sub(1));
        if partners.len() < needed {
            return Ok(Pursuit::Skipped {
                target: kind,
                reason: format!("only {} of {} partners available", partners.len(), needed),
            });
        }

        let arbiter = self.arbiter.clone();
        let cancel = self.cancel.clone();
        let stop = move || arbiter.is_resolved(kind) || cancel.is_cancelled();
        let mut scanner = SlotScanner::from_timing(&self.plan.timing);
        let mut refused: Vec<String> = Vec::new();
        let mut row = match scanner
            .find(driver, target.required_slots, &refused, &self.cancel, &stop)
            .await?
        {
            ScanOutcome::Found(row) => row,
            ScanOutcome::Exhausted { attempts } => {
                if self.arbiter.mark_no_capacity(kind, member) {
                    warn!(member, target = %kind, attempts, "No row with enough seats, target marked without capacity");
                }
                return Ok(Pursuit::NoCapacity { target: kind });
            }
            ScanOutcome::Stopped => {
                return Ok(Pursuit::Skipped {
                    target: kind,
                    reason: "resolved while scanning".to_string(),
                });
            }
        };
        self.row_selected(kind, &row);

        if !self.arbiter.try_claim(kind, member) {
            info!(member, target = %kind, "Race lost");
            self.recorder
                .record(member, &AgentEvent::ClaimRefused { target: kind });
            return Ok(Pursuit::RaceLost { target: kind });
        }
        self.recorder
            .record(member, &AgentEvent::ClaimGranted { target: kind });

        let controller = ReservationController::new(member, &self.plan.timing, self.recorder.clone());
        // A row refused at Book Group is stale, not a lost claim: keep the
        // claim and move on to the next qualifying row.
        let (attempt, outcome) = loop {
            let mut attempt = ReservationAttempt::new(target, row, partners.clone());
            let outcome = controller.run(driver, &mut attempt, &self.cancel).await;
            if !matches!(outcome, AttemptOutcome::Aborted(AbortReason::RowUnavailable(_))) {
                break (attempt, outcome);
            }
            refused.push(attempt.row.row.label.clone());
            if scanner.remaining() == 0 {
                break (attempt, outcome);
            }
            info!(
                member,
                target = %kind,
                row = %attempt.row.row.label,
                scans_left = scanner.remaining(),
                "Row refused at Book Group, scanning for another"
            );
            if let Err(e) = driver.refresh_tee_sheet().await {
                warn!(member, error = %e, "Tee sheet refresh failed");
            }
            match scanner
                .find(driver, target.required_slots, &refused, &self.cancel, &stop)
                .await
            {
                Ok(ScanOutcome::Found(next)) => {
                    self.row_selected(kind, &next);
                    row = next;
                }
                _ => break (attempt, outcome),
            }
        };

        let failure = outcome.failure_kind();
        match failure {
            None => {
                if !self.arbiter.confirm(kind, member, &attempt.added) {
                    warn!(member, target = %kind, "Arbiter did not accept the confirmation");
                }
            }
            Some(failure) => {
                self.arbiter
                    .release_if_unconfirmed(kind, member, failure, &outcome.detail());
            }
        }
        self.recorder.record(
            member,
            &AgentEvent::AttemptFinished {
                target: kind,
                confirmed: failure.is_none(),
                failure,
                detail: Some(outcome.detail()),
            },
        );

        Ok(Pursuit::Attempted {
            target: kind,
            row: attempt.row.row.label.clone(),
            partners: attempt.added.clone(),
            confirmed: failure.is_none(),
            failure,
            detail: outcome.detail(),
        })
    }

    fn row_selected(&self, kind: TargetKind, row: &RowHandle) {
        self.recorder.record(
            self.member_number(),
            &AgentEvent::RowSelected {
                target: kind,
                label: row.row.label.clone(),
                empty_seats: row.observed_seats,
            },
        );
    }

    async fn close(&self, driver: &dyn PortalDriver) {
        let member = self.member_number();
        match timeout(self.plan.timing.step_timeout(), driver.close()).await {
            Ok(Ok(())) => info!(member, "Portal session closed"),
            Ok(Err(e)) => warn!(member, error = %e, "Portal session close failed"),
            Err(_) => warn!(member, "Portal session close timed out"),
        }
    }

    fn classify(&self, e: Error) -> AgentTerminal {
        match e {
            Error::DeadlineExceeded => AgentTerminal::Failed {
                kind: FailureKind::GlobalDeadline,
                detail: e.to_string(),
            },
            Error::Cancelled if Instant::now() >= self.plan.deadline => AgentTerminal::Failed {
                kind: FailureKind::GlobalDeadline,
                detail: "stopped at the run deadline".to_string(),
            },
            Error::Cancelled => AgentTerminal::StoodDown {
                reason: "run stopped".to_string(),
            },
            other => AgentTerminal::Failed {
                kind: FailureKind::Navigation,
                detail: other.to_string(),
            },
        }
    }
}

/// Terminal state once nothing is left to attempt or wait for.
fn settle(pursuits: &[Pursuit]) -> AgentTerminal {
    let last_failure = pursuits.iter().rev().find_map(|p| match p {
        Pursuit::Attempted {
            failure: Some(kind),
            detail,
            ..
        } => Some((*kind, detail.clone())),
        Pursuit::NoCapacity { target } => Some((
            FailureKind::NoCapacity,
            format!("no {} row with enough seats", target),
        )),
        _ => None,
    });
    match last_failure {
        Some((kind, detail)) => AgentTerminal::Failed { kind, detail },
        None if pursuits.iter().any(|p| matches!(p, Pursuit::RaceLost { .. })) => {
            AgentTerminal::StoodDown {
                reason: "race lost".to_string(),
            }
        }
        None => AgentTerminal::StoodDown {
            reason: "nothing left to attempt".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MemoryRecorder, Script, ScriptedFactory, TeeSheet};
    use std::time::Duration;
    use teeclaim_core::config::{TargetConfig, TargetsConfig};
    use teeclaim_core::Config;

    fn config() -> Config {
        Config {
            targets: TargetsConfig {
                fourball: TargetConfig {
                    required_slots: 4,
                    roster: vec!["2007".into(), "2008".into(), "2009".into(), "2010".into()],
                },
                twoball: TargetConfig {
                    required_slots: 2,
                    roster: vec!["1101".into(), "1107".into()],
                },
            },
            ..Config::default()
        }
    }

    fn plan(login_in: Duration) -> Arc<RunPlan> {
        let now = Instant::now();
        Arc::new(RunPlan::new(
            &config(),
            now + login_in,
            now + login_in,
            now + Duration::from_secs(90 * 60),
        ))
    }

    fn agent(
        member: &str,
        plan: Arc<RunPlan>,
        arbiter: Arc<RaceArbiter>,
        recorder: Arc<MemoryRecorder>,
    ) -> Agent {
        Agent::new(
            Identity::new(member, "secret"),
            plan,
            arbiter,
            recorder,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_books_fourball_and_closes() {
        let arbiter = Arc::new(RaceArbiter::new());
        let recorder = Arc::new(MemoryRecorder::default());
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[2, 4])));
        let report = agent("2007", plan(Duration::from_secs(30)), arbiter.clone(), recorder.clone())
            .run(factory.clone())
            .await;

        assert_eq!(report.terminal, AgentTerminal::Booked { target: TargetKind::Fourball });
        assert_eq!(report.final_state, DrawState::Done);
        assert_eq!(
            arbiter.snapshot().confirmed_party(TargetKind::Fourball),
            Some(&["2007".to_string(), "2008".into(), "2009".into(), "2010".into()][..])
        );

        let portal = factory.portal("2007");
        assert_eq!(portal.calls().first(), Some(&Call::SignIn("2007".into())));
        assert_eq!(portal.calls().last(), Some(&Call::Close));
        assert_eq!(portal.reloads_since_awaiting_draw(), 0);

        let events = recorder.events_for("2007");
        assert!(events.iter().any(|e| matches!(e, AgentEvent::ClaimGranted { target: TargetKind::Fourball })));
        assert!(matches!(events.last(), Some(AgentEvent::Terminated { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_waits_for_login_time() {
        let arbiter = Arc::new(RaceArbiter::new());
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[4])));
        let started = Instant::now();
        let plan = plan(Duration::from_secs(600));
        let report = agent("2007", plan.clone(), arbiter, Arc::new(MemoryRecorder::default()))
            .run(factory)
            .await;
        assert!(matches!(report.terminal, AgentTerminal::Booked { .. }));
        assert!(started.elapsed() >= Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_fourball_falls_through_to_twoball() {
        let arbiter = Arc::new(RaceArbiter::new());
        assert!(arbiter.mark_no_capacity(TargetKind::Fourball, "2008"));
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[2])));
        let report = agent("1101", plan(Duration::ZERO), arbiter.clone(), Arc::new(MemoryRecorder::default()))
            .run(factory)
            .await;

        assert_eq!(report.terminal, AgentTerminal::Booked { target: TargetKind::Twoball });
        assert!(matches!(
            report.pursuits[0],
            Pursuit::Skipped { target: TargetKind::Fourball, .. }
        ));
        assert_eq!(
            arbiter.snapshot().confirmed_party(TargetKind::Twoball),
            Some(&["1101".to_string(), "1107".into()][..])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_scan_marks_no_capacity() {
        let mut config = config();
        config.timing.scan_attempts = 3;
        let now = Instant::now();
        let plan = Arc::new(RunPlan::new(&config, now, now, now + Duration::from_secs(3600)));
        let arbiter = Arc::new(RaceArbiter::new());
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[1, 1])));
        let report = agent("2007", plan, arbiter.clone(), Arc::new(MemoryRecorder::default()))
            .run(factory)
            .await;

        assert!(arbiter.snapshot().all_resolved());
        assert_eq!(
            report.pursuits,
            vec![
                Pursuit::NoCapacity { target: TargetKind::Fourball },
                Pursuit::NoCapacity { target: TargetKind::Twoball },
            ]
        );
        assert!(matches!(
            report.terminal,
            AgentTerminal::Failed { kind: FailureKind::NoCapacity, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_row_taken_before_click_moves_to_next_row() {
        let arbiter = Arc::new(RaceArbiter::new());
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[4, 4])).with_script(
            "2007",
            Script {
                taken_before_click: ["07:00".to_string()].into_iter().collect(),
                ..Script::default()
            },
        ));
        let report = agent("2007", plan(Duration::ZERO), arbiter.clone(), Arc::new(MemoryRecorder::default()))
            .run(factory.clone())
            .await;

        assert_eq!(report.terminal, AgentTerminal::Booked { target: TargetKind::Fourball });
        assert!(matches!(
            &report.pursuits[..],
            [Pursuit::Attempted { target: TargetKind::Fourball, row, confirmed: true, .. }] if row == "07:08"
        ));
        // The claim is kept across the refused row.
        assert_eq!(arbiter.snapshot().get(TargetKind::Fourball).claims, 1);
        let clicks: Vec<Call> = factory
            .portal("2007")
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::ClickBookGroup(_)))
            .collect();
        assert_eq!(
            clicks,
            vec![
                Call::ClickBookGroup("07:00".into()),
                Call::ClickBookGroup("07:08".into())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_rows_release_claim_when_budget_spent() {
        let mut config = config();
        config.timing.scan_attempts = 2;
        let now = Instant::now();
        let plan = Arc::new(RunPlan::new(&config, now, now, now + Duration::from_secs(3600)));
        let arbiter = Arc::new(RaceArbiter::new());
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[4, 4, 2])).with_script(
            "2007",
            Script {
                taken_before_click: ["07:00".to_string(), "07:08".to_string()]
                    .into_iter()
                    .collect(),
                ..Script::default()
            },
        ));
        let report = agent("2007", plan, arbiter.clone(), Arc::new(MemoryRecorder::default()))
            .run(factory.clone())
            .await;

        assert!(matches!(
            &report.pursuits[0],
            Pursuit::Attempted {
                target: TargetKind::Fourball,
                confirmed: false,
                failure: Some(FailureKind::RowUnavailable),
                row,
                ..
            } if row == "07:08"
        ));
        let race = arbiter.snapshot();
        let four = race.get(TargetKind::Fourball);
        assert_eq!(four.state, TargetState::Open);
        assert_eq!(four.claims, 1);
        assert_eq!(
            four.last_failure.as_ref().map(|f| f.kind),
            Some(FailureKind::RowUnavailable)
        );
        assert_eq!(factory.portal("2007").count(|c| matches!(c, Call::ClickBookGroup(_))), 2);
        // Then on to the Twoball.
        assert_eq!(report.terminal, AgentTerminal::Booked { target: TargetKind::Twoball });
    }

    #[tokio::test(start_paused = true)]
    async fn test_losing_agent_waits_for_claimed_target() {
        let arbiter = Arc::new(RaceArbiter::new());
        assert!(arbiter.try_claim(TargetKind::Fourball, "2008"));
        assert!(arbiter.try_claim(TargetKind::Twoball, "1101"));
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[4, 2])));
        let task = tokio::spawn(
            agent("2010", plan(Duration::ZERO), arbiter.clone(), Arc::new(MemoryRecorder::default()))
                .run(factory.clone()),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!task.is_finished());
        assert!(arbiter.confirm(TargetKind::Twoball, "1101", &["1107".to_string()]));
        assert!(arbiter.release_if_unconfirmed(
            TargetKind::Fourball,
            "2008",
            FailureKind::RosterFill,
            "partner 2009"
        ));

        let report = task.await.unwrap();
        assert_eq!(report.terminal, AgentTerminal::Booked { target: TargetKind::Fourball });
        assert_eq!(
            report.pursuits.first(),
            Some(&Pursuit::RaceLost { target: TargetKind::Fourball })
        );
        assert_eq!(arbiter.snapshot().get(TargetKind::Fourball).claims, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_agent_stands_down_once_party_confirmed() {
        let arbiter = Arc::new(RaceArbiter::new());
        assert!(arbiter.try_claim(TargetKind::Fourball, "2007"));
        assert!(arbiter.try_claim(TargetKind::Twoball, "1101"));
        let factory = Arc::new(ScriptedFactory::new(TeeSheet::new(&[4, 2])));
        let task = tokio::spawn(
            agent("2009", plan(Duration::ZERO), arbiter.clone(), Arc::new(MemoryRecorder::default()))
                .run(factory.clone()),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        let party = ["2008".to_string(), "2009".into(), "2010".into()];
        assert!(arbiter.confirm(TargetKind::Fourball, "2007", &party));

        let report = task.await.unwrap();
        assert!(matches!(report.terminal, AgentTerminal::StoodDown { ref reason } if reason.contains("fourball")));
        assert_eq!(factory.portal("2009").count(|c| matches!(c, Call::ClickBookGroup(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_failure_is_contained_and_session_closed() {
        let arbiter = Arc::new(RaceArbiter::new());
        let factory = Arc::new(
            ScriptedFactory::new(TeeSheet::new(&[4])).with_script(
                "2007",
                Script {
                    queue_error: true,
                    ..Script::default()
                },
            ),
        );
        let report = agent("2007", plan(Duration::ZERO), arbiter.clone(), Arc::new(MemoryRecorder::default()))
            .run(factory.clone())
            .await;

        assert!(matches!(
            report.terminal,
            AgentTerminal::Failed { kind: FailureKind::Navigation, .. }
        ));
        assert!(report.pursuits.is_empty());
        assert!(arbiter.is_open(TargetKind::Fourball));
        assert_eq!(factory.portal("2007").calls().last(), Some(&Call::Close));
    }

    #[test]
    fn test_settle_prefers_last_failure() {
        let pursuits = vec![
            Pursuit::RaceLost { target: TargetKind::Fourball },
            Pursuit::Attempted {
                target: TargetKind::Twoball,
                row: "07:00".into(),
                partners: vec![],
                confirmed: false,
                failure: Some(FailureKind::RosterFill),
                detail: "partner 1107".into(),
            },
        ];
        assert_eq!(
            settle(&pursuits),
            AgentTerminal::Failed {
                kind: FailureKind::RosterFill,
                detail: "partner 1107".into()
            }
        );
        assert_eq!(
            settle(&[Pursuit::RaceLost { target: TargetKind::Fourball }]),
            AgentTerminal::StoodDown { reason: "race lost".into() }
        );
    }
}

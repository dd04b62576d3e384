//! Worker Orchestrator: one concurrent agent per identity, stopped when both
//! targets resolve or the run deadline passes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use teeclaim_core::{Identity, PortalFactory, RunRecorder};
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::arbiter::RaceArbiter;
use crate::plan::RunPlan;
use crate::report::RunReport;
use crate::worker::{Agent, AgentReport};

pub struct Orchestrator {
    plan: Arc<RunPlan>,
    arbiter: Arc<RaceArbiter>,
    recorder: Arc<dyn RunRecorder>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(plan: RunPlan, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            plan: Arc::new(plan),
            arbiter: Arc::new(RaceArbiter::new()),
            recorder,
            cancel: CancellationToken::new(),
        }
    }

    pub fn arbiter(&self) -> Arc<RaceArbiter> {
        self.arbiter.clone()
    }

    /// Cancelling this token stops the run as if the deadline had passed,
    /// minus the deadline flag in the report.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(
        &self,
        run_id: &str,
        identities: Vec<Identity>,
        factory: Arc<dyn PortalFactory>,
    ) -> RunReport {
        let started_at = Utc::now();
        let members: Vec<String> = identities.iter().map(|i| i.member_number.clone()).collect();
        info!(run_id, agents = members.len(), "Starting run");

        let mut agents = JoinSet::new();
        let stagger = self.plan.timing.stagger();
        for (i, identity) in identities.into_iter().enumerate() {
            let delay = stagger * i as u32;
            let span = info_span!("agent", member = %identity.member_number);
            let cancel = self.cancel.child_token();
            let agent = Agent::new(
                identity,
                self.plan.clone(),
                self.arbiter.clone(),
                self.recorder.clone(),
                cancel.clone(),
            );
            let factory = factory.clone();
            agents.spawn(
                async move {
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = cancel.cancelled() => {}
                        }
                    }
                    agent.run(factory).await
                }
                .instrument(span),
            );
        }

        let mut race = self.arbiter.subscribe();
        let mut watching = true;
        let mut deadline_exceeded = false;
        let mut grace_until: Option<Instant> = None;
        let mut aborted = false;
        let mut reports: Vec<AgentReport> = Vec::with_capacity(members.len());

        loop {
            tokio::select! {
                joined = agents.join_next() => match joined {
                    None => break,
                    Some(Ok(report)) => reports.push(report),
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => error!(error = %e, "Agent task panicked"),
                },
                changed = race.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    } else if race.borrow_and_update().all_resolved() {
                        info!("Both targets resolved, stopping remaining agents");
                        watching = false;
                        self.cancel.cancel();
                    }
                }
                _ = sleep_until(self.plan.deadline), if !deadline_exceeded && !self.cancel.is_cancelled() => {
                    warn!("Run deadline reached, stopping all agents");
                    deadline_exceeded = true;
                    self.cancel.cancel();
                }
                _ = self.cancel.cancelled(), if grace_until.is_none() => {
                    grace_until = Some(Instant::now() + self.plan.timing.shutdown_grace());
                }
                _ = sleep_until(grace_until.unwrap_or(self.plan.deadline)), if grace_until.is_some() && !aborted => {
                    warn!(remaining = agents.len(), "Agents did not stop within the grace period, aborting");
                    aborted = true;
                    agents.abort_all();
                }
            }
        }

        let reported: HashSet<String> = reports.iter().map(|r| r.member_number.clone()).collect();
        for member in members.iter().filter(|m| !reported.contains(*m)) {
            reports.push(AgentReport::interrupted(member, deadline_exceeded));
        }
        reports.sort_by_key(|r| {
            members
                .iter()
                .position(|m| *m == r.member_number)
                .unwrap_or(usize::MAX)
        });

        let report = RunReport::build(
            run_id,
            started_at,
            &self.arbiter.snapshot(),
            reports,
            deadline_exceeded,
        );
        for line in report.summary_lines() {
            info!("{}", line);
        }
        report
    }
}

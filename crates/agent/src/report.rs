use chrono::{DateTime, Utc};
use serde::Serialize;
use teeclaim_core::{FailureKind, TargetKind};

use crate::arbiter::{RaceSnapshot, TargetState};
use crate::worker::{AgentReport, AgentTerminal};

/// Final state of one target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub target: TargetKind,
    /// Confirmed booking.
    pub resolved: bool,
    pub winner: Option<String>,
    pub party: Vec<String>,
    pub failure: Option<FailureKind>,
    pub failure_detail: Option<String>,
    /// Claims granted over the run, released ones included.
    pub claims: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    BothConfirmed,
    Partial,
    BothFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub deadline_exceeded: bool,
    pub outcome: RunOutcome,
    pub targets: Vec<TargetReport>,
    pub agents: Vec<AgentReport>,
}

impl RunReport {
    pub fn build(
        run_id: &str,
        started_at: DateTime<Utc>,
        race: &RaceSnapshot,
        agents: Vec<AgentReport>,
        deadline_exceeded: bool,
    ) -> Self {
        let targets: Vec<TargetReport> = race
            .targets
            .iter()
            .map(|record| {
                let (winner, party) = match &record.state {
                    TargetState::Confirmed { by, party } => (Some(by.clone()), party.clone()),
                    _ => (None, Vec::new()),
                };
                let (failure, failure_detail) = if winner.is_some() {
                    (None, None)
                } else if let Some(last) = &record.last_failure {
                    (
                        Some(last.kind),
                        Some(format!("{} ({})", last.detail, last.member_number)),
                    )
                } else if deadline_exceeded {
                    (Some(FailureKind::GlobalDeadline), None)
                } else {
                    (agent_failure(&agents), None)
                };
                TargetReport {
                    target: record.kind,
                    resolved: winner.is_some(),
                    winner,
                    party,
                    failure,
                    failure_detail,
                    claims: record.claims,
                }
            })
            .collect();

        let confirmed = targets.iter().filter(|t| t.resolved).count();
        let outcome = match confirmed {
            2 => RunOutcome::BothConfirmed,
            1 => RunOutcome::Partial,
            _ => RunOutcome::BothFailed,
        };

        Self {
            run_id: run_id.to_string(),
            started_at,
            finished_at: Utc::now(),
            deadline_exceeded,
            outcome,
            targets,
            agents,
        }
    }

    pub fn target(&self, kind: TargetKind) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == kind)
    }

    /// Process exit code: 0 both confirmed, 2 partial, 1 nothing booked.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::BothConfirmed => 0,
            RunOutcome::Partial => 2,
            RunOutcome::BothFailed => 1,
        }
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let headline = match self.outcome {
            RunOutcome::BothConfirmed => "Both targets confirmed",
            RunOutcome::Partial => "Partial success: one target confirmed",
            RunOutcome::BothFailed => "Both targets failed",
        };
        let mut lines = vec![format!("{} (run {})", headline, self.run_id)];
        for t in &self.targets {
            let line = match (&t.winner, t.failure) {
                (Some(winner), _) => format!(
                    "  {}: confirmed by {} with {}",
                    t.target,
                    winner,
                    t.party.iter().skip(1).cloned().collect::<Vec<_>>().join(", ")
                ),
                (None, Some(kind)) => match &t.failure_detail {
                    Some(detail) => format!("  {}: {}: {}", t.target, kind, detail),
                    None => format!("  {}: {}", t.target, kind),
                },
                (None, None) => format!("  {}: not booked", t.target),
            };
            lines.push(line);
        }
        if self.deadline_exceeded {
            lines.push("  run deadline exceeded".to_string());
        }
        for agent in &self.agents {
            lines.push(format!("  {}", agent.summary()));
        }
        lines
    }
}

/// Failure kind shared by the agents when no target records one, e.g.
/// every agent failing in the draw.
fn agent_failure(agents: &[AgentReport]) -> Option<FailureKind> {
    agents.iter().find_map(|a| match &a.terminal {
        AgentTerminal::Failed { kind, .. } => Some(*kind),
        _ => None,
    })
}

use teeclaim_core::config::TimingConfig;
use teeclaim_core::{Config, ReservationTarget, TargetKind};
use tokio::time::Instant;

/// Everything an agent needs to know about the run, resolved to the
/// monotonic clock.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub targets: [ReservationTarget; 2],
    pub timing: TimingConfig,
    /// Agents sign in no earlier than this.
    pub login_at: Instant,
    /// Scheduled draw opening.
    pub draw_open_at: Instant,
    /// Hard stop for the whole run.
    pub deadline: Instant,
}

impl RunPlan {
    pub fn new(config: &Config, login_at: Instant, draw_open_at: Instant, deadline: Instant) -> Self {
        Self {
            targets: [
                config.target(TargetKind::Fourball),
                config.target(TargetKind::Twoball),
            ],
            timing: config.timing.clone(),
            login_at,
            draw_open_at,
            deadline,
        }
    }

    pub fn target(&self, kind: TargetKind) -> &ReservationTarget {
        &self.targets[kind.index()]
    }
}

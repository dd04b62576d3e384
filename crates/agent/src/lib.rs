pub mod arbiter;
mod clock;
pub mod draw;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod reservation;
pub mod roster;
pub mod scanner;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use arbiter::{RaceArbiter, RaceSnapshot, TargetState};
pub use draw::{DrawQueue, DrawState};
pub use orchestrator::Orchestrator;
pub use plan::RunPlan;
pub use report::{RunOutcome, RunReport, TargetReport};
pub use reservation::{AbortReason, AttemptOutcome, ReservationAttempt, ReservationController};
pub use scanner::{RowHandle, ScanOutcome, SlotScanner};
pub use worker::{Agent, AgentReport, AgentTerminal, Pursuit};

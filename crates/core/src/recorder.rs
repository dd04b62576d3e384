use serde::{Deserialize, Serialize};

use crate::types::{FailureKind, TargetKind};

/// Per-agent events worth keeping after the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StateChanged {
        from: String,
        to: String,
    },
    QueueObserved {
        position: Option<u32>,
        bookings_available: Option<u32>,
    },
    RowSelected {
        target: TargetKind,
        label: String,
        empty_seats: u8,
    },
    ClaimGranted {
        target: TargetKind,
    },
    ClaimRefused {
        target: TargetKind,
    },
    PartnerAdded {
        target: TargetKind,
        member_number: String,
        displayed: String,
    },
    AttemptFinished {
        target: TargetKind,
        confirmed: bool,
        failure: Option<FailureKind>,
        detail: Option<String>,
    },
    Terminated {
        summary: String,
    },
}

/// Sink for run artifacts. Implementations must never fail the caller;
/// persistence errors are logged and swallowed.
pub trait RunRecorder: Send + Sync {
    fn record(&self, member_number: &str, event: &AgentEvent);

    fn screenshot(&self, member_number: &str, label: &str, png: &[u8]);
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl RunRecorder for NullRecorder {
    fn record(&self, _member_number: &str, _event: &AgentEvent) {}

    fn screenshot(&self, _member_number: &str, _label: &str, _png: &[u8]) {}
}

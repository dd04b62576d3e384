use serde::{Deserialize, Serialize};
use std::fmt;

/// One set of portal credentials. Each identity drives exactly one agent.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub member_number: String,
    #[serde(skip_serializing)]
    pub secret: String,
}

impl Identity {
    pub fn new(member_number: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            member_number: member_number.into(),
            secret: secret.into(),
        }
    }
}

// Secrets never reach log output.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("member_number", &self.member_number)
            .field("secret", &"***")
            .finish()
    }
}

/// The two group reservations a run tries to secure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Fourball,
    Twoball,
}

impl TargetKind {
    /// Attempt order for every agent.
    pub const ALL: [TargetKind; 2] = [TargetKind::Fourball, TargetKind::Twoball];

    pub fn index(self) -> usize {
        match self {
            TargetKind::Fourball => 0,
            TargetKind::Twoball => 1,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Fourball => write!(f, "fourball"),
            TargetKind::Twoball => write!(f, "twoball"),
        }
    }
}

/// Static definition of one reservation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationTarget {
    pub kind: TargetKind,
    /// Seats the booking needs, booker included.
    pub required_slots: u8,
    /// Member numbers making up the group.
    pub roster: Vec<String>,
}

/// Locates one tee-sheet row. The label (tee time text) is preferred; the
/// index is the display position at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub index: usize,
    pub label: String,
}

/// A row as read off the tee sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeeRow {
    pub row: RowRef,
    pub empty_seats: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub position: Option<u32>,
    pub bookings_available: Option<u32>,
}

/// First autocomplete entry offered for a partner search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub member_number: String,
    pub label: String,
}

/// Result of invoking Book Group on a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RowAcquisition {
    /// The reservation page is open and its countdown is running.
    Acquired,
    /// Seats were taken or the row was locked by someone else.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed(String),
    Rejected(String),
}

/// Failure taxonomy surfaced in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    RaceLost,
    RosterFill,
    ConfirmationTimeout,
    NoCapacity,
    RowUnavailable,
    Rejected,
    GlobalDeadline,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Navigation => "navigation error",
            FailureKind::RaceLost => "race lost",
            FailureKind::RosterFill => "roster fill failure",
            FailureKind::ConfirmationTimeout => "confirmation timeout",
            FailureKind::NoCapacity => "no capacity found",
            FailureKind::RowUnavailable => "row unavailable",
            FailureKind::Rejected => "booking rejected",
            FailureKind::GlobalDeadline => "global deadline exceeded",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

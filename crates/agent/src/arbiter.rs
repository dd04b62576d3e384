use serde::Serialize;
use teeclaim_core::{FailureKind, TargetKind};
use tokio::sync::watch;
use tracing::{debug, info};

/// Race state of one reservation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetState {
    /// Nobody holds a claim.
    Open,
    /// One agent holds the claim and is filling the reservation.
    Claimed { by: String },
    /// Booking confirmed. `party` is the booker followed by the partners.
    Confirmed { by: String, party: Vec<String> },
    /// An agent exhausted its scan budget without finding enough seats.
    NoCapacity { reported_by: String },
}

impl TargetState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, TargetState::Confirmed { .. } | TargetState::NoCapacity { .. })
    }
}

/// Why the most recent claim on a target ended without a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub member_number: String,
    pub kind: FailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRecord {
    pub kind: TargetKind,
    pub state: TargetState,
    /// Claims granted so far, including released ones.
    pub claims: u32,
    pub last_failure: Option<TargetFailure>,
}

impl TargetRecord {
    fn open(kind: TargetKind) -> Self {
        Self {
            kind,
            state: TargetState::Open,
            claims: 0,
            last_failure: None,
        }
    }
}

/// Point-in-time copy of both target records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaceSnapshot {
    pub targets: [TargetRecord; 2],
}

impl RaceSnapshot {
    fn new() -> Self {
        Self {
            targets: [
                TargetRecord::open(TargetKind::Fourball),
                TargetRecord::open(TargetKind::Twoball),
            ],
        }
    }

    pub fn get(&self, kind: TargetKind) -> &TargetRecord {
        &self.targets[kind.index()]
    }

    fn get_mut(&mut self, kind: TargetKind) -> &mut TargetRecord {
        &mut self.targets[kind.index()]
    }

    pub fn all_resolved(&self) -> bool {
        self.targets.iter().all(|t| t.state.is_resolved())
    }

    /// Confirmed party of `kind`, if any.
    pub fn confirmed_party(&self, kind: TargetKind) -> Option<&[String]> {
        match &self.get(kind).state {
            TargetState::Confirmed { party, .. } => Some(party),
            _ => None,
        }
    }

    /// Target whose confirmed party already includes `member_number`.
    pub fn booked_in(&self, member_number: &str) -> Option<TargetKind> {
        TargetKind::ALL.into_iter().find(|kind| {
            self.confirmed_party(*kind)
                .is_some_and(|party| party.iter().any(|m| m == member_number))
        })
    }
}

/// Process-wide race coordination.
///
/// The state lives inside a `watch` channel: every mutation runs inside
/// `send_if_modified`, which holds the channel's write lock for the whole
/// check-and-set, and subscribers are woken only when something changed.
pub struct RaceArbiter {
    state: watch::Sender<RaceSnapshot>,
}

impl RaceArbiter {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RaceSnapshot::new());
        Self { state }
    }

    /// Claim `kind` for `member_number` if it is open.
    pub fn try_claim(&self, kind: TargetKind, member_number: &str) -> bool {
        let granted = self.state.send_if_modified(|race| {
            let record = race.get_mut(kind);
            if record.state != TargetState::Open {
                return false;
            }
            record.state = TargetState::Claimed {
                by: member_number.to_string(),
            };
            record.claims += 1;
            true
        });
        if granted {
            info!(target_kind = %kind, member = member_number, "Claim granted");
        } else {
            debug!(target_kind = %kind, member = member_number, "Claim refused");
        }
        granted
    }

    /// Reopen `kind` if `member_number` holds an unconfirmed claim on it.
    pub fn release_if_unconfirmed(
        &self,
        kind: TargetKind,
        member_number: &str,
        failure: FailureKind,
        detail: &str,
    ) -> bool {
        let released = self.state.send_if_modified(|race| {
            let record = race.get_mut(kind);
            match &record.state {
                TargetState::Claimed { by } if by == member_number => {
                    record.state = TargetState::Open;
                    record.last_failure = Some(TargetFailure {
                        member_number: member_number.to_string(),
                        kind: failure,
                        detail: detail.to_string(),
                    });
                    true
                }
                _ => false,
            }
        });
        if released {
            info!(target_kind = %kind, member = member_number, %failure, "Claim released, target reopened");
        }
        released
    }

    /// Mark the claim held by `member_number` as a confirmed booking.
    pub fn confirm(&self, kind: TargetKind, member_number: &str, partners: &[String]) -> bool {
        self.state.send_if_modified(|race| {
            let record = race.get_mut(kind);
            match &record.state {
                TargetState::Claimed { by } if by == member_number => {
                    let mut party = Vec::with_capacity(partners.len() + 1);
                    party.push(member_number.to_string());
                    party.extend(partners.iter().cloned());
                    record.state = TargetState::Confirmed {
                        by: member_number.to_string(),
                        party,
                    };
                    true
                }
                _ => false,
            }
        })
    }

    /// Record that no qualifying row could be found. Only an open target
    /// moves to `NoCapacity`; a live claim always wins.
    pub fn mark_no_capacity(&self, kind: TargetKind, member_number: &str) -> bool {
        self.state.send_if_modified(|race| {
            let record = race.get_mut(kind);
            if record.state != TargetState::Open {
                return false;
            }
            record.state = TargetState::NoCapacity {
                reported_by: member_number.to_string(),
            };
            record.last_failure = Some(TargetFailure {
                member_number: member_number.to_string(),
                kind: FailureKind::NoCapacity,
                detail: "scan budget exhausted".to_string(),
            });
            true
        })
    }

    /// Confirmed or out of capacity: nothing left to attempt.
    pub fn is_resolved(&self, kind: TargetKind) -> bool {
        self.state.borrow().get(kind).state.is_resolved()
    }

    pub fn is_open(&self, kind: TargetKind) -> bool {
        self.state.borrow().get(kind).state == TargetState::Open
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RaceSnapshot> {
        self.state.subscribe()
    }
}

impl Default for RaceArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_claim_is_exclusive() {
        let arbiter = RaceArbiter::new();
        assert!(arbiter.try_claim(TargetKind::Fourball, "2007"));
        assert!(!arbiter.try_claim(TargetKind::Fourball, "2008"));
        assert!(!arbiter.try_claim(TargetKind::Fourball, "2007"));
        // The other target is independent.
        assert!(arbiter.try_claim(TargetKind::Twoball, "2008"));
    }

    #[test]
    fn test_release_reopens_for_exactly_one_claimant() {
        let arbiter = RaceArbiter::new();
        assert!(arbiter.try_claim(TargetKind::Fourball, "A"));
        // Only the holder may release.
        assert!(!arbiter.release_if_unconfirmed(
            TargetKind::Fourball,
            "B",
            FailureKind::RosterFill,
            "x"
        ));
        assert!(arbiter.release_if_unconfirmed(
            TargetKind::Fourball,
            "A",
            FailureKind::RosterFill,
            "partner 2008 not resolved"
        ));
        assert!(arbiter.is_open(TargetKind::Fourball));

        assert!(arbiter.try_claim(TargetKind::Fourball, "C"));
        assert!(!arbiter.try_claim(TargetKind::Fourball, "D"));

        let snap = arbiter.snapshot();
        let record = snap.get(TargetKind::Fourball);
        assert_eq!(record.claims, 2);
        assert_eq!(
            record.last_failure.as_ref().map(|f| f.member_number.as_str()),
            Some("A")
        );
    }

    #[test]
    fn test_confirmed_target_cannot_be_released_or_reclaimed() {
        let arbiter = RaceArbiter::new();
        assert!(arbiter.try_claim(TargetKind::Twoball, "1101"));
        assert!(arbiter.confirm(TargetKind::Twoball, "1101", &["1107".to_string()]));
        assert!(!arbiter.release_if_unconfirmed(
            TargetKind::Twoball,
            "1101",
            FailureKind::Rejected,
            ""
        ));
        assert!(!arbiter.try_claim(TargetKind::Twoball, "2007"));
        assert!(arbiter.is_resolved(TargetKind::Twoball));

        let snap = arbiter.snapshot();
        assert_eq!(
            snap.confirmed_party(TargetKind::Twoball),
            Some(&["1101".to_string(), "1107".to_string()][..])
        );
        assert_eq!(snap.booked_in("1107"), Some(TargetKind::Twoball));
        assert_eq!(snap.booked_in("2007"), None);
    }

    #[test]
    fn test_confirm_requires_holding_the_claim() {
        let arbiter = RaceArbiter::new();
        assert!(!arbiter.confirm(TargetKind::Fourball, "2007", &[]));
        assert!(arbiter.try_claim(TargetKind::Fourball, "2007"));
        assert!(!arbiter.confirm(TargetKind::Fourball, "2008", &[]));
    }

    #[test]
    fn test_no_capacity_only_from_open() {
        let arbiter = RaceArbiter::new();
        assert!(arbiter.try_claim(TargetKind::Fourball, "A"));
        assert!(!arbiter.mark_no_capacity(TargetKind::Fourball, "B"));
        assert!(arbiter.mark_no_capacity(TargetKind::Twoball, "B"));
        assert!(arbiter.is_resolved(TargetKind::Twoball));
        assert!(!arbiter.try_claim(TargetKind::Twoball, "C"));
        assert!(!arbiter.snapshot().all_resolved());

        assert!(arbiter.confirm(TargetKind::Fourball, "A", &[]));
        assert!(arbiter.snapshot().all_resolved());
    }

    #[test]
    fn test_concurrent_claims_from_threads() {
        for _ in 0..50 {
            let arbiter = Arc::new(RaceArbiter::new());
            let winners = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let arbiter = arbiter.clone();
                    let winners = winners.clone();
                    std::thread::spawn(move || {
                        if arbiter.try_claim(TargetKind::Fourball, &format!("m{}", i)) {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(winners.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_claim_release_cycles_never_double_claim() {
        let arbiter = Arc::new(RaceArbiter::new());
        let holders = Arc::new(AtomicUsize::new(0));
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let arbiter = arbiter.clone();
            let holders = holders.clone();
            tasks.spawn(async move {
                let me = format!("m{}", i);
                for _ in 0..200 {
                    if arbiter.try_claim(TargetKind::Twoball, &me) {
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        assert_eq!(now, 1, "two agents held the claim at once");
                        tokio::task::yield_now().await;
                        holders.fetch_sub(1, Ordering::SeqCst);
                        assert!(arbiter.release_if_unconfirmed(
                            TargetKind::Twoball,
                            &me,
                            FailureKind::Rejected,
                            "cycle"
                        ));
                    }
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert!(arbiter.is_open(TargetKind::Twoball));
    }

    #[tokio::test]
    async fn test_subscribers_see_resolution() {
        let arbiter = RaceArbiter::new();
        let mut rx = arbiter.subscribe();
        assert!(arbiter.mark_no_capacity(TargetKind::Fourball, "A"));
        assert!(arbiter.try_claim(TargetKind::Twoball, "B"));
        assert!(arbiter.confirm(TargetKind::Twoball, "B", &["C".to_string()]));
        let snap = rx.wait_for(|s| s.all_resolved()).await.unwrap().clone();
        assert!(matches!(
            snap.get(TargetKind::Twoball).state,
            TargetState::Confirmed { .. }
        ));
    }
}

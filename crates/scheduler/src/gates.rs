//! Wall-clock gates of a run (login, draw open, hard deadline) and their
//! mapping onto the monotonic clock the engine waits on.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use teeclaim_core::config::ScheduleConfig;
use teeclaim_core::{Error, Result};
use tokio::time::Instant;
use tracing::debug;

/// Today's gate times in the portal's timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateTimes {
    pub login: DateTime<Tz>,
    pub draw_open: DateTime<Tz>,
    pub deadline: DateTime<Tz>,
}

/// Gate times translated to `tokio::time::Instant`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInstants {
    pub login: Instant,
    pub draw_open: Instant,
    pub deadline: Instant,
}

impl GateTimes {
    /// Gates on the local calendar day of `now`.
    pub fn for_day(now: DateTime<Utc>, schedule: &ScheduleConfig) -> Result<Self> {
        let tz = schedule.tz()?;
        let local_now = now.with_timezone(&tz);
        Ok(Self {
            login: local_at(&tz, &local_now, schedule.login_at()?)?,
            draw_open: local_at(&tz, &local_now, schedule.draw_open_at()?)?,
            deadline: local_at(&tz, &local_now, schedule.deadline_at()?)?,
        })
    }

    /// Gates for an immediate run: login and draw collapse to `now`, the
    /// deadline keeps its configured distance from the draw opening.
    pub fn starting_now(now: DateTime<Utc>, schedule: &ScheduleConfig) -> Result<Self> {
        let gates = Self::for_day(now, schedule)?;
        let window = gates.deadline - gates.draw_open;
        let local_now = now.with_timezone(&gates.login.timezone());
        Ok(Self {
            login: local_now,
            draw_open: local_now,
            deadline: local_now + window,
        })
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline.with_timezone(&Utc) <= now
    }

    /// Map onto the monotonic clock, anchored at (`now`, `anchor`).
    pub fn instants(&self, now: DateTime<Utc>, anchor: Instant) -> GateInstants {
        GateInstants {
            login: instant_at(self.login.with_timezone(&Utc), now, anchor),
            draw_open: instant_at(self.draw_open.with_timezone(&Utc), now, anchor),
            deadline: instant_at(self.deadline.with_timezone(&Utc), now, anchor),
        }
    }
}

fn local_at(tz: &Tz, local_now: &DateTime<Tz>, time: NaiveTime) -> Result<DateTime<Tz>> {
    let naive = local_now.date_naive().and_time(time);
    tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
        Error::Config(format!("{} does not exist in {} (DST gap)", naive, tz.name()))
    })
}

/// Instants in the past collapse to `anchor`.
pub fn instant_at(at: DateTime<Utc>, now: DateTime<Utc>, anchor: Instant) -> Instant {
    match (at - now).to_std() {
        Ok(ahead) => anchor + ahead,
        Err(_) => {
            debug!(%at, "gate already passed");
            anchor
        }
    }
}

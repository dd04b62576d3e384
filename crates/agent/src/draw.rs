//! Per-agent Draw/Queue state machine.
//!
//! `Idle → AwaitingDraw → EnteredDraw → InQueue → TeeSheetReady → Done`.
//! The event list is loaded once, in `Idle`. From then on every check is
//! passive and never reloads the page: a reload while waiting for the draw
//! or after entering it forfeits the agent's place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use teeclaim_core::config::TimingConfig;
use teeclaim_core::{AgentEvent, Error, PortalDriver, Result, RunRecorder};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{pause, pause_until, Throttle};
use crate::plan::RunPlan;

const EVENT_LIST_ATTEMPTS: u32 = 3;
const EVENT_LIST_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawState {
    Idle,
    AwaitingDraw,
    EnteredDraw,
    InQueue,
    TeeSheetReady,
    Done,
}

impl fmt::Display for DrawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrawState::Idle => "idle",
            DrawState::AwaitingDraw => "awaiting_draw",
            DrawState::EnteredDraw => "entered_draw",
            DrawState::InQueue => "in_queue",
            DrawState::TeeSheetReady => "tee_sheet_ready",
            DrawState::Done => "done",
        };
        write!(f, "{}", s)
    }
}

pub struct DrawQueue {
    member: String,
    state: DrawState,
    history: Vec<DrawState>,
    timing: TimingConfig,
    draw_open_at: Instant,
    recorder: Arc<dyn RunRecorder>,
}

impl DrawQueue {
    pub fn new(member: &str, plan: &RunPlan, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            member: member.to_string(),
            state: DrawState::Idle,
            history: vec![DrawState::Idle],
            timing: plan.timing.clone(),
            draw_open_at: plan.draw_open_at,
            recorder,
        }
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[DrawState] {
        &self.history
    }

    /// Drive the machine until the tee sheet is visible.
    pub async fn run_to_tee_sheet(
        &mut self,
        driver: &dyn PortalDriver,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.state == DrawState::Idle {
            self.open_event_list(driver, cancel).await?;
            self.transition(DrawState::AwaitingDraw);
        }
        if self.state == DrawState::AwaitingDraw {
            self.await_draw(driver, cancel).await?;
            self.transition(DrawState::EnteredDraw);
        }
        self.await_tee_sheet(driver, cancel).await
    }

    /// Booking attempts are over for this agent.
    pub fn finish(&mut self) {
        if self.state != DrawState::Done {
            self.transition(DrawState::Done);
        }
    }

    fn transition(&mut self, to: DrawState) {
        let from = self.state;
        info!(member = %self.member, %from, %to, "Draw state changed");
        self.state = to;
        self.history.push(to);
        self.recorder.record(
            &self.member,
            &AgentEvent::StateChanged {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
    }

    async fn open_event_list(
        &self,
        driver: &dyn PortalDriver,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=EVENT_LIST_ATTEMPTS {
            match driver.open_event_list().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(member = %self.member, attempt, error = %e, "Event list failed to load");
                    last_error = Some(e);
                }
            }
            if attempt < EVENT_LIST_ATTEMPTS {
                pause(EVENT_LIST_BACKOFF * attempt, cancel).await?;
            }
        }
        Err(Error::Navigation(format!(
            "event list unavailable after {} attempts: {}",
            EVENT_LIST_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Poll the entry affordance without reloading and click it on first
    /// sight. Past the scheduled opening one forced click is made even if
    /// the passive check never fires.
    async fn await_draw(&self, driver: &dyn PortalDriver, cancel: &CancellationToken) -> Result<()> {
        let mut entry_failures = 0u32;
        let mut forced = false;
        let mut status = Throttle::new(Duration::from_secs(30));

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            let open = match driver.is_draw_open().await {
                Ok(open) => open,
                Err(e) => {
                    debug!(member = %self.member, error = %e, "Draw check failed");
                    false
                }
            };
            let force = !open && !forced && now >= self.draw_open_at;

            if open || force {
                if force {
                    forced = true;
                    info!(member = %self.member, "Draw time reached without entry affordance, forcing entry");
                }
                match driver.enter_draw().await {
                    Ok(()) => {
                        info!(member = %self.member, forced = force, "Entered draw");
                        return Ok(());
                    }
                    Err(e) if e.is_interruption() => return Err(e),
                    Err(e) => {
                        entry_failures += 1;
                        warn!(
                            member = %self.member,
                            entry_failures,
                            error = %e,
                            "Draw entry failed"
                        );
                        if entry_failures >= self.timing.max_entry_failures {
                            return Err(Error::Navigation(format!(
                                "draw entry failed {} times: {}",
                                entry_failures, e
                            )));
                        }
                    }
                }
            } else if status.ready() {
                let until = self.draw_open_at.saturating_duration_since(now);
                info!(member = %self.member, until_draw_secs = until.as_secs(), "Waiting for draw");
            }

            pause_until(self.next_poll(Instant::now()), cancel).await?;
        }
    }

    /// Coarse polling far from the draw, tight polling inside the near
    /// window. A coarse poll never sleeps past the start of the window.
    fn next_poll(&self, now: Instant) -> Instant {
        let window_start = self
            .draw_open_at
            .checked_sub(self.timing.near_window())
            .unwrap_or(self.draw_open_at);
        if now < window_start {
            (now + self.timing.far_poll()).min(window_start)
        } else {
            now + self.timing.near_poll()
        }
    }

    async fn await_tee_sheet(
        &mut self,
        driver: &dyn PortalDriver,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut draw_status = Throttle::new(Duration::from_secs(10));
        let mut queue_status = Throttle::new(Duration::from_secs(5));
        let mut last_position = None;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let visible = driver
                .is_tee_sheet_visible()
                .await
                .map_err(|e| self.fatal(e))?;
            if visible {
                self.transition(DrawState::TeeSheetReady);
                return Ok(());
            }

            let status = driver.queue_status().await.map_err(|e| self.fatal(e))?;
            match (self.state, status) {
                (DrawState::EnteredDraw, Some(status)) => {
                    self.transition(DrawState::InQueue);
                    self.observe_queue(status.position, status.bookings_available);
                    last_position = status.position;
                }
                (DrawState::EnteredDraw, None) => {
                    if draw_status.ready() {
                        match driver.draw_countdown().await.map_err(|e| self.fatal(e))? {
                            Some(left) => info!(
                                member = %self.member,
                                opens_in_secs = left.as_secs(),
                                "In draw"
                            ),
                            None => info!(member = %self.member, "In draw, waiting for queue"),
                        }
                    }
                }
                (_, Some(status)) => {
                    if status.position != last_position && queue_status.ready() {
                        self.observe_queue(status.position, status.bookings_available);
                        last_position = status.position;
                    }
                }
                (_, None) => {}
            }

            let poll = if self.state == DrawState::InQueue {
                self.timing.queue_poll()
            } else {
                self.timing.draw_poll()
            };
            pause(poll, cancel).await?;
        }
    }

    fn observe_queue(&self, position: Option<u32>, bookings_available: Option<u32>) {
        info!(
            member = %self.member,
            position = ?position,
            bookings_available = ?bookings_available,
            "Queue position"
        );
        self.recorder.record(
            &self.member,
            &AgentEvent::QueueObserved {
                position,
                bookings_available,
            },
        );
    }

    /// Any failure after entering the draw ends this agent: the draw cannot
    /// be re-entered.
    fn fatal(&self, e: Error) -> Error {
        if e.is_interruption() {
            return e;
        }
        Error::Navigation(format!("{} while {}", e, self.state))
    }
}

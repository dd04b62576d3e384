//! Scripted in-memory portal used by the engine tests.
//!
//! Every agent gets its own `ScriptedPortal`; all of them share one
//! `TeeSheet`, so seat holds and bookings made by one agent are visible to
//! the others the same way they would be on the real portal.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use teeclaim_core::{
    Confirmation, Error, Identity, PortalDriver, PortalFactory, QueueStatus, Result,
    RowAcquisition, RowRef, Suggestion, TeeRow,
};
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SignIn(String),
    OpenEventList,
    IsDrawOpen(bool),
    EnterDraw,
    QueueStatus,
    DrawCountdown,
    IsTeeSheetVisible(bool),
    ScanRows,
    RefreshTeeSheet,
    ClickBookGroup(String),
    DeclinePartnerPrompt,
    SubmitPartnerSearch(String),
    SelectSuggestion(String),
    ConfirmBooking,
    AbandonBooking,
    Close,
}

#[derive(Debug)]
struct SheetRow {
    label: String,
    empty: u8,
    held_by: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct TeeSheet {
    rows: Arc<Mutex<Vec<SheetRow>>>,
}

impl TeeSheet {
    /// Rows start at 07:00 and are eight minutes apart.
    pub(crate) fn new(seats: &[u8]) -> Self {
        let rows = seats
            .iter()
            .enumerate()
            .map(|(i, empty)| {
                let minutes = 7 * 60 + i * 8;
                SheetRow {
                    label: format!("{:02}:{:02}", minutes / 60, minutes % 60),
                    empty: *empty,
                    held_by: None,
                }
            })
            .collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub(crate) fn seats(&self) -> Vec<u8> {
        self.rows.lock().unwrap().iter().map(|r| r.empty).collect()
    }

    fn visible(&self) -> Vec<TeeRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(index, r)| TeeRow {
                row: RowRef {
                    index,
                    label: r.label.clone(),
                },
                // A held row shows no bookable seats.
                empty_seats: if r.held_by.is_some() { 0 } else { r.empty },
            })
            .collect()
    }

    fn hold(&self, label: &str, member: &str, min_seats: u8) -> RowAcquisition {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.label == label) else {
            return RowAcquisition::Unavailable(format!("row {} not on the sheet", label));
        };
        if let Some(holder) = &row.held_by {
            return RowAcquisition::Unavailable(format!("row {} is locked by {}", label, holder));
        }
        if row.empty < min_seats {
            return RowAcquisition::Unavailable(format!(
                "row {} has {} empty seats",
                label, row.empty
            ));
        }
        row.held_by = Some(member.to_string());
        RowAcquisition::Acquired
    }

    fn book(&self, label: &str, member: &str, seats: u8) -> bool {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|r| r.label == label && r.held_by.as_deref() == Some(member))
        {
            Some(row) => {
                row.empty = row.empty.saturating_sub(seats);
                row.held_by = None;
                true
            }
            None => false,
        }
    }

    /// Another club member books the whole row.
    fn take(&self, label: &str) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.label == label) {
            row.empty = 0;
        }
    }

    fn release(&self, label: &str, member: &str) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.label == label && r.held_by.as_deref() == Some(member))
        {
            row.held_by = None;
        }
    }
}

/// How one scripted portal behaves.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    /// `None`: the entry affordance is clickable from the start.
    pub draw_opens_at: Option<Instant>,
    /// The passive check never reports the draw as open.
    pub entry_hidden: bool,
    /// `enter_draw` fails this many times before it works.
    pub enter_failures: u32,
    /// Time between entering the draw and being placed in the queue.
    pub draw_phase: Duration,
    /// Time spent in the queue before the tee sheet appears.
    pub queue_phase: Duration,
    /// Reading the queue fails with a navigation error.
    pub queue_error: bool,
    pub open_event_list_failures: u32,
    pub click_latency: Duration,
    pub decline_latency: Duration,
    pub search_latency: Duration,
    pub select_latency: Duration,
    pub confirm_latency: Duration,
    /// Partners whose selection leaves raw digits in the input.
    pub unresolved: HashSet<String>,
    /// Partners for whom autocomplete offers nothing.
    pub no_suggestion: HashSet<String>,
    pub reject_confirm: bool,
    /// Rows taken by someone outside the run between the scan and this
    /// portal's Book Group click.
    pub taken_before_click: HashSet<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            draw_opens_at: None,
            entry_hidden: false,
            enter_failures: 0,
            draw_phase: Duration::from_secs(2),
            queue_phase: Duration::from_secs(3),
            queue_error: false,
            open_event_list_failures: 0,
            click_latency: Duration::ZERO,
            decline_latency: Duration::from_secs(1),
            search_latency: Duration::from_secs(1),
            select_latency: Duration::from_millis(500),
            confirm_latency: Duration::from_secs(1),
            unresolved: HashSet::new(),
            no_suggestion: HashSet::new(),
            reject_confirm: false,
            taken_before_click: HashSet::new(),
        }
    }
}

#[derive(Debug, Default)]
struct PortalState {
    calls: Vec<Call>,
    entered_at: Option<Instant>,
    enter_failures: u32,
    event_list_failures: u32,
    holding: Option<(String, u8)>,
}

struct Inner {
    member: String,
    script: Script,
    sheet: TeeSheet,
    state: Mutex<PortalState>,
}

#[derive(Clone)]
pub(crate) struct ScriptedPortal {
    inner: Arc<Inner>,
}

impl ScriptedPortal {
    pub(crate) fn new(member: &str, script: Script, sheet: TeeSheet) -> Self {
        let state = PortalState {
            enter_failures: script.enter_failures,
            event_list_failures: script.open_event_list_failures,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Inner {
                member: member.to_string(),
                script,
                sheet,
                state: Mutex::new(state),
            }),
        }
    }

    /// A portal that is already showing the tee sheet, as if the draw and
    /// the queue had been passed.
    pub(crate) fn on_tee_sheet(member: &str, script: Script, sheet: TeeSheet) -> Self {
        let portal = Self::new(member, script, sheet);
        let entered = Instant::now()
            .checked_sub(portal.inner.script.draw_phase + portal.inner.script.queue_phase)
            .unwrap_or_else(Instant::now);
        portal.inner.state.lock().unwrap().entered_at = Some(entered);
        portal
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Reloads issued from the first draw check until the tee sheet shows:
    /// everything after the initial event list load.
    pub(crate) fn reloads_since_awaiting_draw(&self) -> usize {
        self.calls()
            .iter()
            .skip_while(|c| !matches!(c, Call::IsDrawOpen(_)))
            .take_while(|c| **c != Call::IsTeeSheetVisible(true))
            .filter(|c| matches!(c, Call::OpenEventList | Call::RefreshTeeSheet))
            .count()
    }

    fn log(&self, call: Call) {
        self.inner.state.lock().unwrap().calls.push(call);
    }

    fn phase_elapsed(&self) -> Option<Duration> {
        self.inner
            .state
            .lock()
            .unwrap()
            .entered_at
            .map(|at| Instant::now().saturating_duration_since(at))
    }
}

#[async_trait]
impl PortalDriver for ScriptedPortal {
    async fn sign_in(&self, identity: &Identity) -> Result<()> {
        self.log(Call::SignIn(identity.member_number.clone()));
        Ok(())
    }

    async fn open_event_list(&self) -> Result<()> {
        self.log(Call::OpenEventList);
        let mut state = self.inner.state.lock().unwrap();
        if state.event_list_failures > 0 {
            state.event_list_failures -= 1;
            return Err(Error::Navigation("event list did not load".to_string()));
        }
        Ok(())
    }

    async fn is_draw_open(&self) -> Result<bool> {
        let script = &self.inner.script;
        let open = !script.entry_hidden
            && script.draw_opens_at.map_or(true, |at| Instant::now() >= at);
        self.log(Call::IsDrawOpen(open));
        Ok(open)
    }

    async fn enter_draw(&self) -> Result<()> {
        self.log(Call::EnterDraw);
        let mut state = self.inner.state.lock().unwrap();
        if state.enter_failures > 0 {
            state.enter_failures -= 1;
            return Err(Error::Portal("entry button not clickable".to_string()));
        }
        state.entered_at = Some(Instant::now());
        Ok(())
    }

    async fn queue_status(&self) -> Result<Option<QueueStatus>> {
        self.log(Call::QueueStatus);
        let script = &self.inner.script;
        let Some(elapsed) = self.phase_elapsed() else {
            return Ok(None);
        };
        if elapsed < script.draw_phase || elapsed >= script.draw_phase + script.queue_phase {
            return Ok(None);
        }
        if script.queue_error {
            return Err(Error::Navigation("queue page went away".to_string()));
        }
        let left = script.draw_phase + script.queue_phase - elapsed;
        Ok(Some(QueueStatus {
            position: Some(left.as_secs() as u32 + 1),
            bookings_available: Some(120),
        }))
    }

    async fn draw_countdown(&self) -> Result<Option<Duration>> {
        self.log(Call::DrawCountdown);
        Ok(self
            .phase_elapsed()
            .and_then(|elapsed| self.inner.script.draw_phase.checked_sub(elapsed)))
    }

    async fn is_tee_sheet_visible(&self) -> Result<bool> {
        let script = &self.inner.script;
        let visible = self
            .phase_elapsed()
            .is_some_and(|elapsed| elapsed >= script.draw_phase + script.queue_phase);
        self.log(Call::IsTeeSheetVisible(visible));
        Ok(visible)
    }

    async fn scan_rows(&self) -> Result<Vec<TeeRow>> {
        self.log(Call::ScanRows);
        Ok(self.inner.sheet.visible())
    }

    async fn refresh_tee_sheet(&self) -> Result<()> {
        self.log(Call::RefreshTeeSheet);
        Ok(())
    }

    async fn click_book_group(&self, row: &RowRef, min_seats: u8) -> Result<RowAcquisition> {
        self.log(Call::ClickBookGroup(row.label.clone()));
        sleep(self.inner.script.click_latency).await;
        if self.inner.script.taken_before_click.contains(&row.label) {
            self.inner.sheet.take(&row.label);
        }
        let acquisition = self.inner.sheet.hold(&row.label, &self.inner.member, min_seats);
        if acquisition == RowAcquisition::Acquired {
            self.inner.state.lock().unwrap().holding = Some((row.label.clone(), min_seats));
        }
        Ok(acquisition)
    }

    async fn decline_partner_prompt(&self) -> Result<()> {
        self.log(Call::DeclinePartnerPrompt);
        sleep(self.inner.script.decline_latency).await;
        Ok(())
    }

    async fn submit_partner_search(&self, member_number: &str) -> Result<Option<Suggestion>> {
        self.log(Call::SubmitPartnerSearch(member_number.to_string()));
        sleep(self.inner.script.search_latency).await;
        if self.inner.script.no_suggestion.contains(member_number) {
            return Ok(None);
        }
        Ok(Some(Suggestion {
            member_number: member_number.to_string(),
            label: format!("Member {} ({})", member_number, member_number),
        }))
    }

    async fn select_suggestion(&self, suggestion: &Suggestion) -> Result<String> {
        self.log(Call::SelectSuggestion(suggestion.member_number.clone()));
        sleep(self.inner.script.select_latency).await;
        if self.inner.script.unresolved.contains(&suggestion.member_number) {
            return Ok(suggestion.member_number.clone());
        }
        Ok(suggestion.label.clone())
    }

    async fn confirm_booking(&self) -> Result<Confirmation> {
        self.log(Call::ConfirmBooking);
        sleep(self.inner.script.confirm_latency).await;
        let holding = self.inner.state.lock().unwrap().holding.take();
        let Some((label, seats)) = holding else {
            return Ok(Confirmation::Rejected("no booking in progress".to_string()));
        };
        if self.inner.script.reject_confirm {
            self.inner.sheet.release(&label, &self.inner.member);
            return Ok(Confirmation::Rejected(
                "The booking could not be completed".to_string(),
            ));
        }
        if self.inner.sheet.book(&label, &self.inner.member, seats) {
            Ok(Confirmation::Confirmed("Your booking has been made".to_string()))
        } else {
            Ok(Confirmation::Rejected("row lock expired".to_string()))
        }
    }

    async fn abandon_booking(&self) -> Result<()> {
        self.log(Call::AbandonBooking);
        let holding = self.inner.state.lock().unwrap().holding.take();
        if let Some((label, _)) = holding {
            self.inner.sheet.release(&label, &self.inner.member);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log(Call::Close);
        Ok(())
    }
}

/// Hands out scripted portals and keeps a handle on each for assertions.
pub(crate) struct ScriptedFactory {
    sheet: TeeSheet,
    default_script: Script,
    scripts: HashMap<String, Script>,
    opened: Mutex<HashMap<String, ScriptedPortal>>,
}

impl ScriptedFactory {
    pub(crate) fn new(sheet: TeeSheet) -> Self {
        Self {
            sheet,
            default_script: Script::default(),
            scripts: HashMap::new(),
            opened: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn with_script(mut self, member: &str, script: Script) -> Self {
        self.scripts.insert(member.to_string(), script);
        self
    }

    pub(crate) fn portal(&self, member: &str) -> ScriptedPortal {
        self.opened
            .lock()
            .unwrap()
            .get(member)
            .cloned()
            .unwrap_or_else(|| panic!("no portal opened for {}", member))
    }

    pub(crate) fn opened(&self) -> Vec<ScriptedPortal> {
        self.opened.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl PortalFactory for ScriptedFactory {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn PortalDriver>> {
        let script = self
            .scripts
            .get(&identity.member_number)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone());
        let portal = ScriptedPortal::new(&identity.member_number, script, self.sheet.clone());
        self.opened
            .lock()
            .unwrap()
            .insert(identity.member_number.clone(), portal.clone());
        Ok(Box::new(portal))
    }
}

/// Recorder that keeps events in memory.
#[derive(Default)]
pub(crate) struct MemoryRecorder {
    events: Mutex<Vec<(String, teeclaim_core::AgentEvent)>>,
}

impl MemoryRecorder {
    pub(crate) fn events_for(&self, member: &str) -> Vec<teeclaim_core::AgentEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == member)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl teeclaim_core::RunRecorder for MemoryRecorder {
    fn record(&self, member_number: &str, event: &teeclaim_core::AgentEvent) {
        self.events
            .lock()
            .unwrap()
            .push((member_number.to_string(), event.clone()));
    }

    fn screenshot(&self, _member_number: &str, _label: &str, _png: &[u8]) {}
}

//! MiClub members portal driven through a private browser session.
//!
//! All DOM access is page script evaluated over CDP. Reads never navigate,
//! and waiting for the draw polls the event list with a background fetch.
//! The only navigations are sign-in, the first event list load, draw entry
//! before the waiting room is reached, tee-sheet refreshes and leaving a
//! booking page.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teeclaim_core::config::PortalConfig;
use teeclaim_core::{
    Confirmation, Error, Identity, Paths, PortalDriver, PortalFactory, QueueStatus, Result,
    RowAcquisition, RowRef, Suggestion, TeeRow,
};
use teeclaim_scheduler::TargetDay;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::browser::{BrowserEngine, BrowserSession};
use crate::text;

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);
const LOGIN_WAIT: Duration = Duration::from_secs(30);
const TEE_SHEET_WAIT: Duration = Duration::from_secs(30);
const PROMPT_WAIT: Duration = Duration::from_secs(15);
const SUGGESTION_WAIT: Duration = Duration::from_secs(10);
const CONFIRM_BUTTON_WAIT: Duration = Duration::from_secs(8);
const ADMISSION_WAIT: Duration = Duration::from_secs(8);
const POLL: Duration = Duration::from_millis(250);
const SETTLE: Duration = Duration::from_secs(1);

const BODY_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

const TEE_SHEET_JS: &str =
    "!!document.querySelector(\".teetime-day-table div[class*='row-time']\")";

const LOGGED_IN_JS: &str = "!!document.querySelector(\"a[href*='logout']\")";

const LOGIN_FORM_JS: &str = "!!document.querySelector(\"input[name='user']\")";

const SCAN_ROWS_JS: &str = r#"
Array.from(document.querySelectorAll("div[class*='row-time']")).map((row, i) => {
  const h3 = row.querySelector('h3');
  return {
    label: h3 ? h3.innerText.trim() : '',
    empty: row.querySelectorAll("button[class*='btn-book-me']").length,
  };
})
"#;

const DECLINE_PROMPT_JS: &str = r#"
(() => {
  const no = Array.from(document.querySelectorAll('button, a'))
    .find(e => e.textContent.trim() === 'No' && e.offsetParent !== null);
  if (!no) return false;
  no.click();
  return true;
})()
"#;

const FOCUS_PARTNER_INPUT_JS: &str = r#"
(() => {
  document.querySelectorAll('[data-teeclaim-partner]')
    .forEach(e => e.removeAttribute('data-teeclaim-partner'));
  const usable = e => e.offsetParent !== null && !e.disabled && e.type !== 'hidden'
    && !(e.value || '').trim();
  const selectors = [
    "input[class*='ui-autocomplete-input']",
    "input[placeholder*='Find Player'], input[placeholder*='find player'], input[placeholder*='Search'], input[placeholder*='Player']",
    "input[type='text']:not([disabled])",
  ];
  for (const sel of selectors) {
    const input = Array.from(document.querySelectorAll(sel)).find(usable);
    if (input) {
      input.setAttribute('data-teeclaim-partner', '1');
      input.scrollIntoView({block: 'center'});
      input.focus();
      input.value = '';
      return true;
    }
  }
  return false;
})()
"#;

const SUGGESTIONS: &str = "[class*='ui-autocomplete-item'], [class*='ac_results'] li, \
[class*='autocomplete-result'], [class*='ui-menu-item']";

const PARTNER_VALUE_JS: &str = r#"
(() => {
  const e = document.querySelector('[data-teeclaim-partner]');
  return e ? (e.value || '') : '';
})()
"#;

const CONFIRM_JS: &str = r#"
(() => {
  const btn = Array.from(document.querySelectorAll('a, button'))
    .find(e => e.textContent.trim() === 'Confirm Booking' && e.offsetParent !== null);
  if (!btn) return false;
  btn.scrollIntoView({block: 'center'});
  btn.click();
  return true;
})()
"#;

const CANCEL_JS: &str = r#"
(() => {
  const btn = Array.from(document.querySelectorAll('a, button')).find(e => {
    const t = e.textContent.trim();
    return (e.tagName === 'A' && t === 'CANCEL') || (e.tagName === 'BUTTON' && t === 'Cancel');
  });
  if (!btn) return false;
  btn.click();
  return true;
})()
"#;

/// Event-list entry for the target day, as read or clicked.
#[derive(Debug, Deserialize)]
struct EventLink {
    open: bool,
    #[serde(default)]
    href: String,
}

#[derive(Debug, Deserialize)]
struct ScannedRow {
    label: String,
    empty: u8,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum BookGroupClick {
    Clicked,
    Missing,
    Full { seats: u8 },
    NoButton,
}

pub struct MiclubPortal {
    member: String,
    config: PortalConfig,
    day: TargetDay,
    session: BrowserSession,
    dialogs: Arc<Mutex<Vec<String>>>,
    dialog_watch: JoinHandle<()>,
    tee_sheet_url: Mutex<Option<String>>,
    draw_href: Mutex<Option<String>>,
}

impl MiclubPortal {
    /// Wrap a launched session. Page dialogs are accepted as they open and
    /// their text kept for the step that triggered them.
    pub async fn new(member: &str, config: PortalConfig, day: TargetDay, session: BrowserSession) -> Self {
        let dialogs: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let mut opened = session
            .cdp
            .subscribe_event("Page.javascriptDialogOpening")
            .await;
        let cdp = session.cdp.clone();
        let seen = dialogs.clone();
        let who = member.to_string();
        let dialog_watch = tokio::spawn(async move {
            while let Some(params) = opened.recv().await {
                let message = params
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                info!(member = %who, %message, "Accepting page dialog");
                if let Ok(mut seen) = seen.lock() {
                    seen.push(message);
                }
                if let Err(e) = cdp.handle_dialog(true).await {
                    warn!(member = %who, error = %e, "Dialog accept failed");
                }
            }
        });

        Self {
            member: member.to_string(),
            config,
            day,
            session,
            dialogs,
            dialog_watch,
            tee_sheet_url: Mutex::new(None),
            draw_href: Mutex::new(None),
        }
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        self.session.cdp.evaluate(script).await
    }

    async fn eval_bool(&self, script: &str) -> Result<bool> {
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self
            .eval(BODY_TEXT_JS)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .eval("location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<()> {
        let mut loaded = self.session.cdp.subscribe_event("Page.loadEventFired").await;
        self.session.cdp.navigate(url).await?;
        self.await_load(&mut loaded, url).await
    }

    async fn reload(&self) -> Result<()> {
        let mut loaded = self.session.cdp.subscribe_event("Page.loadEventFired").await;
        self.session.cdp.reload().await?;
        self.await_load(&mut loaded, "reload").await
    }

    async fn await_load(
        &self,
        loaded: &mut tokio::sync::mpsc::Receiver<Value>,
        what: &str,
    ) -> Result<()> {
        match timeout(PAGE_LOAD_TIMEOUT, loaded.recv()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(Error::Portal("browser connection closed".to_string())),
            Err(_) => Err(Error::Timeout(format!(
                "page load ({}) after {}s",
                what,
                PAGE_LOAD_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Poll `script` until it yields `true`. Script errors count as `false`:
    /// they are expected while a navigation is in flight.
    async fn wait_until(&self, script: &str, limit: Duration) -> bool {
        let until = Instant::now() + limit;
        loop {
            match self.eval_bool(script).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!(member = %self.member, error = %e, "Page poll failed"),
            }
            if Instant::now() >= until {
                return false;
            }
            sleep(POLL).await;
        }
    }

    async fn wait_for_value(&self, script: &str, limit: Duration) -> Option<Value> {
        let until = Instant::now() + limit;
        loop {
            if let Ok(value) = self.eval(script).await {
                if !value.is_null() {
                    return Some(value);
                }
            }
            if Instant::now() >= until {
                return None;
            }
            sleep(POLL).await;
        }
    }

    fn clear_dialogs(&self) {
        if let Ok(mut seen) = self.dialogs.lock() {
            seen.clear();
        }
    }

    fn take_dialog(&self) -> Option<String> {
        self.dialogs.lock().ok().and_then(|mut seen| seen.pop())
    }

    fn remembered_tee_sheet(&self) -> Option<String> {
        self.tee_sheet_url.lock().ok().and_then(|url| url.clone())
    }

    async fn in_waiting_room(&self) -> Result<bool> {
        if self.eval_bool(TEE_SHEET_JS).await? {
            return Ok(true);
        }
        let body = self.body_text().await?;
        Ok(text::in_draw(&body) || text::queue_status(&body).is_some())
    }

    /// Give a slow admission time to land before anything navigates away
    /// from it.
    async fn await_admission(&self) -> bool {
        poll_until(ADMISSION_WAIT, POLL, || async move {
            self.in_waiting_room().await.unwrap_or_else(|e| {
                debug!(member = %self.member, error = %e, "Admission check failed");
                false
            })
        })
        .await
    }

    async fn event_link(&self, click: bool) -> Result<Option<EventLink>> {
        let value = self.eval(&event_link_script(&self.day, click)).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn back_to_tee_sheet(&self) -> Result<()> {
        match self.remembered_tee_sheet() {
            Some(url) => self.goto(&url).await,
            None => self.goto(&self.config.event_list_url()).await,
        }
    }
}

impl Drop for MiclubPortal {
    fn drop(&mut self) {
        self.dialog_watch.abort();
    }
}

#[async_trait]
impl PortalDriver for MiclubPortal {
    async fn sign_in(&self, identity: &Identity) -> Result<()> {
        info!(member = %self.member, "Signing in");
        self.goto(&self.config.login_url()).await?;
        if !self.wait_until(LOGIN_FORM_JS, LOGIN_WAIT).await {
            return Err(Error::Navigation("login form not found".to_string()));
        }
        if !self.eval_bool(&login_script(identity)).await? {
            return Err(Error::Navigation("login form incomplete".to_string()));
        }
        if !self.wait_until(LOGGED_IN_JS, LOGIN_WAIT).await {
            return Err(Error::Navigation(format!(
                "login for {} was not accepted",
                identity.member_number
            )));
        }
        info!(member = %self.member, "Signed in");
        Ok(())
    }

    async fn open_event_list(&self) -> Result<()> {
        self.goto(&self.config.event_list_url()).await
    }

    /// Passive: the live page is never reloaded. The entry's status is read
    /// from a background fetch of the event list.
    async fn is_draw_open(&self) -> Result<bool> {
        let script = event_status_script(&self.day, &self.config.event_list_url());
        let value = self.eval(&script).await?;
        if value.is_null() {
            debug!(
                member = %self.member,
                day = %self.day.weekday_label,
                date = %self.day.date_label,
                "Event not listed yet"
            );
            return Ok(false);
        }
        let link: EventLink = serde_json::from_value(value)?;
        if let Some(href) = direct_href(&link.href) {
            if let Ok(mut slot) = self.draw_href.lock() {
                *slot = Some(href);
            }
        }
        Ok(link.open)
    }

    async fn enter_draw(&self) -> Result<()> {
        self.clear_dialogs();
        let link = self.event_link(true).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "event for {} {}",
                self.day.weekday_label, self.day.date_label
            ))
        })?;
        if self.await_admission().await {
            return Ok(());
        }

        let href = direct_href(&link.href)
            .or_else(|| self.draw_href.lock().ok().and_then(|href| href.clone()));
        if let Some(href) = href {
            debug!(member = %self.member, %href, "Entry click had no effect, opening link directly");
            self.goto(&href).await?;
            if self.await_admission().await {
                return Ok(());
            }
        }

        let list = self.config.event_list_url();
        if self.current_url().await.unwrap_or_default() != list {
            self.goto(&list).await?;
        }
        Err(Error::Navigation("not admitted to the draw".to_string()))
    }

    async fn queue_status(&self) -> Result<Option<QueueStatus>> {
        Ok(text::queue_status(&self.body_text().await?))
    }

    async fn draw_countdown(&self) -> Result<Option<Duration>> {
        let body = self.body_text().await?;
        if !text::in_draw(&body) {
            return Ok(None);
        }
        Ok(text::opens_in(&body))
    }

    async fn is_tee_sheet_visible(&self) -> Result<bool> {
        let visible = self.eval_bool(TEE_SHEET_JS).await?;
        if visible && self.remembered_tee_sheet().is_none() {
            let url = self.current_url().await?;
            if let Ok(mut slot) = self.tee_sheet_url.lock() {
                *slot = Some(url);
            }
        }
        Ok(visible)
    }

    async fn scan_rows(&self) -> Result<Vec<TeeRow>> {
        let rows: Vec<ScannedRow> = serde_json::from_value(self.eval(SCAN_ROWS_JS).await?)?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, r)| TeeRow {
                row: RowRef {
                    index,
                    label: r.label,
                },
                empty_seats: r.empty,
            })
            .collect())
    }

    async fn refresh_tee_sheet(&self) -> Result<()> {
        let on_sheet = match self.remembered_tee_sheet() {
            Some(url) => self.current_url().await? == url,
            None => true,
        };
        if on_sheet {
            self.reload().await?;
        } else {
            self.back_to_tee_sheet().await?;
        }
        if !self.wait_until(TEE_SHEET_JS, TEE_SHEET_WAIT).await {
            return Err(Error::Navigation("tee sheet did not come back after refresh".to_string()));
        }
        Ok(())
    }

    async fn click_book_group(&self, row: &RowRef, min_seats: u8) -> Result<RowAcquisition> {
        self.clear_dialogs();
        let clicked: BookGroupClick =
            serde_json::from_value(self.eval(&book_group_script(row, min_seats)).await?)?;
        match clicked {
            BookGroupClick::Clicked => {}
            BookGroupClick::Missing => {
                return Ok(RowAcquisition::Unavailable(format!(
                    "row {} no longer listed",
                    row.label
                )))
            }
            BookGroupClick::Full { seats } => {
                return Ok(RowAcquisition::Unavailable(format!(
                    "row {} has {} empty seats, {} needed",
                    row.label, seats, min_seats
                )))
            }
            BookGroupClick::NoButton => {
                return Ok(RowAcquisition::Unavailable(format!(
                    "row {} offers no Book Group",
                    row.label
                )))
            }
        }
        sleep(SETTLE).await;
        if let Some(message) = self.take_dialog() {
            return Ok(RowAcquisition::Unavailable(format!("row locked: {}", message)));
        }
        info!(member = %self.member, row = %row.label, "Book Group clicked");
        Ok(RowAcquisition::Acquired)
    }

    async fn decline_partner_prompt(&self) -> Result<()> {
        let until = Instant::now() + PROMPT_WAIT;
        let mut declined = false;
        loop {
            let url = self.current_url().await.unwrap_or_default();
            if url.contains("makeBooking") {
                if !declined {
                    debug!(member = %self.member, "No partner prompt shown");
                }
                if let Ok(body) = self.body_text().await {
                    if let Some(secs) = text::seconds_remaining(&body) {
                        info!(member = %self.member, remaining_secs = secs, "Reservation timer running");
                    }
                }
                return Ok(());
            }
            if let Some(message) = self.take_dialog() {
                return Err(Error::Navigation(format!("booking refused: {}", message)));
            }
            if !declined && self.eval_bool(DECLINE_PROMPT_JS).await.unwrap_or(false) {
                declined = true;
                info!(member = %self.member, "Declined pre-set partners");
            }
            if Instant::now() >= until {
                return Err(Error::Navigation(format!(
                    "booking page not reached (at {})",
                    url
                )));
            }
            sleep(POLL).await;
        }
    }

    async fn submit_partner_search(&self, member_number: &str) -> Result<Option<Suggestion>> {
        if !self.eval_bool(FOCUS_PARTNER_INPUT_JS).await? {
            return Err(Error::NotFound("empty partner input".to_string()));
        }
        self.session.cdp.insert_text(member_number).await?;
        debug!(member = %self.member, partner = member_number, "Searching for partner");

        let label = self
            .wait_for_value(&first_suggestion_script(), SUGGESTION_WAIT)
            .await
            .and_then(|v| v.as_str().map(|s| s.to_string()));
        Ok(label.map(|label| Suggestion {
            member_number: member_number.to_string(),
            label,
        }))
    }

    async fn select_suggestion(&self, suggestion: &Suggestion) -> Result<String> {
        if !self.eval_bool(&select_suggestion_script(&suggestion.label)).await? {
            return Err(Error::NotFound(format!(
                "suggestion for {} disappeared",
                suggestion.member_number
            )));
        }
        sleep(Duration::from_millis(400)).await;

        let body = self.body_text().await?;
        if text::is_already_booked(&body) {
            return Err(Error::Portal(format!(
                "partner {} already has a booking",
                suggestion.member_number
            )));
        }
        Ok(self
            .eval(PARTNER_VALUE_JS)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn confirm_booking(&self) -> Result<Confirmation> {
        self.clear_dialogs();
        if !self.wait_until(CONFIRM_JS, CONFIRM_BUTTON_WAIT).await {
            return Err(Error::Navigation("Confirm Booking button not found".to_string()));
        }
        info!(member = %self.member, "Clicked Confirm Booking");
        sleep(Duration::from_millis(1500)).await;

        let dialog = self.take_dialog();
        let body = self.body_text().await.unwrap_or_default();
        let tee_sheet = self.eval_bool(TEE_SHEET_JS).await.unwrap_or(false);
        Ok(classify_confirmation(dialog.as_deref(), &body, tee_sheet))
    }

    async fn abandon_booking(&self) -> Result<()> {
        if self.eval_bool(CANCEL_JS).await.unwrap_or(false) {
            info!(member = %self.member, "Cancelled reservation page");
            if self.wait_until(TEE_SHEET_JS, Duration::from_secs(5)).await {
                return Ok(());
            }
        }
        self.back_to_tee_sheet().await
    }

    async fn capture_screenshot(&self) -> Result<Option<Vec<u8>>> {
        let data = self.session.cdp.screenshot().await?;
        let png = B64
            .decode(data.as_bytes())
            .map_err(|e| Error::Portal(format!("screenshot decode failed: {}", e)))?;
        Ok(Some(png))
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.goto(&self.config.logout_url()).await {
            warn!(member = %self.member, error = %e, "Logout incomplete");
        } else {
            info!(member = %self.member, "Logged out");
        }
        self.dialog_watch.abort();
        self.session.close().await;
        Ok(())
    }
}

/// Launches one browser per identity, each with its own profile directory.
pub struct ChromePortalFactory {
    config: PortalConfig,
    day: TargetDay,
    paths: Paths,
}

impl ChromePortalFactory {
    pub fn new(config: PortalConfig, day: TargetDay, paths: Paths) -> Self {
        Self { config, day, paths }
    }
}

#[async_trait]
impl PortalFactory for ChromePortalFactory {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn PortalDriver>> {
        let engine = BrowserEngine::from_name(&self.config.browser);
        let profile = self.paths.browser_profile_dir(&identity.member_number);
        let session = BrowserSession::launch(engine, &profile, self.config.headed).await?;
        let portal = MiclubPortal::new(
            &identity.member_number,
            self.config.clone(),
            self.day.clone(),
            session,
        )
        .await;
        Ok(Box::new(portal))
    }
}

/// How a confirmation click turned out. A dialog with no success phrase is
/// the portal refusing; anything else that is not an explicit refusal
/// counts as booked so a second agent does not double-book.
pub fn classify_confirmation(dialog: Option<&str>, body: &str, tee_sheet: bool) -> Confirmation {
    if let Some(message) = dialog.filter(|m| text::is_success(m)) {
        return Confirmation::Confirmed(format!("alert: {}", message));
    }
    if text::is_success(body) {
        return Confirmation::Confirmed("confirmation shown on page".to_string());
    }
    if tee_sheet {
        return Confirmation::Confirmed("redirected to tee sheet".to_string());
    }
    match dialog.map(str::trim).filter(|m| !m.is_empty()) {
        Some(message) => Confirmation::Rejected(message.to_string()),
        None => Confirmation::Confirmed("no refusal shown".to_string()),
    }
}

/// Check every `poll` until `check` passes or `limit` runs out. The first
/// check waits one poll so a click has a chance to navigate.
async fn poll_until<F, Fut>(limit: Duration, poll: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let until = Instant::now() + limit;
    loop {
        sleep(poll).await;
        if check().await {
            return true;
        }
        if Instant::now() >= until {
            return false;
        }
    }
}

/// A link target worth opening directly when the click did not navigate.
fn direct_href(href: &str) -> Option<String> {
    let parsed = url::Url::parse(href).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn login_script(identity: &Identity) -> String {
    format!(
        r#"
(() => {{
  const user = document.querySelector("input[name='user']");
  const pass = document.querySelector("input[name='password']");
  const submit = document.querySelector("input[value='Login']");
  if (!user || !pass || !submit) return false;
  user.value = {user};
  pass.value = {pass};
  submit.click();
  return true;
}})()
"#,
        user = js_str(&identity.member_number),
        pass = js_str(&identity.secret),
    )
}

/// JS `findEvent(root)`: the innermost event block under `root` naming the
/// target day and date, as `{ link, open, href }`, or `null`.
fn event_block_fn(day: &TargetDay) -> String {
    format!(
        r#"
  const day = {day}, date = {date};
  const findEvent = root => {{
    const names = d => Array.from(d.querySelectorAll('span')).map(s => s.textContent);
    const hits = Array.from(root.querySelectorAll("div[class*='full']")).filter(d => {{
      const spans = names(d);
      return spans.some(t => t.includes(day)) && spans.some(t => t.includes(date));
    }});
    const block = hits.find(d => !hits.some(o => o !== d && d.contains(o)));
    if (!block) return null;
    const link = block.querySelector('a');
    if (!link) return null;
    const open = (link.className || '').includes('eventStatusOpen');
    return {{ link, open, href: link.href || '' }};
  }};"#,
        day = js_str(&day.weekday_label),
        date = js_str(&day.date_label),
    )
}

/// Find the event block on the live page. With `click` set, its link is
/// clicked.
fn event_link_script(day: &TargetDay, click: bool) -> String {
    format!(
        r#"
(() => {{{find}
  const hit = findEvent(document);
  if (!hit) return null;
  if ({click}) {{
    hit.link.scrollIntoView({{block: 'center'}});
    hit.link.click();
  }}
  return {{ open: hit.open, href: hit.href }};
}})()
"#,
        find = event_block_fn(day),
        click = click,
    )
}

/// Read the entry's status without touching the live page: the event list
/// is fetched in the background and parsed off-screen. Falls back to the
/// live page when the fetch fails.
fn event_status_script(day: &TargetDay, list_url: &str) -> String {
    format!(
        r#"
(async () => {{{find}
  const plain = hit => hit ? {{ open: hit.open, href: hit.href }} : null;
  const live = findEvent(document);
  if (live && live.open) return plain(live);
  try {{
    const res = await fetch({url}, {{ credentials: 'include', cache: 'no-store' }});
    if (!res.ok) return plain(live);
    const doc = new DOMParser().parseFromString(await res.text(), 'text/html');
    const fresh = findEvent(doc);
    if (!fresh) return plain(live);
    const raw = fresh.link.getAttribute('href') || '';
    const href = raw && !raw.startsWith('javascript') ? new URL(raw, {url}).href : '';
    return {{ open: fresh.open, href }};
  }} catch (e) {{
    return plain(live);
  }}
}})()
"#,
        find = event_block_fn(day),
        url = js_str(list_url),
    )
}

/// Locate the row by label, falling back to its scan position, re-count its
/// empty seats and click Book Group.
fn book_group_script(row: &RowRef, min_seats: u8) -> String {
    format!(
        r#"
(() => {{
  const rows = Array.from(document.querySelectorAll("div[class*='row-time']"));
  const label = r => {{ const h3 = r.querySelector('h3'); return h3 ? h3.innerText.trim() : ''; }};
  const row = rows.find(r => label(r) === {label}) || rows[{index}];
  if (!row) return {{ status: 'missing' }};
  const seats = row.querySelectorAll("button[class*='btn-book-me']").length;
  if (seats < {min}) return {{ status: 'full', seats }};
  const btn = row.querySelector("button[class*='btn-book-group']");
  if (!btn) return {{ status: 'no_button' }};
  btn.scrollIntoView({{block: 'center'}});
  btn.click();
  return {{ status: 'clicked' }};
}})()
"#,
        label = js_str(&row.label),
        index = row.index,
        min = min_seats,
    )
}

fn first_suggestion_script() -> String {
    format!(
        r#"
(() => {{
  const items = Array.from(document.querySelectorAll({sel}))
    .filter(e => e.offsetParent !== null && e.innerText.trim());
  return items.length ? items[0].innerText.trim() : null;
}})()
"#,
        sel = js_str(SUGGESTIONS),
    )
}

fn select_suggestion_script(label: &str) -> String {
    format!(
        r#"
(() => {{
  const items = Array.from(document.querySelectorAll({sel}))
    .filter(e => e.offsetParent !== null && e.innerText.trim());
  const item = items.find(e => e.innerText.trim() === {label}) || items[0];
  if (!item) return false;
  item.click();
  return true;
}})()
"#,
        sel = js_str(SUGGESTIONS),
        label = js_str(label),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day() -> TargetDay {
        TargetDay {
            date: NaiveDate::from_ymd_opt(2026, 10, 24).unwrap(),
            weekday_label: "Sat".to_string(),
            date_label: "24 Oct".to_string(),
        }
    }

    #[test]
    fn test_confirmation_from_alert() {
        assert_eq!(
            classify_confirmation(Some("Your booking has been made"), "", false),
            Confirmation::Confirmed("alert: Your booking has been made".to_string())
        );
        assert_eq!(
            classify_confirmation(Some("Tee time no longer available"), "Make Booking", false),
            Confirmation::Rejected("Tee time no longer available".to_string())
        );
    }

    #[test]
    fn test_confirmation_from_page() {
        assert!(matches!(
            classify_confirmation(None, "Booking Confirmed. See you on Saturday", false),
            Confirmation::Confirmed(_)
        ));
        // Landing back on the tee sheet outranks an unrelated alert.
        assert_eq!(
            classify_confirmation(Some("Session will expire"), "", true),
            Confirmation::Confirmed("redirected to tee sheet".to_string())
        );
    }

    #[test]
    fn test_unclear_confirmation_counts_as_booked() {
        assert_eq!(
            classify_confirmation(None, "Make Booking", false),
            Confirmation::Confirmed("no refusal shown".to_string())
        );
        assert!(matches!(
            classify_confirmation(Some("  "), "", false),
            Confirmation::Confirmed(_)
        ));
    }

    #[test]
    fn test_direct_href_skips_script_links() {
        assert_eq!(
            direct_href("https://club.example/views/members/booking/draw.xhtml?id=7").as_deref(),
            Some("https://club.example/views/members/booking/draw.xhtml?id=7")
        );
        assert_eq!(direct_href("javascript:void(0)"), None);
        assert_eq!(direct_href(""), None);
    }

    #[test]
    fn test_scripts_quote_page_values() {
        let script = event_link_script(&day(), true);
        assert!(script.contains(r#"const day = "Sat", date = "24 Oct";"#));
        assert!(script.contains("if (true)"));

        let row = RowRef {
            index: 3,
            label: r#"07:"16""#.to_string(),
        };
        let script = book_group_script(&row, 4);
        assert!(script.contains(r#"label(r) === "07:\"16\"""#));
        assert!(script.contains("rows[3]"));
        assert!(script.contains("seats < 4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_admission_is_waited_for() {
        let started = Instant::now();
        let admitted = poll_until(ADMISSION_WAIT, POLL, || async move {
            started.elapsed() >= Duration::from_secs(3)
        })
        .await;
        assert!(admitted);
        assert!(started.elapsed() < ADMISSION_WAIT);

        let started = Instant::now();
        assert!(!poll_until(ADMISSION_WAIT, POLL, || async { false }).await);
        assert!(started.elapsed() >= ADMISSION_WAIT);
    }

    #[test]
    fn test_draw_status_script_leaves_page_alone() {
        let script = event_status_script(&day(), "https://club.example/members/events");
        assert!(script.contains(r#"fetch("https://club.example/members/events""#));
        assert!(script.contains("DOMParser"));
        assert!(script.contains("findEvent(document)"));
        assert!(!script.contains("reload"));
        assert!(!script.contains("location.href ="));
        assert!(!script.contains(".click()"));
    }

    #[test]
    fn test_login_script_escapes_secret() {
        let script = login_script(&Identity::new("2007", "pa\"ss\\"));
        assert!(script.contains(r#"user.value = "2007";"#));
        assert!(script.contains(r#"pass.value = "pa\"ss\\";"#));
    }

    #[test]
    fn test_book_group_click_shapes() {
        let full: BookGroupClick =
            serde_json::from_value(serde_json::json!({"status": "full", "seats": 2})).unwrap();
        assert!(matches!(full, BookGroupClick::Full { seats: 2 }));
        let none: BookGroupClick =
            serde_json::from_value(serde_json::json!({"status": "no_button"})).unwrap();
        assert!(matches!(none, BookGroupClick::NoButton));
    }
}

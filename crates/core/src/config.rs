use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;
use crate::types::{Identity, ReservationTarget, TargetKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_event_list_path")]
    pub event_list_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// chrome | edge
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default)]
    pub headed: bool,
}

fn default_base_url() -> String {
    "https://macquarielinks.miclub.com.au".to_string()
}

fn default_login_path() -> String {
    "/security/login.msp".to_string()
}

fn default_event_list_path() -> String {
    "/views/members/booking/eventList.xhtml".to_string()
}

fn default_logout_path() -> String {
    "/security/logout.msp".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            event_list_path: default_event_list_path(),
            logout_path: default_logout_path(),
            browser: default_browser(),
            headed: false,
        }
    }
}

impl PortalConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn login_url(&self) -> String {
        self.url(&self.login_path)
    }

    pub fn event_list_url(&self) -> String {
        self.url(&self.event_list_path)
    }

    pub fn logout_url(&self) -> String {
        self.url(&self.logout_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    pub member_number: String,
    #[serde(default)]
    pub secret: String,
    /// Environment variable holding the secret when `secret` is empty.
    #[serde(default)]
    pub secret_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub required_slots: u8,
    #[serde(default)]
    pub roster: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsConfig {
    #[serde(default = "default_fourball")]
    pub fourball: TargetConfig,
    #[serde(default = "default_twoball")]
    pub twoball: TargetConfig,
}

fn default_fourball() -> TargetConfig {
    TargetConfig {
        required_slots: 4,
        roster: Vec::new(),
    }
}

fn default_twoball() -> TargetConfig {
    TargetConfig {
        required_slots: 2,
        roster: Vec::new(),
    }
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            fourball: default_fourball(),
            twoball: default_twoball(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_login_time")]
    pub login_time: String,
    #[serde(default = "default_draw_open_time")]
    pub draw_open_time: String,
    #[serde(default = "default_run_deadline")]
    pub run_deadline: String,
    #[serde(default = "default_target_weekday")]
    pub target_weekday: String,
    /// Extra weeks past the next occurrence of `target_weekday`.
    #[serde(default = "default_weeks_ahead")]
    pub weeks_ahead: u32,
}

fn default_timezone() -> String {
    "Australia/Sydney".to_string()
}

fn default_login_time() -> String {
    "18:00".to_string()
}

fn default_draw_open_time() -> String {
    "18:30".to_string()
}

fn default_run_deadline() -> String {
    "20:00".to_string()
}

fn default_target_weekday() -> String {
    "Sat".to_string()
}

fn default_weeks_ahead() -> u32 {
    1
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            login_time: default_login_time(),
            draw_open_time: default_draw_open_time(),
            run_deadline: default_run_deadline(),
            target_weekday: default_target_weekday(),
            weeks_ahead: default_weeks_ahead(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("invalid timezone '{}': {}", self.timezone, e)))
    }

    pub fn weekday(&self) -> Result<Weekday> {
        self.target_weekday.parse::<Weekday>().map_err(|_| {
            Error::Config(format!("invalid target weekday '{}'", self.target_weekday))
        })
    }

    pub fn login_at(&self) -> Result<NaiveTime> {
        parse_clock("loginTime", &self.login_time)
    }

    pub fn draw_open_at(&self) -> Result<NaiveTime> {
        parse_clock("drawOpenTime", &self.draw_open_time)
    }

    pub fn deadline_at(&self) -> Result<NaiveTime> {
        parse_clock("runDeadline", &self.run_deadline)
    }
}

fn parse_clock(field: &str, raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| Error::Config(format!("invalid {} '{}': {}", field, raw, e)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    #[serde(default = "default_reservation_countdown_secs")]
    pub reservation_countdown_secs: u64,
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,
    #[serde(default = "default_scan_attempts")]
    pub scan_attempts: u32,
    #[serde(default = "default_scan_backoff_ms")]
    pub scan_backoff_ms: u64,
    #[serde(default = "default_far_poll_secs")]
    pub far_poll_secs: u64,
    #[serde(default = "default_near_poll_ms")]
    pub near_poll_ms: u64,
    #[serde(default = "default_near_window_secs")]
    pub near_window_secs: u64,
    #[serde(default = "default_draw_poll_ms")]
    pub draw_poll_ms: u64,
    #[serde(default = "default_queue_poll_ms")]
    pub queue_poll_ms: u64,
    #[serde(default = "default_autocomplete_timeout_secs")]
    pub autocomplete_timeout_secs: u64,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_max_entry_failures")]
    pub max_entry_failures: u32,
}

fn default_reservation_countdown_secs() -> u64 {
    154
}

fn default_safety_margin_secs() -> u64 {
    10
}

fn default_scan_attempts() -> u32 {
    40
}

fn default_scan_backoff_ms() -> u64 {
    3000
}

fn default_far_poll_secs() -> u64 {
    15
}

fn default_near_poll_ms() -> u64 {
    2000
}

fn default_near_window_secs() -> u64 {
    120
}

fn default_draw_poll_ms() -> u64 {
    1000
}

fn default_queue_poll_ms() -> u64 {
    500
}

fn default_autocomplete_timeout_secs() -> u64 {
    10
}

fn default_step_timeout_secs() -> u64 {
    15
}

fn default_stagger_ms() -> u64 {
    500
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_max_entry_failures() -> u32 {
    5
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reservation_countdown_secs: default_reservation_countdown_secs(),
            safety_margin_secs: default_safety_margin_secs(),
            scan_attempts: default_scan_attempts(),
            scan_backoff_ms: default_scan_backoff_ms(),
            far_poll_secs: default_far_poll_secs(),
            near_poll_ms: default_near_poll_ms(),
            near_window_secs: default_near_window_secs(),
            draw_poll_ms: default_draw_poll_ms(),
            queue_poll_ms: default_queue_poll_ms(),
            autocomplete_timeout_secs: default_autocomplete_timeout_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            stagger_ms: default_stagger_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            max_entry_failures: default_max_entry_failures(),
        }
    }
}

impl TimingConfig {
    pub fn reservation_countdown(&self) -> Duration {
        Duration::from_secs(self.reservation_countdown_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub fn scan_backoff(&self) -> Duration {
        Duration::from_millis(self.scan_backoff_ms)
    }

    pub fn far_poll(&self) -> Duration {
        Duration::from_secs(self.far_poll_secs)
    }

    pub fn near_poll(&self) -> Duration {
        Duration::from_millis(self.near_poll_ms)
    }

    pub fn near_window(&self) -> Duration {
        Duration::from_secs(self.near_window_secs)
    }

    pub fn draw_poll(&self) -> Duration {
        Duration::from_millis(self.draw_poll_ms)
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn autocomplete_timeout(&self) -> Duration {
        Duration::from_secs(self.autocomplete_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn target(&self, kind: TargetKind) -> ReservationTarget {
        let cfg = match kind {
            TargetKind::Fourball => &self.targets.fourball,
            TargetKind::Twoball => &self.targets.twoball,
        };
        ReservationTarget {
            kind,
            required_slots: cfg.required_slots,
            roster: cfg.roster.clone(),
        }
    }

    /// Resolve identities, reading secrets from the environment where needed.
    pub fn identities(&self) -> Result<Vec<Identity>> {
        self.identities
            .iter()
            .map(|entry| {
                let secret = if !entry.secret.is_empty() {
                    entry.secret.clone()
                } else if let Some(var) = entry.secret_env.as_deref() {
                    std::env::var(var).map_err(|_| {
                        Error::Config(format!(
                            "secret for member {} expected in ${} but it is not set",
                            entry.member_number, var
                        ))
                    })?
                } else {
                    return Err(Error::Config(format!(
                        "member {} has neither secret nor secretEnv",
                        entry.member_number
                    )));
                };
                Ok(Identity::new(entry.member_number.trim(), secret))
            })
            .collect()
    }

    /// Structural checks that do not touch the environment.
    pub fn validate(&self) -> Result<()> {
        if self.identities.is_empty() {
            return Err(Error::Validation("no identities configured".to_string()));
        }
        let mut seen = HashSet::new();
        for entry in &self.identities {
            let member = entry.member_number.trim();
            if member.is_empty() {
                return Err(Error::Validation("identity with empty memberNumber".to_string()));
            }
            if !seen.insert(member.to_string()) {
                return Err(Error::Validation(format!(
                    "duplicate identity for member {}",
                    member
                )));
            }
        }

        for kind in TargetKind::ALL {
            let target = self.target(kind);
            if !(1..=4).contains(&target.required_slots) {
                return Err(Error::Validation(format!(
                    "{} requiredSlots must be between 1 and 4, got {}",
                    kind, target.required_slots
                )));
            }
            let needed = usize::from(target.required_slots.saturating_sub(1));
            if target.roster.len() < needed {
                return Err(Error::Validation(format!(
                    "{} roster lists {} members but {} partners are needed",
                    kind,
                    target.roster.len(),
                    needed
                )));
            }
        }

        self.schedule.tz()?;
        self.schedule.weekday()?;
        self.schedule.login_at()?;
        let draw_open = self.schedule.draw_open_at()?;
        let deadline = self.schedule.deadline_at()?;
        if draw_open >= deadline {
            return Err(Error::Validation(format!(
                "drawOpenTime {} must be before runDeadline {}",
                self.schedule.draw_open_time, self.schedule.run_deadline
            )));
        }

        if self.timing.safety_margin_secs >= self.timing.reservation_countdown_secs {
            return Err(Error::Validation(
                "safetyMarginSecs must be smaller than reservationCountdownSecs".to_string(),
            ));
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use teeclaim_core::{AgentEvent, Paths, Result, RunRecorder};
use tracing::{debug, error};

const REPORT_FILE: &str = "report.json";

/// One line of an agent's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub timestamp_ms: i64,
    pub member_number: String,
    pub event: AgentEvent,
}

/// Files produced by one run under `<home>/runs/<run_id>/`.
pub struct RunArtifacts {
    run_id: String,
    dir: PathBuf,
    // Agents append from many tasks; lines must not interleave.
    write_lock: Mutex<()>,
}

impl RunArtifacts {
    pub fn create(paths: &Paths, started_at: DateTime<Utc>) -> Result<Self> {
        let run_id = started_at.format("run_%Y-%m-%d_%H-%M-%S").to_string();
        let dir = paths.run_dir(&run_id);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            run_id,
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn event_log(&self, member_number: &str) -> PathBuf {
        self.dir
            .join(format!("agent_{}.jsonl", file_safe(member_number)))
    }

    fn append_event(&self, member_number: &str, event: &AgentEvent) -> Result<()> {
        let line = serde_json::to_string(&StoredEvent {
            timestamp_ms: Utc::now().timestamp_millis(),
            member_number: member_number.to_string(),
            event: event.clone(),
        })?;

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.event_log(member_number))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn write_screenshot(&self, member_number: &str, label: &str, png: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(format!(
            "{}_{}.png",
            file_safe(member_number),
            file_safe(label)
        ));
        std::fs::write(&path, png)?;
        Ok(path)
    }

    /// Write the final run report as pretty JSON.
    pub fn write_report<T: Serialize>(&self, report: &T) -> Result<PathBuf> {
        let path = self.dir.join(REPORT_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
        Ok(path)
    }

    /// Events logged for one agent, oldest first. Unparsable lines are
    /// skipped.
    pub fn read_events(&self, member_number: &str) -> Result<Vec<StoredEvent>> {
        let log = self.event_log(member_number);
        if !log.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&log)?;
        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<StoredEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => error!(error = %e, line = %line, "Failed to parse agent event"),
            }
        }
        Ok(events)
    }
}

impl RunRecorder for RunArtifacts {
    fn record(&self, member_number: &str, event: &AgentEvent) {
        if let Err(e) = self.append_event(member_number, event) {
            error!(member = member_number, error = %e, "Failed to record agent event");
        }
    }

    fn screenshot(&self, member_number: &str, label: &str, png: &[u8]) {
        match self.write_screenshot(member_number, label, png) {
            Ok(path) => debug!(member = member_number, path = %path.display(), "Screenshot saved"),
            Err(e) => error!(member = member_number, error = %e, "Failed to save screenshot"),
        }
    }
}

/// Id of the most recent run with a report, if any.
pub fn latest_run(paths: &Paths) -> Result<Option<String>> {
    let runs = paths.runs_dir();
    if !runs.exists() {
        return Ok(None);
    }
    let mut ids: Vec<String> = std::fs::read_dir(&runs)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join(REPORT_FILE).exists())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("run_"))
        .collect();
    // The timestamped ids sort chronologically.
    ids.sort();
    Ok(ids.pop())
}

fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

use anyhow::bail;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use teeclaim_agent::{Orchestrator, RunPlan};
use teeclaim_core::Paths;
use teeclaim_portal::ChromePortalFactory;
use teeclaim_scheduler::{target_day, GateTimes};
use teeclaim_storage::RunArtifacts;
use tokio::time::Instant;
use tracing::{info, warn};

use super::load_config;

/// Returns the process exit code derived from the run report.
pub async fn run(config_path: Option<PathBuf>, now: bool) -> anyhow::Result<i32> {
    let paths = Paths::new();
    let config = load_config(&paths, config_path.as_deref())?;
    config.validate()?;
    let identities = config.identities()?;

    let started = Utc::now();
    let anchor = Instant::now();
    let gates = if now {
        GateTimes::starting_now(started, &config.schedule)?
    } else {
        GateTimes::for_day(started, &config.schedule)?
    };
    if gates.deadline_passed(started) {
        bail!(
            "run deadline {} has already passed; use --now to start immediately",
            gates.deadline.format("%H:%M %Z")
        );
    }

    let tz = config.schedule.tz()?;
    let day = target_day(
        started.with_timezone(&tz).date_naive(),
        config.schedule.weekday()?,
        config.schedule.weeks_ahead,
    );
    info!(
        date = %day.date,
        login = %gates.login.format("%H:%M:%S"),
        draw_open = %gates.draw_open.format("%H:%M:%S"),
        deadline = %gates.deadline.format("%H:%M:%S"),
        agents = identities.len(),
        "Run planned"
    );

    let instants = gates.instants(started, anchor);
    let plan = RunPlan::new(&config, instants.login, instants.draw_open, instants.deadline);
    let artifacts = Arc::new(RunArtifacts::create(&paths, started)?);
    info!(run_id = artifacts.run_id(), dir = %artifacts.dir().display(), "Recording run artifacts");

    let orchestrator = Orchestrator::new(plan, artifacts.clone());
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping agents");
            cancel.cancel();
        }
    });

    let factory = Arc::new(ChromePortalFactory::new(config.portal.clone(), day, paths.clone()));
    let report = orchestrator
        .run(artifacts.run_id(), identities, factory)
        .await;

    let report_path = artifacts.write_report(&report)?;
    info!(path = %report_path.display(), "Report written");
    Ok(report.exit_code())
}

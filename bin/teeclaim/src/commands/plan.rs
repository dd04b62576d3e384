use chrono::Utc;
use std::path::PathBuf;
use teeclaim_core::Paths;
use teeclaim_scheduler::{target_day, GateTimes};

use super::load_config;

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = load_config(&paths, config_path.as_deref())?;
    let schedule = &config.schedule;

    let now = Utc::now();
    let tz = schedule.tz()?;
    let gates = GateTimes::for_day(now, schedule)?;
    let day = target_day(
        now.with_timezone(&tz).date_naive(),
        schedule.weekday()?,
        schedule.weeks_ahead,
    );

    println!("teeclaim plan ({})", tz.name());
    println!("==============");
    println!();
    println!(
        "Target day: {} {} ({})",
        day.weekday_label, day.date_label, day.date
    );
    println!();
    for (name, at) in [
        ("Login", gates.login),
        ("Draw open", gates.draw_open),
        ("Deadline", gates.deadline),
    ] {
        let state = if at.with_timezone(&Utc) <= now { "passed" } else { "upcoming" };
        println!(
            "  {:<10} {}  ({} UTC)  {}",
            name,
            at.format("%Y-%m-%d %H:%M %Z"),
            at.with_timezone(&Utc).format("%H:%M"),
            state
        );
    }
    Ok(())
}

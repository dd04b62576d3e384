use std::io::{self, Write};
use teeclaim_core::Paths;

const EXAMPLE_CONFIG: &str = r#"{
  "portal": {
    "baseUrl": "https://macquarielinks.miclub.com.au",
    "browser": "chrome",
    "headed": false
  },
  "identities": [
    { "memberNumber": "2007", "secretEnv": "TEECLAIM_SECRET_2007" },
    { "memberNumber": "2008", "secretEnv": "TEECLAIM_SECRET_2008" },
    { "memberNumber": "2009", "secretEnv": "TEECLAIM_SECRET_2009" },
    { "memberNumber": "2010", "secretEnv": "TEECLAIM_SECRET_2010" },
    { "memberNumber": "1101", "secretEnv": "TEECLAIM_SECRET_1101" },
    { "memberNumber": "1107", "secretEnv": "TEECLAIM_SECRET_1107" }
  ],
  "targets": {
    "fourball": { "requiredSlots": 4, "roster": ["2007", "2008", "2009", "2010"] },
    "twoball": { "requiredSlots": 2, "roster": ["1101", "1107"] }
  },
  "schedule": {
    "timezone": "Australia/Sydney",
    "loginTime": "18:00",
    "drawOpenTime": "18:30",
    "runDeadline": "20:00",
    "targetWeekday": "Sat",
    "weeksAhead": 1
  },
  "timing": {
    "reservationCountdownSecs": 154,
    "safetyMarginSecs": 10
  }
}
"#;

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    if paths.config_file().exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = paths.config_file().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(paths.config_file(), EXAMPLE_CONFIG)?;
    std::fs::create_dir_all(paths.runs_dir())?;
    println!("✓ Created config: {}", paths.config_file().display());
    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} with your member numbers and rosters",
        paths.config_file().display()
    );
    println!("  2. Export each TEECLAIM_SECRET_<member> password");
    println!("  3. Run `teeclaim status` to verify, then `teeclaim plan`");

    Ok(())
}

use std::path::PathBuf;
use teeclaim_core::{Paths, TargetKind};
use teeclaim_portal::{find_browser_binary, BrowserEngine};
use teeclaim_storage::latest_run;

use super::load_config;

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("teeclaim status");
    println!("===============");
    println!();

    let config_file = config_path.clone().unwrap_or_else(|| paths.config_file());
    let config_exists = config_file.exists();
    println!(
        "Config:    {} {}",
        config_file.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );
    if !config_exists {
        println!();
        println!("Run `teeclaim onboard` to initialize.");
        return Ok(());
    }

    let config = load_config(&paths, config_path.as_deref())?;
    println!("Portal:    {}", config.portal.base_url);

    let engine = BrowserEngine::from_name(&config.portal.browser);
    match find_browser_binary(engine) {
        Some(binary) => println!("Browser:   {} ✓", binary),
        None => println!("Browser:   {} ✗ (not found)", engine.name()),
    }
    println!();

    println!("Identities:");
    for entry in &config.identities {
        let secret = if !entry.secret.is_empty() {
            "✓ inline secret".to_string()
        } else if let Some(var) = entry.secret_env.as_deref() {
            if std::env::var_os(var).is_some() {
                format!("✓ ${}", var)
            } else {
                format!("✗ ${} not set", var)
            }
        } else {
            "✗ no secret".to_string()
        };
        println!("  {:<10} {}", entry.member_number, secret);
    }
    println!();

    println!("Targets:");
    for kind in TargetKind::ALL {
        let target = config.target(kind);
        println!(
            "  {:<10} {} seats, roster {}",
            kind.to_string(),
            target.required_slots,
            target.roster.join(", ")
        );
    }
    println!();

    match config.validate() {
        Ok(()) => println!("Validation: ✓"),
        Err(e) => println!("Validation: ✗ {}", e),
    }
    if let Some(run_id) = latest_run(&paths)? {
        println!("Last run:   {}", paths.run_dir(&run_id).display());
    }
    Ok(())
}

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "teeclaim")]
#[command(about = "Races several member logins for the weekly tee-time draw", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured identity against tonight's draw
    Run {
        /// Config file (defaults to ~/.teeclaim/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip the login and draw-open gates and start immediately
        #[arg(long)]
        now: bool,
    },

    /// Check configuration, identities and browser availability
    Status {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the target day and today's gate times
    Plan {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write an example configuration
    Onboard {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let code = match cli.command {
        Commands::Run { config, now } => commands::run::run(config, now).await?,
        Commands::Status { config } => {
            commands::status::run(config).await?;
            0
        }
        Commands::Plan { config } => {
            commands::plan::run(config).await?;
            0
        }
        Commands::Onboard { force } => {
            commands::onboard::run(force).await?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

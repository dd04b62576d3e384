pub mod onboard;
pub mod plan;
pub mod run;
pub mod status;

use anyhow::Context;
use std::path::Path;
use teeclaim_core::{Config, Paths};

/// Config from `path` when given, else the home config (defaults if absent).
pub fn load_config(paths: &Paths, path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Config::load_or_default(paths)
            .with_context(|| format!("loading config {}", paths.config_file().display())),
    }
}

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    /// `$TEECLAIM_HOME`, falling back to `~/.teeclaim`.
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os("TEECLAIM_HOME").filter(|v| !v.is_empty()) {
            return Self { base: PathBuf::from(home) };
        }
        let base = dirs::home_dir()
            .map(|h| h.join(".teeclaim"))
            .unwrap_or_else(|| PathBuf::from(".teeclaim"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.base.join("runs")
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_id)
    }

    /// Browser profile directory for one identity.
    pub fn browser_profile_dir(&self, member_number: &str) -> PathBuf {
        let safe = member_number.replace([':', '/', '\\'], "_");
        self.base.join("browser").join(safe)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = Paths::with_base(PathBuf::from("/tmp/tc"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/tc/config.json"));
        assert_eq!(
            paths.run_dir("run_1"),
            PathBuf::from("/tmp/tc/runs/run_1")
        );
        assert_eq!(
            paths.browser_profile_dir("a/b"),
            PathBuf::from("/tmp/tc/browser/a_b")
        );
    }
}

//! Browser process launch and the CDP connection to its page target.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teeclaim_core::{Error, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::cdp::CdpClient;

const CDP_READY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    Chrome,
    Edge,
}

impl BrowserEngine {
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }
}

/// One browser process with its own profile, driven over CDP.
pub struct BrowserSession {
    pub engine: BrowserEngine,
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
    pub cdp: Arc<CdpClient>,
    process: Mutex<Child>,
}

impl BrowserSession {
    pub async fn launch(engine: BrowserEngine, user_data_dir: &Path, headed: bool) -> Result<Self> {
        let binary = find_browser_binary(engine)
            .ok_or_else(|| Error::NotFound(format!("{} browser binary", engine.name())))?;

        std::fs::create_dir_all(user_data_dir)?;
        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, user_data_dir, headed);

        info!(
            port = debug_port,
            headed,
            browser = engine.name(),
            profile = %user_data_dir.display(),
            "Launching browser"
        );

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Portal(format!("failed to launch {}: {}", engine.name(), e)))?;

        wait_for_cdp_ready(debug_port, CDP_READY_TIMEOUT).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url).await?;
        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;

        debug!(ws_url = %page_ws_url, "CDP connection established");

        Ok(Self {
            engine,
            debug_port,
            user_data_dir: user_data_dir.to_path_buf(),
            cdp: Arc::new(cdp),
            process: Mutex::new(child),
        })
    }

    /// Ask the browser to exit, then kill the process regardless.
    pub async fn close(&self) {
        if let Err(e) = self.cdp.close_browser().await {
            debug!("Browser.close failed (may already be closed): {}", e);
        }
        self.kill();
    }

    fn kill(&self) {
        if let Ok(mut child) = self.process.lock() {
            let _ = child.start_kill();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.kill();
    }
}

fn build_browser_args(debug_port: u16, user_data_dir: &Path, headed: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--password-store=basic".to_string(),
    ];
    if !headed {
        args.push("--headless=new".to_string());
        args.push("--no-sandbox".to_string());
    }
    args.push("--window-size=1280,900".to_string());
    args.push("about:blank".to_string());
    args
}

pub fn find_browser_binary(engine: BrowserEngine) -> Option<String> {
    let candidates: &[&str] = match engine {
        BrowserEngine::Chrome => {
            if cfg!(target_os = "macos") {
                &[
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                ]
            } else if cfg!(target_os = "linux") {
                &[
                    "google-chrome",
                    "google-chrome-stable",
                    "chromium",
                    "chromium-browser",
                    "/usr/bin/google-chrome",
                    "/usr/bin/chromium",
                ]
            } else {
                &[
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ]
            }
        }
        BrowserEngine::Edge => {
            if cfg!(target_os = "macos") {
                &["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"]
            } else if cfg!(target_os = "linux") {
                &["microsoft-edge", "microsoft-edge-stable", "/usr/bin/microsoft-edge"]
            } else {
                &[
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                ]
            }
        }
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Poll `/json/version` until the debugger answers.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<()> {
    let start = tokio::time::Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "browser debugger not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if body.get("webSocketDebuggerUrl").is_some() {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// WebSocket URL of the first page target. The page may take a moment to
/// appear after the browser is up.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        if let Some(ws_url) = page_ws_url(&targets) {
            return Ok(ws_url);
        }
    }

    Err(Error::Portal("no page target found".to_string()))
}

fn page_ws_url(targets: &[Value]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .find_map(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

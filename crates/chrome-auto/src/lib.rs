//! # chrome-auto
//!
//! Find a locally installed Chrome / Chromium and start it headless with the
//! DevTools protocol exposed, so callers only have to connect to the returned
//! WebSocket URL.
//!
//! ## How it works
//!
//! 1. [`find_chrome`] honours `CHROME_PATH`, then well-known install
//!    locations for the current platform, then every directory on `PATH`.
//! 2. [`launch`] spawns the browser with `--remote-debugging-port=0` and a
//!    throwaway `--user-data-dir`, then scrapes stderr for the
//!    `DevTools listening on ws://…` banner.
//! 3. The returned [`ChromeProcess`] owns the child and the profile
//!    directory. Dropping it kills the browser and deletes the profile.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_auto::{launch, LaunchOptions};
//!
//! # async fn demo() -> Result<(), chrome_auto::ChromeAutoError> {
//! let chrome = launch(&LaunchOptions::default()).await?;
//! println!("DevTools at {}", chrome.ws_url());
//! chrome.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH` — path to the browser executable; skips discovery.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

// ── Public constants ─────────────────────────────────────────────────────────

/// How long [`launch`] waits for the DevTools banner by default.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Prefix Chrome prints on stderr once the debugging endpoint is ready.
const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// Executable names searched on `PATH`, most specific first.
const PATH_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Lines of stderr kept for diagnostics when the browser dies during startup.
const STDERR_TAIL_LINES: usize = 12;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-auto operations.
#[derive(Error, Debug)]
pub enum ChromeAutoError {
    /// `CHROME_PATH` is set but points nowhere.
    #[error("CHROME_PATH is set to '{path}' but no file exists there")]
    BadOverride { path: PathBuf },

    /// No executable found in any searched location.
    #[error(
        "No Chrome or Chromium executable found ({} locations searched).\n\
Install Chrome, or set CHROME_PATH=/path/to/chrome.",
        searched.len()
    )]
    NotFound { searched: Vec<PathBuf> },

    /// Could not create the throwaway profile directory.
    #[error("Could not create a browser profile directory: {0}")]
    Profile(#[source] std::io::Error),

    /// The OS refused to start the executable.
    #[error("Failed to start '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The banner never appeared.
    #[error("Chrome did not report a DevTools endpoint within {secs}s")]
    StartupTimeout { secs: u64 },

    /// The process closed stderr (usually: exited) before the banner.
    #[error("Chrome exited before reporting a DevTools endpoint.\nLast output:\n{stderr_tail}")]
    ExitedEarly { stderr_tail: String },
}

// ── Discovery ────────────────────────────────────────────────────────────────

/// Well-known install locations for the current OS.
fn platform_candidates() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
            PathBuf::from(
                "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            ),
        ],
        "linux" => vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/snap/bin/chromium"),
        ],
        "windows" => {
            let mut out = Vec::new();
            for var in ["PROGRAMFILES", "PROGRAMFILES(X86)"] {
                if let Some(base) = std::env::var_os(var) {
                    out.push(PathBuf::from(base).join(r"Google\Chrome\Application\chrome.exe"));
                }
            }
            if let Some(local) = dirs::data_local_dir() {
                out.push(local.join(r"Google\Chrome\Application\chrome.exe"));
                out.push(local.join(r"Chromium\Application\chrome.exe"));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn path_candidates() -> Vec<PathBuf> {
    let Some(path_var) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    let suffix = if cfg!(windows) { ".exe" } else { "" };
    std::env::split_paths(&path_var)
        .flat_map(|dir| {
            PATH_NAMES
                .iter()
                .map(move |name| dir.join(format!("{name}{suffix}")))
        })
        .collect()
}

/// Locate a Chrome / Chromium executable.
///
/// Resolution order: `CHROME_PATH`, platform install locations, `PATH`.
pub fn find_chrome() -> Result<PathBuf, ChromeAutoError> {
    if let Some(p) = std::env::var_os("CHROME_PATH") {
        let path = PathBuf::from(p);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(ChromeAutoError::BadOverride { path })
        };
    }

    let searched: Vec<PathBuf> = platform_candidates()
        .into_iter()
        .chain(path_candidates())
        .collect();

    match searched.iter().find(|p| p.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(ChromeAutoError::NotFound { searched }),
    }
}

// ── Launch ───────────────────────────────────────────────────────────────────

/// Options for [`launch`].
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit executable. `None` runs [`find_chrome`].
    pub executable: Option<PathBuf>,
    /// Run without a window. Default: `true`.
    pub headless: bool,
    /// How long to wait for the DevTools banner.
    pub startup_timeout: Duration,
    /// Extra command-line switches, e.g. `--no-sandbox` inside containers.
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            extra_args: Vec::new(),
        }
    }
}

/// A running browser. Killed (and its profile deleted) on drop.
#[derive(Debug)]
pub struct ChromeProcess {
    child: Child,
    ws_url: String,
    executable: PathBuf,
    // Dropped after `child`; the profile must outlive the process.
    _profile: TempDir,
}

impl ChromeProcess {
    /// Browser-level DevTools WebSocket URL.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// The executable that was started.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Kill the browser and wait for it to exit.
    pub async fn shutdown(mut self) {
        // Already-exited is the only failure mode worth ignoring here.
        let _ = self.child.kill().await;
    }
}

fn launch_args(options: &LaunchOptions, profile: &Path) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", profile.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-extensions".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--mute-audio".to_string(),
        "--hide-scrollbars".to_string(),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(options.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Extract the WebSocket URL from a `DevTools listening on …` stderr line.
pub fn parse_devtools_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(DEVTOOLS_BANNER)?;
    let url = rest.trim();
    (url.starts_with("ws://") || url.starts_with("wss://")).then(|| url.to_string())
}

/// Start a browser and wait until its DevTools endpoint is reachable.
pub async fn launch(options: &LaunchOptions) -> Result<ChromeProcess, ChromeAutoError> {
    let executable = match &options.executable {
        Some(p) => p.clone(),
        None => find_chrome()?,
    };
    let profile = TempDir::new().map_err(ChromeAutoError::Profile)?;

    let mut child = Command::new(&executable)
        .args(launch_args(options, profile.path()))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ChromeAutoError::Spawn {
            path: executable.clone(),
            source,
        })?;

    let Some(stderr) = child.stderr.take() else {
        return Err(ChromeAutoError::ExitedEarly {
            stderr_tail: String::from("<stderr not captured>"),
        });
    };
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: Vec<String> = Vec::new();

    let scrape = async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(url) = parse_devtools_line(&line) {
                return Some(url);
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line);
        }
        None
    };

    let ws_url = match tokio::time::timeout(options.startup_timeout, scrape).await {
        Ok(Some(url)) => url,
        Ok(None) => {
            return Err(ChromeAutoError::ExitedEarly {
                stderr_tail: tail.join("\n"),
            })
        }
        Err(_) => {
            return Err(ChromeAutoError::StartupTimeout {
                secs: options.startup_timeout.as_secs(),
            })
        }
    };

    // Keep draining stderr so the browser never blocks on a full pipe.
    tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(ChromeProcess {
        child,
        ws_url,
        executable,
        _profile: profile,
    })
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wait::DEFAULT_POLL_INTERVAL_MS;

/// Default bound for explicit waits, page loads and redirections
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Options for launching a new browser instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    /// Whether to run browser in headless mode (default: true)
    pub headless: bool,

    /// Custom Chrome/Chromium binary path
    pub chrome_path: Option<PathBuf>,

    /// Browser window width (default: 1280)
    pub window_width: u32,

    /// Browser window height (default: 800)
    pub window_height: u32,

    /// User data directory for browser profile
    pub user_data_dir: Option<PathBuf>,

    /// Enable sandbox mode (default: true)
    pub sandbox: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1280,
            window_height: 800,
            user_data_dir: None,
            sandbox: true,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Builder method: set Chrome binary path
    pub fn chrome_path(mut self, path: PathBuf) -> Self {
        self.chrome_path = Some(path);
        self
    }

    /// Builder method: set window dimensions
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Builder method: set user data directory
    pub fn user_data_dir(mut self, dir: PathBuf) -> Self {
        self.user_data_dir = Some(dir);
        self
    }

    /// Builder method: enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Options for connecting to an existing browser instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// WebSocket URL for Chrome DevTools Protocol
    pub ws_url: String,

    /// Connection timeout in milliseconds
    pub timeout: u64,
}

impl ConnectionOptions {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self { ws_url: ws_url.into(), timeout: 30_000 }
    }

    /// Builder method: set connection timeout
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Session configuration.
///
/// Every field has a default, so a partial JSON document deserializes into a full config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound for explicit waits, page loads and redirections
    pub default_timeout_ms: u64,

    /// Sleep between two checks of a wait predicate
    pub poll_interval_ms: u64,

    /// Base URL that relative page URLs are joined to
    pub app_host: Option<String>,

    /// DevTools WebSocket URL of an already running browser. Launches a new one when unset.
    pub remote_driver_url: Option<String>,

    /// Driver-side bound for a page load
    pub page_load_timeout_ms: u64,

    /// Driver-side bound for script evaluation
    pub script_timeout_ms: u64,

    /// Bound for establishing the driver connection
    pub connect_timeout_ms: u64,

    /// Bound for a single driver command to answer
    pub read_timeout_ms: u64,

    pub launch: LaunchOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            app_host: None,
            remote_driver_url: None,
            page_load_timeout_ms: 30_000,
            script_timeout_ms: 30_000,
            connect_timeout_ms: 30_000,
            read_timeout_ms: 60_000,
            launch: LaunchOptions::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the default wait timeout
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = ms;
        self
    }

    /// Builder method: set the poll interval
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Builder method: set the application base URL
    pub fn app_host(mut self, host: impl Into<String>) -> Self {
        self.app_host = Some(host.into());
        self
    }

    /// Builder method: connect to a running browser instead of launching one
    pub fn remote_driver_url(mut self, url: impl Into<String>) -> Self {
        self.remote_driver_url = Some(url.into());
        self
    }

    pub fn page_load_timeout_ms(mut self, ms: u64) -> Self {
        self.page_load_timeout_ms = ms;
        self
    }

    pub fn script_timeout_ms(mut self, ms: u64) -> Self {
        self.script_timeout_ms = ms;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    /// Builder method: set browser launch options
    pub fn launch(mut self, launch: LaunchOptions) -> Self {
        self.launch = launch;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Connection options derived from `remote_driver_url`, if set
    pub fn connection(&self) -> Option<ConnectionOptions> {
        self.remote_driver_url
            .as_ref()
            .map(|url| ConnectionOptions::new(url.clone()).timeout(self.connect_timeout_ms))
    }
}

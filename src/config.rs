//! Client configuration.
//!
//! Layered: built-in defaults, then an optional TOML file, then `SANTA_*`
//! environment variables, then whatever the CLI overrides last.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SantaError};
use crate::reconcile::DEFAULT_INTERVAL;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

pub const ENV_API_URL: &str = "SANTA_API_URL";
pub const ENV_WS_URL: &str = "SANTA_WS_URL";
pub const ENV_WEB_URL: &str = "SANTA_WEB_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "SANTA_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the room API, e.g. `http://127.0.0.1:8000/api`.
    pub api_base: String,
    /// Base URL for the live channel. Derived from `api_base` when unset.
    pub ws_base: Option<String>,
    /// Public site URL used for share links and `/health`. Derived from
    /// `api_base` when unset.
    pub web_base: Option<String>,
    /// Time between reconciliation pulls.
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
    web_url: Option<String>,
    poll_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Defaults: 3 s pull interval, 3 s connect timeout, 10 s request timeout.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            ws_base: None,
            web_base: None,
            poll_interval: DEFAULT_INTERVAL,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_ws_base(mut self, url: impl Into<String>) -> Self {
        self.ws_base = Some(url.into());
        self
    }

    pub fn with_web_base(mut self, url: impl Into<String>) -> Self {
        self.web_base = Some(url.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Site root: explicit `web_base`, else `api_base` without its `/api` suffix.
    pub fn web_base(&self) -> String {
        match &self.web_base {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self
                .api_base
                .strip_suffix("/api")
                .unwrap_or(&self.api_base)
                .to_string(),
        }
    }

    /// Live channel root: explicit `ws_base`, else the site root with the
    /// scheme switched to `ws`/`wss`.
    pub fn ws_base(&self) -> String {
        if let Some(url) = &self.ws_base {
            return url.trim_end_matches('/').to_string();
        }
        let web = self.web_base();
        if let Some(rest) = web.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = web.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            web
        }
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(path) = path {
            cfg.apply_file(path)?;
        }
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Overlay the keys present in a TOML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SantaError::Config(format!("{}: {e}", path.display())))?;
        let file: FileConfig = toml::from_str(&text)
            .map_err(|e| SantaError::Config(format!("{}: {e}", path.display())))?;

        if let Some(url) = file.api_url {
            self.api_base = url.trim_end_matches('/').to_string();
        }
        if file.ws_url.is_some() {
            self.ws_base = file.ws_url;
        }
        if file.web_url.is_some() {
            self.web_base = file.web_url;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = nonzero_ms("poll_interval_ms", ms)?;
        }
        if let Some(ms) = file.connect_timeout_ms {
            self.connect_timeout = nonzero_ms("connect_timeout_ms", ms)?;
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = nonzero_ms("request_timeout_ms", ms)?;
        }
        Ok(())
    }

    /// Overlay `SANTA_*` variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.ws_base = Some(url);
        }
        if let Some(url) = lookup(ENV_WEB_URL) {
            self.web_base = Some(url);
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| SantaError::Config(format!("{ENV_POLL_INTERVAL_MS}={raw}: {e}")))?;
            self.poll_interval = nonzero_ms(ENV_POLL_INTERVAL_MS, ms)?;
        }
        Ok(())
    }
}

fn nonzero_ms(key: &str, ms: u64) -> Result<Duration> {
    if ms == 0 {
        return Err(SantaError::Config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_millis(ms))
}

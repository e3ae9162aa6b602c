//! Configuration – reads `~/.butler/config.toml` and `BUTLER_*` overrides.

use std::fs;
use std::path::{Path, PathBuf};

use butler_types::LimitTable;
use serde::Deserialize;
use zeroize::Zeroize;

/// Relay configuration.  Every field has a default so an absent or partial
/// file is fine; only the OpenAI key is mandatory.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// HTTP listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the OpenAI-compatible planning endpoint.
    #[serde(default = "default_oracle_url")]
    pub oracle_base_url: String,

    /// Vision model used for planning.
    #[serde(default = "default_model")]
    pub oracle_model: String,

    /// Deadline for one planning call.
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Maximum snapshot age accepted for planning.  Tunable; 60 s matches the
    /// robot's upload cadence.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,

    /// Largest accepted camera frame.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Joint bounds enforced on every `MOVE`.
    #[serde(default)]
    pub limits: LimitTable,

    /// Key for the planning endpoint.
    #[serde(default)]
    pub openai_api_key: String,

    /// Shared secret robots must send in `x-api-key`.  Empty disables the
    /// check.
    #[serde(default)]
    pub proxy_api_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("oracle_base_url", &self.oracle_base_url)
            .field("oracle_model", &self.oracle_model)
            .field("oracle_timeout_secs", &self.oracle_timeout_secs)
            .field("freshness_window_secs", &self.freshness_window_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("limits", &self.limits)
            .field("openai_api_key", redacted(&self.openai_api_key))
            .field("proxy_api_key", redacted(&self.proxy_api_key))
            .finish()
    }
}

fn redacted(secret: &str) -> &'static &'static str {
    if secret.is_empty() { &"<not set>" } else { &"<redacted>" }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.openai_api_key.zeroize();
        self.proxy_api_key.zeroize();
    }
}

fn default_port() -> u16 {
    8000
}
fn default_oracle_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_oracle_timeout_secs() -> u64 {
    30
}
fn default_freshness_window_secs() -> u64 {
    60
}
fn default_max_upload_bytes() -> usize {
    1_500_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            oracle_base_url: default_oracle_url(),
            oracle_model: default_model(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            freshness_window_secs: default_freshness_window_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            limits: LimitTable::default(),
            openai_api_key: String::new(),
            proxy_api_key: String::new(),
        }
    }
}

impl Config {
    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.openai_api_key.is_empty() {
            return Err("OPENAI_API_KEY missing".to_string());
        }
        if self.oracle_timeout_secs == 0 {
            return Err("oracle_timeout_secs must be greater than zero".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than zero".to_string());
        }
        self.freshness_window()?;
        self.limits.validate().map_err(|e| e.to_string())
    }

    /// `freshness_window_secs` as a snapshot age bound.
    pub fn freshness_window(&self) -> Result<chrono::Duration, String> {
        i64::try_from(self.freshness_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| "freshness_window_secs is out of range".to_string())
    }
}

/// `$BUTLER_CONFIG`, or `~/.butler/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("BUTLER_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".butler").join("config.toml")
}

/// Load, override from the environment, and validate.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the file at `path`.  `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `OPENAI_API_KEY` | `openai_api_key` |
/// | `PROXY_API_KEY` | `proxy_api_key` |
/// | `BUTLER_PORT` | `port` |
/// | `BUTLER_MODEL` | `oracle_model` |
/// | `BUTLER_ORACLE_URL` | `oracle_base_url` |
/// | `BUTLER_ORACLE_TIMEOUT_SECS` | `oracle_timeout_secs` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("OPENAI_API_KEY") {
        cfg.openai_api_key = v;
    }
    if let Some(v) = lookup("PROXY_API_KEY") {
        cfg.proxy_api_key = v;
    }
    if let Some(port) = lookup("BUTLER_PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
        cfg.port = port;
    }
    if let Some(v) = lookup("BUTLER_MODEL") {
        cfg.oracle_model = v;
    }
    if let Some(v) = lookup("BUTLER_ORACLE_URL") {
        cfg.oracle_base_url = v;
    }
    if let Some(secs) =
        lookup("BUTLER_ORACLE_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok())
    {
        cfg.oracle_timeout_secs = secs;
    }
}

//! Persisted configuration for the thingurl adapter.
//!
//! A TOML file holding the poll interval and the user's thing URLs,
//! layered with `THINGURL_*` environment overrides, translated into
//! `thingurl_core::AdapterConfig`. [`FileConfigStore`] lets the adapter
//! drop URLs from the file when the user removes a device.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use thingurl_core::model::normalize_href;
use thingurl_core::{AdapterConfig, CoreError, ThingUrl, TlsVerification, UrlStore};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::Config {
            message: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Seconds between poll cycles for devices without a push channel.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accept invalid TLS certificates (self-signed devices).
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Thing URLs to load at startup.
    #[serde(default)]
    pub urls: Vec<ThingUrl>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
            urls: Vec::new(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}
fn default_timeout() -> u64 {
    10
}

/// On-disk shape, accepting the legacy bare-string URL entries.
#[derive(Debug, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default = "default_poll_interval")]
    poll_interval: u64,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    insecure: bool,
    #[serde(default)]
    ca_cert: Option<PathBuf>,
    #[serde(default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum UrlEntry {
    Legacy(String),
    Current(ThingUrl),
}

impl RawConfig {
    /// Upgrade to the current shape. The flag is `true` if any entry was
    /// in the legacy form.
    fn upgrade(self) -> (Config, bool) {
        let mut migrated = false;
        let urls = self
            .urls
            .into_iter()
            .map(|entry| match entry {
                UrlEntry::Legacy(href) => {
                    migrated = true;
                    ThingUrl::new(href)
                }
                UrlEntry::Current(url) => url,
            })
            .collect();

        (
            Config {
                poll_interval: self.poll_interval,
                timeout: self.timeout,
                insecure: self.insecure,
                ca_cert: self.ca_cert,
                urls,
            },
            migrated,
        )
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "thingurl", "thingurl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("thingurl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path` + environment.
///
/// A missing file yields the defaults. Legacy URL entries are upgraded
/// and, if there were any, the file is rewritten in the current shape.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("THINGURL_"));

    let raw: RawConfig = figment.extract()?;
    let (config, migrated) = raw.upgrade();
    validate(&config)?;

    if migrated {
        info!(path = %path.display(), "migrating legacy URL entries");
        save_config(path, &config)?;
    }

    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.poll_interval == 0 {
        return Err(ConfigError::Validation {
            field: "poll_interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build the adapter's runtime config from the file's settings.
pub fn to_adapter_config(config: &Config) -> AdapterConfig {
    let tls = if config.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = config.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    AdapterConfig {
        poll_interval: Duration::from_secs(config.poll_interval),
        timeout: Duration::from_secs(config.timeout),
        tls,
        ..AdapterConfig::default()
    }
}

// ── URL store ───────────────────────────────────────────────────────

/// [`UrlStore`] backed by the config file.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UrlStore for FileConfigStore {
    fn saved_urls(&self) -> Result<Vec<ThingUrl>, CoreError> {
        Ok(load_config(&self.path)?.urls)
    }

    fn remove_url(&self, href: &str) -> Result<bool, CoreError> {
        let mut config = load_config(&self.path)?;
        let target = normalize_href(href);
        let before = config.urls.len();
        config
            .urls
            .retain(|u| normalize_href(&u.href) != target);

        if config.urls.len() == before {
            return Ok(false);
        }
        save_config(&self.path, &config)?;
        info!(href = %target, "removed URL from config");
        Ok(true)
    }
}

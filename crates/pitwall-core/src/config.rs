//! Configuration resolution for Pitwall.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/pitwall/settings.json)
//! 3. Environment variables (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default certificate lifetime: 7 days.
pub const DEFAULT_CERTIFICATE_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

/// Default clock-skew tolerance for offline freshness checks: 5 minutes.
pub const DEFAULT_SKEW_TOLERANCE_SECS: i64 = 5 * 60;

/// Complete Pitwall configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oac: OacConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Offline-authorization-certificate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OacConfig {
    /// Lifetime of every issued certificate, in seconds. Server-controlled;
    /// the signer clamps this to its hard ceiling regardless of what the
    /// config says.
    pub certificate_lifetime_secs: i64,
    /// Clock-skew tolerance applied on both sides of `exp` during offline
    /// verification, in seconds.
    pub skew_tolerance_secs: i64,
    /// Path to the server's 32-byte Ed25519 signing key file. Absence at
    /// startup is fatal for the issuing side.
    pub signing_key_path: Option<PathBuf>,
}

impl Default for OacConfig {
    fn default() -> Self {
        Self {
            certificate_lifetime_secs: DEFAULT_CERTIFICATE_LIFETIME_SECS,
            skew_tolerance_secs: DEFAULT_SKEW_TOLERANCE_SECS,
            signing_key_path: None,
        }
    }
}

/// Server-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".pitwall").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/pitwall/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("pitwall").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Get the default database path for the device registry.
pub fn database_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".pitwall").join("registry.db"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/pitwall/registry.db"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("pitwall").join("registry.db"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.oac.signing_key_path.is_some() {
        base.oac.signing_key_path = overlay.oac.signing_key_path;
    }
    base.oac.certificate_lifetime_secs = overlay.oac.certificate_lifetime_secs;
    base.oac.skew_tolerance_secs = overlay.oac.skew_tolerance_secs;

    if overlay.server.database_path.is_some() {
        base.server.database_path = overlay.server.database_path;
    }
    base.server.log_level = overlay.server.log_level;
    base.server.log_json = overlay.server.log_json;
}

fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Override application, parameterised over the variable source so it can
/// be tested without touching the process environment. Unparseable numeric
/// values are ignored, keeping the previous value.
fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("PITWALL_OAC_LIFETIME_SECS") {
        if let Ok(n) = val.parse() {
            config.oac.certificate_lifetime_secs = n;
        }
    }
    if let Some(val) = var("PITWALL_SKEW_TOLERANCE_SECS") {
        if let Ok(n) = val.parse() {
            config.oac.skew_tolerance_secs = n;
        }
    }
    if let Some(val) = var("PITWALL_SIGNING_KEY_PATH") {
        config.oac.signing_key_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("PITWALL_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("PITWALL_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = var("PITWALL_LOG_JSON") {
        config.server.log_json = matches!(val.as_str(), "1" | "true" | "yes");
    }
}

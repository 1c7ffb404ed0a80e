//! Configuration file management for beacon-scan.
//!
//! Reads/writes `~/.beacon-scan/config.yaml` with scan settings, vendor
//! recognition and the optional webhook URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionConfig;
use crate::types::{uuid_from_hex, uuid_to_dashed, BeaconError, BeaconUuid};
use crate::vendor::DEFAULT_VENDOR_PREFIX;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub scan: ScanConfig,
    pub vendor: VendorConfig,
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Quiet period before a session ends, in milliseconds.
    pub period_ms: u64,
    /// Only beacons broadcasting this UUID are reported.
    pub uuid: Option<BeaconUuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VendorConfig {
    pub prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan: ScanConfig {
                period_ms: 10_000,
                uuid: None,
            },
            vendor: VendorConfig {
                prefix: DEFAULT_VENDOR_PREFIX.into(),
            },
            webhook: None,
        }
    }
}

impl Config {
    /// Session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            scanning_period: Duration::from_millis(self.scan.period_ms),
            uuid_filter: self.scan.uuid,
            vendor_prefix: self.vendor.prefix.clone(),
        }
    }
}

/// Get the config directory path (`~/.beacon-scan/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".beacon-scan")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.beacon-scan/config.yaml`.
///
/// Returns default config if file doesn't exist or can't be read.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, with the same fallbacks as [`load_config`].
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            return Config::default();
        }
    };

    parse_config(&text)
}

/// Save config to `~/.beacon-scan/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, BeaconError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), BeaconError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| BeaconError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config)).map_err(|e| BeaconError::Config(e.to_string()))?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

/// Parse simple YAML-like config text. Unknown keys and bad values are
/// skipped, keeping the default for that field.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        if let Some((key, val)) = stripped.split_once(':') {
            let key = key.trim();
            let val = val.trim();

            if !is_indented {
                if val.is_empty() {
                    current_section = Some(key.to_string());
                } else {
                    current_section = None;
                    if key == "webhook" {
                        config.webhook = parse_string_value(val);
                    }
                }
            } else if let Some(ref section) = current_section {
                match (section.as_str(), key) {
                    ("scan", "period_ms") => {
                        if let Ok(v) = val.parse::<u64>() {
                            config.scan.period_ms = v;
                        }
                    }
                    ("scan", "uuid") => {
                        config.scan.uuid =
                            parse_string_value(val).and_then(|s| uuid_from_hex(&s).ok());
                    }
                    ("vendor", "prefix") => {
                        if let Some(v) = parse_string_value(val) {
                            config.vendor.prefix = v;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    config
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# beacon-scan configuration".to_string(), String::new()];

    lines.push("scan:".into());
    lines.push(format!("  period_ms: {}", config.scan.period_ms));
    match &config.scan.uuid {
        Some(uuid) => lines.push(format!("  uuid: \"{}\"", uuid_to_dashed(uuid))),
        None => lines.push("  uuid: null".into()),
    }
    lines.push(String::new());

    lines.push("vendor:".into());
    lines.push(format!("  prefix: \"{}\"", config.vendor.prefix));
    lines.push(String::new());

    match &config.webhook {
        Some(url) => lines.push(format!("webhook: \"{url}\"")),
        None => lines.push("webhook: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{NetPolicyError, Result};
use crate::engine::capabilities::{Capabilities, EngineVariant, OfflineApps};
use crate::policy::flags::RestrictionFlag;

/// Full netpol configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Which switches the session exposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub variant: EngineVariant,
    /// Replaces the variant's flag list when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_flags: Option<Vec<RestrictionFlag>>,
    /// Replaces the variant's expansion support when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expandable: Option<bool>,
    pub offline_apps: OfflineApps,
}

impl EngineConfig {
    /// Effective capabilities: the variant preset with overrides applied.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::for_variant(self.variant);
        if let Some(flags) = &self.tracked_flags {
            caps.tracked_flags.clone_from(flags);
        }
        if let Some(expandable) = self.expandable {
            caps.expandable = expandable;
        }
        caps.offline_apps = self.offline_apps;
        caps
    }
}

/// Filesystem paths used by netpol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// JSON policy file standing in for the OS policy service.
    pub policy_store: PathBuf,
    /// TOML manifest listing installed apps.
    pub app_manifest: PathBuf,
    pub activity_log: PathBuf,
}

/// JSONL activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    /// Seconds between fsyncs; 0 syncs every entry.
    pub fsync_interval_secs: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[NETPOL-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("netpol");
        let data = home_dir.join(".local").join("share").join("netpol");
        Self {
            config_file: cfg.join("config.toml"),
            policy_store: data.join("policy.json"),
            app_manifest: cfg.join("apps.toml"),
            activity_log: data.join("activity.jsonl"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_path: None,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 5,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| NetPolicyError::io(&path_buf, source))?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(NetPolicyError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(lookup)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the JSON form, stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render the effective config as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|error| NetPolicyError::Serialization {
            context: "toml",
            details: error.to_string(),
        })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // engine
        if let Some(raw) = lookup("NETPOL_ENGINE_VARIANT") {
            self.engine.variant = match raw.trim().to_ascii_lowercase().as_str() {
                "full" => EngineVariant::Full,
                "simple" => EngineVariant::Simple,
                _ => return Err(env_error("NETPOL_ENGINE_VARIANT", &raw, "expected full|simple")),
            };
        }
        if let Some(raw) = lookup("NETPOL_ENGINE_TRACKED_FLAGS") {
            let flags = raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::parse::<RestrictionFlag>)
                .collect::<Result<Vec<_>>>()
                .map_err(|error| {
                    env_error("NETPOL_ENGINE_TRACKED_FLAGS", &raw, &error.to_string())
                })?;
            self.engine.tracked_flags = Some(flags);
        }
        if let Some(raw) = lookup("NETPOL_ENGINE_EXPANDABLE") {
            self.engine.expandable = Some(parse_env_bool("NETPOL_ENGINE_EXPANDABLE", &raw)?);
        }
        if let Some(raw) = lookup("NETPOL_ENGINE_OFFLINE_APPS") {
            self.engine.offline_apps = match raw.trim().to_ascii_lowercase().as_str() {
                "hide" => OfflineApps::Hide,
                "disable" => OfflineApps::Disable,
                _ => {
                    return Err(env_error(
                        "NETPOL_ENGINE_OFFLINE_APPS",
                        &raw,
                        "expected hide|disable",
                    ));
                }
            };
        }

        // paths
        if let Some(raw) = lookup("NETPOL_POLICY_STORE") {
            self.paths.policy_store = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("NETPOL_APP_MANIFEST") {
            self.paths.app_manifest = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("NETPOL_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        // logging
        if let Some(raw) = lookup("NETPOL_LOG_ENABLED") {
            self.logging.enabled = parse_env_bool("NETPOL_LOG_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("NETPOL_LOG_FALLBACK_PATH") {
            self.logging.fallback_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("NETPOL_LOG_MAX_SIZE_BYTES") {
            self.logging.max_size_bytes = parse_env_u64("NETPOL_LOG_MAX_SIZE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("NETPOL_LOG_MAX_ROTATED_FILES") {
            let value = parse_env_u64("NETPOL_LOG_MAX_ROTATED_FILES", &raw)?;
            self.logging.max_rotated_files = u32::try_from(value).map_err(|error| {
                env_error("NETPOL_LOG_MAX_ROTATED_FILES", &raw, &error.to_string())
            })?;
        }
        if let Some(raw) = lookup("NETPOL_LOG_FSYNC_INTERVAL_SECS") {
            self.logging.fsync_interval_secs =
                parse_env_u64("NETPOL_LOG_FSYNC_INTERVAL_SECS", &raw)?;
        }

        Ok(())
    }

    /// Resolve relative data paths against the config file's directory.
    fn normalize_paths(&mut self) {
        let Some(base) = self
            .paths
            .config_file
            .parent()
            .map(Path::to_path_buf)
            .filter(|dir| !dir.as_os_str().is_empty())
        else {
            return;
        };
        for path in [
            &mut self.paths.policy_store,
            &mut self.paths.app_manifest,
            &mut self.paths.activity_log,
        ] {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        }
        if let Some(fallback) = self.logging.fallback_path.as_mut()
            && fallback.is_relative()
        {
            *fallback = base.join(&*fallback);
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(flags) = &self.engine.tracked_flags {
            if flags.is_empty() {
                return Err(NetPolicyError::InvalidConfig {
                    details: "engine.tracked_flags must name at least one flag".to_string(),
                });
            }
            for (index, flag) in flags.iter().enumerate() {
                if flags[..index].contains(flag) {
                    return Err(NetPolicyError::InvalidConfig {
                        details: format!("engine.tracked_flags lists {flag} twice"),
                    });
                }
            }
        }

        for (name, path) in [
            ("policy_store", &self.paths.policy_store),
            ("app_manifest", &self.paths.app_manifest),
            ("activity_log", &self.paths.activity_log),
        ] {
            if path.as_os_str().is_empty() {
                return Err(NetPolicyError::InvalidConfig {
                    details: format!("paths.{name} must not be empty"),
                });
            }
        }

        if self.logging.max_size_bytes < 1024 {
            return Err(NetPolicyError::InvalidConfig {
                details: format!(
                    "logging.max_size_bytes must be >= 1024, got {}",
                    self.logging.max_size_bytes
                ),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(NetPolicyError::InvalidConfig {
                details: "logging.max_rotated_files must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn env_error(name: &str, raw: &str, details: &str) -> NetPolicyError {
    NetPolicyError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {details}"),
    }
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| env_error(name, raw, &error.to_string()))
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(env_error(name, raw, "expected a boolean")),
    }
}

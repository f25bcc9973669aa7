//! Configuration module for runscribe
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/runscribe/runscribe.toml)
//! - User configuration (~/.runscribe.toml)
//! - Project configuration (./runscribe.toml)
//! - An explicit file (`--config` / `RUNSCRIBE_CONFIG`)
//! - Environment variables
//! - Command-line arguments
//!
//! Files are merged key by key, so a later file only needs the keys it
//! changes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, ErrorContext, Result};
use crate::recorder::activity::DEFAULT_ACTIVITY_WINDOW;
use crate::report::views::DEFAULT_TIMELINE_WINDOW;
use crate::report::{CacheKeyPolicy, UndefinedMode};

/// Default root folder for reports.
pub const DEFAULT_LOG_FOLDER: &str = ".runscribe";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recorder settings
    pub recorder: RecorderConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Root folder; each run gets a timestamped folder inside it
    pub log_folder: PathBuf,

    /// Number of tasks kept in the recent-activity table
    pub activity_window: usize,

    /// Most recent results shown in `timeline.adoc` until the run ends
    pub timeline_window: usize,

    /// Undefined-variable handling for templates
    pub undefined: UndefinedMode,

    /// Template cache key policy
    pub cache_key: CacheKeyPolicy,

    /// chrono format for run folder names
    pub run_folder_format: String,

    /// Title of the run README; may reference `run.*`
    pub run_title: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            log_folder: PathBuf::from(DEFAULT_LOG_FOLDER),
            activity_window: DEFAULT_ACTIVITY_WINDOW,
            timeline_window: DEFAULT_TIMELINE_WINDOW,
            undefined: UndefinedMode::PassThrough,
            cache_key: CacheKeyPolicy::IdentifierAndContent,
            run_folder_format: "%Y%m%d-%H%M%S".to_string(),
            run_title: "Run {{ run.started_at }}".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format for log lines
    pub format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset and no `-v` is given
    pub level: Option<String>,
}

impl Config {
    /// Load configuration from default locations, or from `config_path` only
    /// when one is given.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                let layer = Self::read_layer(&path)?;
                merge_json(&mut merged, layer);
            } else if config_path == Some(&path) {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut config: Config = serde_json::from_value(merged)
            .context("Failed to interpret merged configuration")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        // System-wide config
        paths.push(PathBuf::from("/etc/runscribe/runscribe.toml"));

        // User config
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".runscribe.toml"));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("runscribe.toml"));

        paths
    }

    /// Parse one file into a JSON tree, choosing the format by extension.
    fn read_layer(path: &Path) -> Result<JsonValue> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let layer: JsonValue = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => {
                // Try TOML first, then YAML
                match toml::from_str(&content) {
                    Ok(value) => value,
                    Err(_) => serde_yaml::from_str(&content).with_context(|| {
                        format!("Failed to parse config file: {}", path.display())
                    })?,
                }
            }
        };
        Ok(layer)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // RUNSCRIBE_LOG_FOLDER
        if let Ok(folder) = std::env::var("RUNSCRIBE_LOG_FOLDER") {
            if !folder.is_empty() {
                self.recorder.log_folder = PathBuf::from(folder);
            }
        }

        // RUNSCRIBE_ACTIVITY_WINDOW
        if let Ok(window) = std::env::var("RUNSCRIBE_ACTIVITY_WINDOW") {
            match window.parse() {
                Ok(n) => self.recorder.activity_window = n,
                Err(_) => warn!("Ignoring invalid RUNSCRIBE_ACTIVITY_WINDOW={}", window),
            }
        }

        // RUNSCRIBE_TIMELINE_WINDOW
        if let Ok(window) = std::env::var("RUNSCRIBE_TIMELINE_WINDOW") {
            match window.parse() {
                Ok(n) => self.recorder.timeline_window = n,
                Err(_) => warn!("Ignoring invalid RUNSCRIBE_TIMELINE_WINDOW={}", window),
            }
        }

        // RUNSCRIBE_STRICT_UNDEFINED
        if let Ok(strict) = std::env::var("RUNSCRIBE_STRICT_UNDEFINED") {
            match strict.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.recorder.undefined = UndefinedMode::Strict,
                "0" | "false" | "no" | "off" | "" => {
                    self.recorder.undefined = UndefinedMode::PassThrough
                }
                _ => warn!("Ignoring invalid RUNSCRIBE_STRICT_UNDEFINED={}", strict),
            }
        }

        // RUNSCRIBE_LOG_FORMAT
        if let Ok(format) = std::env::var("RUNSCRIBE_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "text" => self.logging.format = LogFormat::Text,
                _ => warn!("Ignoring invalid RUNSCRIBE_LOG_FORMAT={}", format),
            }
        }
    }

    /// Reject values the recorder cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.recorder.activity_window == 0 {
            return Err(Error::InvalidConfig {
                key: "recorder.activity_window".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.recorder.timeline_window == 0 {
            return Err(Error::InvalidConfig {
                key: "recorder.timeline_window".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.recorder.log_folder.as_os_str().is_empty() {
            return Err(Error::InvalidConfig {
                key: "recorder.log_folder".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        let format = &self.recorder.run_folder_format;
        if format.trim().is_empty() || format.contains('/') || format.contains('\\') {
            return Err(Error::InvalidConfig {
                key: "recorder.run_folder_format".to_string(),
                message: "must be a non-empty single path segment".to_string(),
            });
        }
        Ok(())
    }

    /// Look up a value by dotted key, e.g. `recorder.log_folder`.
    pub fn get(&self, key: &str) -> Option<String> {
        let tree = serde_json::to_value(self).ok()?;
        let value = key.split('.').try_fold(&tree, |node, part| node.get(part))?;
        Some(match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Recursively merge `layer` into `base`; objects merge, everything else replaces.
fn merge_json(base: &mut JsonValue, layer: JsonValue) {
    match (base, layer) {
        (JsonValue::Object(base), JsonValue::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.recorder.log_folder, PathBuf::from(".runscribe"));
        assert_eq!(config.recorder.activity_window, 20);
        assert_eq!(config.recorder.undefined, UndefinedMode::PassThrough);
        assert_eq!(config.recorder.cache_key, CacheKeyPolicy::IdentifierAndContent);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_unset_keys() {
        let mut base = serde_json::to_value(Config::default()).unwrap();
        let layer = serde_json::json!({"recorder": {"activity_window": 5}});
        merge_json(&mut base, layer);
        let config: Config = serde_json::from_value(base).unwrap();
        assert_eq!(config.recorder.activity_window, 5);
        assert_eq!(config.recorder.log_folder, PathBuf::from(".runscribe"));
    }

    #[test]
    #[serial]
    fn test_load_explicit_toml() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[recorder]\nlog_folder = \"/tmp/reports\"\ncache_key = \"identifier_only\"\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.recorder.log_folder, PathBuf::from("/tmp/reports"));
        assert_eq!(config.recorder.cache_key, CacheKeyPolicy::IdentifierOnly);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.recorder.activity_window, 20);
    }

    #[test]
    #[serial]
    fn test_load_yaml_without_extension() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "recorder:\n  undefined: strict\n  activity_window: 7").unwrap();
        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.recorder.undefined, UndefinedMode::Strict);
        assert_eq!(config.recorder.activity_window, 7);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/runscribe.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("RUNSCRIBE_LOG_FOLDER", "/var/tmp/scribe");
        std::env::set_var("RUNSCRIBE_ACTIVITY_WINDOW", "3");
        std::env::set_var("RUNSCRIBE_TIMELINE_WINDOW", "50");
        std::env::set_var("RUNSCRIBE_STRICT_UNDEFINED", "true");
        std::env::set_var("RUNSCRIBE_LOG_FORMAT", "json");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("RUNSCRIBE_LOG_FOLDER");
        std::env::remove_var("RUNSCRIBE_ACTIVITY_WINDOW");
        std::env::remove_var("RUNSCRIBE_TIMELINE_WINDOW");
        std::env::remove_var("RUNSCRIBE_STRICT_UNDEFINED");
        std::env::remove_var("RUNSCRIBE_LOG_FORMAT");

        assert_eq!(config.recorder.log_folder, PathBuf::from("/var/tmp/scribe"));
        assert_eq!(config.recorder.activity_window, 3);
        assert_eq!(config.recorder.timeline_window, 50);
        assert_eq!(config.recorder.undefined, UndefinedMode::Strict);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_ignored() {
        std::env::set_var("RUNSCRIBE_ACTIVITY_WINDOW", "many");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("RUNSCRIBE_ACTIVITY_WINDOW");
        assert_eq!(config.recorder.activity_window, 20);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.recorder.activity_window = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { ref key, .. }) if key == "recorder.activity_window"
        ));

        let mut config = Config::default();
        config.recorder.timeline_window = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { ref key, .. }) if key == "recorder.timeline_window"
        ));
    }

    #[test]
    fn test_named_key_lookup_and_toml() {
        let config = Config::default();
        assert_eq!(config.get("recorder.log_folder").as_deref(), Some(".runscribe"));
        assert_eq!(config.get("recorder.activity_window").as_deref(), Some("20"));
        assert!(config.get("recorder.nope").is_none());
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[recorder]"));
        assert!(toml.contains("log_folder = \".runscribe\""));
    }
}

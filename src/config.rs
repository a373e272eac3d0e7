//! TOML configuration for the solarsentinel service.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::engine::EngineSettings;
use crate::detect::{DetectionConfig, Sensitivity};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SOLARSENTINEL_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/solarsentinel/solarsentinel.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub detection: DetectionSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SentinelConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .detection
            .validate()
            .with_context(|| format!("invalid [detection] section in {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration, in order:
    /// 1. An explicit path (the `--config` flag). Errors here are fatal.
    /// 2. The path in `SOLARSENTINEL_CONFIG`.
    /// 3. `/etc/solarsentinel/solarsentinel.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/solarsentinel.db"),
        }
    }
}

/// Detection defaults applied when a request omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub default_period_hours: u32,
    pub max_period_hours: u32,
    /// Telemetry sampling interval; gaps longer than twice this are flagged.
    pub expected_interval_minutes: f64,
    /// Digital-twin gaps must exceed this magnitude (percent) to be flagged.
    pub gap_threshold_percent: f64,
    pub sensitivity: Sensitivity,
    pub statistical_enabled: bool,
    pub digital_twin_enabled: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            default_period_hours: 24,
            max_period_hours: 720,
            expected_interval_minutes: 15.0,
            gap_threshold_percent: 10.0,
            sensitivity: Sensitivity::Medium,
            statistical_enabled: true,
            digital_twin_enabled: true,
        }
    }
}

impl DetectionSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_period_hours >= 1,
            "max_period_hours must be at least 1"
        );
        ensure!(
            (1..=self.max_period_hours).contains(&self.default_period_hours),
            "default_period_hours ({}) must be between 1 and max_period_hours ({})",
            self.default_period_hours,
            self.max_period_hours
        );
        ensure!(
            self.expected_interval_minutes.is_finite() && self.expected_interval_minutes > 0.0,
            "expected_interval_minutes must be positive, got {}",
            self.expected_interval_minutes
        );
        ensure!(
            self.gap_threshold_percent.is_finite() && self.gap_threshold_percent >= 0.0,
            "gap_threshold_percent must be zero or positive, got {}",
            self.gap_threshold_percent
        );
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_period_hours: self.default_period_hours,
            max_period_hours: self.max_period_hours,
            expected_interval_minutes: self.expected_interval_minutes,
            gap_threshold_percent: self.gap_threshold_percent,
            default_config: DetectionConfig {
                statistical_enabled: self.statistical_enabled,
                digital_twin_enabled: self.digital_twin_enabled,
                sensitivity: self.sensitivity,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.storage.database_path, PathBuf::from("data/solarsentinel.db"));
        assert_eq!(cfg.detection.default_period_hours, 24);
        assert_eq!(cfg.detection.expected_interval_minutes, 15.0);
        assert_eq!(cfg.detection.gap_threshold_percent, 10.0);
        assert_eq!(cfg.detection.sensitivity, Sensitivity::Medium);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"

[storage]
database_path = "/var/lib/solarsentinel/fleet.db"

[detection]
default_period_hours = 48
max_period_hours = 168
expected_interval_minutes = 5.0
gap_threshold_percent = 12.5
sensitivity = "high"
statistical_enabled = false

[logging]
level = "debug"
json = true
"#;

        let cfg: SentinelConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(
            cfg.storage.database_path,
            PathBuf::from("/var/lib/solarsentinel/fleet.db")
        );
        assert_eq!(cfg.detection.default_period_hours, 48);
        assert_eq!(cfg.detection.sensitivity, Sensitivity::High);
        assert!(!cfg.detection.statistical_enabled);
        assert!(cfg.detection.digital_twin_enabled);
        assert!(cfg.logging.json);

        let engine = cfg.detection.engine_settings();
        assert_eq!(engine.max_period_hours, 168);
        assert_eq!(engine.expected_interval_minutes, 5.0);
        assert_eq!(engine.gap_threshold_percent, 12.5);
        assert!(!engine.default_config.statistical_enabled);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: SentinelConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.server.bind, ServerConfig::default().bind);
        assert_eq!(cfg.detection.max_period_hours, 720);
    }

    #[test]
    fn test_defaults_validate() {
        DetectionSettings::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_unusable_detection_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        for section in [
            "expected_interval_minutes = 0.0",
            "expected_interval_minutes = -15.0",
            "gap_threshold_percent = -5.0",
            "default_period_hours = 48\nmax_period_hours = 24",
            "default_period_hours = 0",
            "max_period_hours = 0",
        ] {
            std::fs::write(&path, format!("[detection]\n{section}\n")).unwrap();
            let err = SentinelConfig::load(&path).unwrap_err();
            assert!(
                format!("{err:#}").contains("invalid [detection] section"),
                "{section}: {err:#}"
            );
        }
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(SentinelConfig::resolve(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.toml");
        std::fs::write(&path, "[detection]\nsensitivity = \"low\"\n").unwrap();
        let cfg = SentinelConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.detection.sensitivity, Sensitivity::Low);
        assert_eq!(cfg.detection.default_period_hours, 24);
    }
}

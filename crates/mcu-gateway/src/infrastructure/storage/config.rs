//! TOML configuration for the gateway.
//!
//! ```toml
//! [gateway]
//! log_level = "info"
//!
//! [serial]
//! poll_interval_ms = 1000
//!
//! [plugins]
//! disabled = ["pause"]
//!
//! [robot]
//! host = "0.0.0.0"
//! port = 65432
//!
//! [laser]
//! path = "/dev/ttyUSB0"
//! baud_rate = 9600
//! ```
//!
//! Every field has a serde default, so a file containing only the sections
//! an installation cares about is valid, and a missing file means
//! [`GatewayConfig::default()`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GeneralConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub laser: LaserConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Settings shared by every serial link.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Delay between two polls of a serial port, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Plugin selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PluginsConfig {
    /// Names of catalog plugins to skip at discovery.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl PluginsConfig {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}

/// TCP endpoint the robot controller connects to.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RobotConfig {
    #[serde(default = "default_robot_host")]
    pub host: String,
    #[serde(default = "default_robot_port")]
    pub port: u16,
}

/// Serial endpoint of the laser controller.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LaserConfig {
    /// Device path such as `/dev/ttyUSB0` or `COM10`.  No default: a gateway
    /// without a laser simply skips the laser plugin.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_robot_host() -> String {
    "0.0.0.0".to_string()
}
fn default_robot_port() -> u16 {
    65432
}
fn default_baud_rate() -> u32 {
    9600
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            host: default_robot_host(),
            port: default_robot_port(),
        }
    }
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: default_baud_rate(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the configuration at `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mcu-gateway-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.gateway.log_level, "info");
        assert_eq!(cfg.serial.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.robot.host, "0.0.0.0");
        assert_eq!(cfg.robot.port, 65432);
        assert!(cfg.laser.path.is_none());
        assert!(cfg.plugins.disabled.is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: GatewayConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, GatewayConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[robot]
port = 7000

[laser]
path = "COM10"
"#;

        // Act
        let cfg: GatewayConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.robot.port, 7000);
        assert_eq!(cfg.robot.host, "0.0.0.0");
        assert_eq!(cfg.laser.path.as_deref(), Some("COM10"));
        assert_eq!(cfg.laser.baud_rate, 9600);
    }

    #[test]
    fn test_is_disabled_matches_exact_name() {
        let plugins = PluginsConfig {
            disabled: vec!["pause".into()],
        };
        assert!(plugins.is_disabled("pause"));
        assert!(!plugins.is_disabled("pause2"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let path = scratch_path("bad.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config(&scratch_path("absent.toml")).expect("defaults");
        assert_eq!(cfg, GatewayConfig::default());
    }

    #[test]
    fn test_file_on_disk_is_loaded() {
        // Arrange
        let path = scratch_path("mcu.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "[serial]\npoll_interval_ms = 250\n\n[plugins]\ndisabled = [\"measure\"]\n",
        )
        .unwrap();

        // Act
        let cfg = load_config(&path).expect("load");

        // Assert
        assert_eq!(cfg.serial.poll_interval(), Duration::from_millis(250));
        assert!(cfg.plugins.is_disabled("measure"));
    }
}

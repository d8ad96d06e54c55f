//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is assembled in `main.rs` from CLI arguments (bind address, device
//! prefix, baud rate, timeout) and from an optional TOML file holding the
//! tunables that have no CLI flag:
//!
//! ```toml
//! log_level = "debug"
//! discovery_interval_ms = 1000
//! poll_interval_ms = 10
//! session_queue_depth = 256
//! flash_command = "./flash.sh"
//! ```
//!
//! Every field of the file is optional; absent fields take the defaults
//! below, so an empty file is valid.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
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

/// How to open a serial device once one has been found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Path prefix; every path matching `<pattern>*` is a candidate.
    pub pattern: String,
    /// Line speed in baud.
    pub baud_rate: u32,
    /// Read / write timeout applied to the opened device.
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            pattern: "/dev/ttyUSB".to_string(),
            baud_rate: 115_200,
            timeout: Duration::from_secs(1),
        }
    }
}

/// All runtime configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,
    /// Serial device selection and line settings.
    pub serial: SerialSettings,
    /// Pause between two full discovery scans that found nothing usable.
    pub discovery_interval: Duration,
    /// Interval at which the open device is polled for new bytes.
    pub poll_interval: Duration,
    /// Chunks buffered per session before the oldest are dropped.
    pub session_queue_depth: usize,
    /// Shell command run for flash requests; the archive path is appended.
    pub flash_command: Option<String>,
}

impl Default for ServerConfig {
    /// | Field               | Default          |
    /// |---------------------|------------------|
    /// | bind_addr           | `0.0.0.0:8080`   |
    /// | serial.baud_rate    | 115200           |
    /// | serial.timeout      | 1 second         |
    /// | discovery_interval  | 1 second         |
    /// | poll_interval       | 10 ms            |
    /// | session_queue_depth | 256              |
    /// | flash_command       | none             |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            serial: SerialSettings::default(),
            discovery_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            session_queue_depth: 256,
            flash_command: None,
        }
    }
}

/// Tunables read from the optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_session_queue_depth")]
    pub session_queue_depth: usize,
    /// Used when `--flash-command` is not given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_command: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_session_queue_depth() -> usize {
    256
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            discovery_interval_ms: default_discovery_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            session_queue_depth: default_session_queue_depth(),
            flash_command: None,
        }
    }
}

impl FileConfig {
    /// Parses tunables from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads tunables from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Copies the tunables into `config`.  Zero intervals and depths are
    /// raised to 1 so the relay loop never spins.
    pub fn apply_to(&self, config: &mut ServerConfig) {
        config.discovery_interval = Duration::from_millis(self.discovery_interval_ms.max(1));
        config.poll_interval = Duration::from_millis(self.poll_interval_ms.max(1));
        config.session_queue_depth = self.session_queue_depth.max(1);
        if config.flash_command.is_none() {
            config.flash_command = self.flash_command.clone();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bind_port_is_8080() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_serial_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.serial.baud_rate, 115_200);
        assert_eq!(cfg.serial.timeout, Duration::from_secs(1));
        assert_eq!(cfg.discovery_interval, Duration::from_secs(1));
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let file = FileConfig::from_toml_str("").unwrap();
        assert_eq!(file, FileConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_given_fields() {
        // Arrange
        let file = FileConfig::from_toml_str("poll_interval_ms = 5\nflash_command = \"./f.sh\"")
            .unwrap();
        let mut cfg = ServerConfig::default();

        // Act
        file.apply_to(&mut cfg);

        // Assert
        assert_eq!(cfg.poll_interval, Duration::from_millis(5));
        assert_eq!(cfg.discovery_interval, Duration::from_secs(1));
        assert_eq!(cfg.flash_command.as_deref(), Some("./f.sh"));
    }

    #[test]
    fn test_cli_flash_command_wins_over_file() {
        let file = FileConfig::from_toml_str("flash_command = \"from-file\"").unwrap();
        let mut cfg = ServerConfig {
            flash_command: Some("from-cli".into()),
            ..Default::default()
        };
        file.apply_to(&mut cfg);
        assert_eq!(cfg.flash_command.as_deref(), Some("from-cli"));
    }

    #[test]
    fn test_zero_intervals_are_raised() {
        let file = FileConfig {
            poll_interval_ms: 0,
            discovery_interval_ms: 0,
            session_queue_depth: 0,
            ..Default::default()
        };
        let mut cfg = ServerConfig::default();
        file.apply_to(&mut cfg);
        assert_eq!(cfg.poll_interval, Duration::from_millis(1));
        assert_eq!(cfg.discovery_interval, Duration::from_millis(1));
        assert_eq!(cfg.session_queue_depth, 1);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result = FileConfig::from_toml_str("poll_interval_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_returns_io_error() {
        let result = FileConfig::load(Path::new("/nonexistent/uart-server.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

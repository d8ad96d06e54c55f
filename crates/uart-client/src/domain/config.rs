//! Client configuration types.
//!
//! [`ClientConfig`] is built in `main.rs` from the CLI (server address, run
//! mode, line settings) and an optional TOML file holding the tunables that
//! have no CLI flag:
//!
//! ```toml
//! log_level = "info"
//! flash_deadline_secs = 10
//! buffer_window_bytes = 65536
//! poll_interval_ms = 10
//! enter_binary = "START_TELEMETRY"
//! leave_binary = "STOP_TELEMETRY"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use uart_core::domain::mode::{DEFAULT_ENTER_BINARY, DEFAULT_LEAVE_BINARY};
use uart_core::SentinelCommands;

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

/// What the client does once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    /// Read operator lines from stdin, print what the device sends.
    Interactive,
    /// Upload the archive at this path, wait for the verdict, exit.
    Flash(PathBuf),
    /// Expose the remote UART as a local pty symlinked at this path.
    Virtual(PathBuf),
}

/// Line settings applied to the virtual serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    /// Read timeout seen by programs using the virtual port.
    pub timeout: Duration,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout: Duration::from_secs(1),
        }
    }
}

/// All runtime configuration for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://host:port/`
    pub server_url: String,
    pub mode: ClientMode,
    pub line: LineSettings,
    /// Operator commands that switch between text and binary mode.
    pub sentinels: SentinelCommands,
    /// How long a flash request waits for its acknowledgment.
    pub flash_deadline: Duration,
    /// Bytes the frame extractor keeps while no frame completes.
    pub buffer_window: usize,
    /// Tick at which the virtual port is polled for outbound bytes.
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Creates a configuration with default tunables.
    pub fn new(host: &str, port: u16, mode: ClientMode) -> Self {
        Self {
            server_url: format!("ws://{host}:{port}/"),
            mode,
            line: LineSettings::default(),
            sentinels: SentinelCommands::default(),
            flash_deadline: Duration::from_secs(default_flash_deadline_secs()),
            buffer_window: default_buffer_window_bytes(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
        }
    }
}

/// Tunables read from the optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_flash_deadline_secs")]
    pub flash_deadline_secs: u64,
    #[serde(default = "default_buffer_window_bytes")]
    pub buffer_window_bytes: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_enter_binary")]
    pub enter_binary: String,
    #[serde(default = "default_leave_binary")]
    pub leave_binary: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_flash_deadline_secs() -> u64 {
    10
}
fn default_buffer_window_bytes() -> usize {
    uart_core::protocol::extractor::DEFAULT_WINDOW
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_enter_binary() -> String {
    DEFAULT_ENTER_BINARY.to_string()
}
fn default_leave_binary() -> String {
    DEFAULT_LEAVE_BINARY.to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            flash_deadline_secs: default_flash_deadline_secs(),
            buffer_window_bytes: default_buffer_window_bytes(),
            poll_interval_ms: default_poll_interval_ms(),
            enter_binary: default_enter_binary(),
            leave_binary: default_leave_binary(),
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

    /// Copies the tunables into `config`.
    pub fn apply_to(&self, config: &mut ClientConfig) {
        config.flash_deadline = Duration::from_secs(self.flash_deadline_secs);
        config.buffer_window = self.buffer_window_bytes;
        config.poll_interval = Duration::from_millis(self.poll_interval_ms.max(1));
        config.sentinels = SentinelCommands {
            enter_binary: self.enter_binary.clone(),
            leave_binary: self.leave_binary.clone(),
        };
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Domain layer for uart-client: configuration and the flash acknowledgment.
//!
//! Nothing in here performs I/O except [`FileConfig::load`], which reads the
//! optional tunables file.

pub mod config;

pub use config::{ClientConfig, ClientMode, ConfigError, FileConfig, LineSettings};

/// The server's single answer to a flash request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashAck {
    pub exit_code: i32,
    pub stdin: Vec<u8>,
    pub stdout: Vec<u8>,
}

//! Domain layer for uart-server.
//!
//! Holds plain configuration types with no I/O of their own.  The binary
//! fills them from CLI arguments and the optional TOML tunables file.

pub mod config;

pub use config::{ConfigError, FileConfig, SerialSettings, ServerConfig};

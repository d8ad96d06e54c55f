//! Infrastructure layer for uart-server.
//!
//! Everything that touches the operating system or the network lives here.
//!
//! # Responsibilities
//!
//! - Listing and opening real serial devices with `serialport` (`serial`)
//! - Running the configured flash command as a subprocess (`flash_command`)
//! - Binding the WebSocket listener, accepting sessions and running one
//!   task per session (`ws_server`)
//!
//! # What does NOT belong here?
//!
//! - Deciding when to rediscover the device (that is the application layer)
//! - Configuration parsing (that is done in `main.rs` and `domain::config`)

pub mod flash_command;
pub mod serial;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use flash_command::CommandFlashRunner;
pub use serial::{MockSerialBackend, SystemSerialBackend};
pub use ws_server::{bind, run_server, ServerError};

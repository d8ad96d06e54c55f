//! Infrastructure layer for uart-client.
//!
//! # Responsibilities
//!
//! - The WebSocket connection to the server and its driver task
//!   (`ws_session`)
//! - The pseudo-terminal and symlink behind the virtual serial port
//!   (`virtual_endpoint`, Unix only)
//!
//! # What does NOT belong here?
//!
//! - Deciding what to print or when to switch stream mode (that is the
//!   application layer)

#[cfg(unix)]
pub mod virtual_endpoint;
pub mod ws_session;

#[cfg(unix)]
pub use virtual_endpoint::{publish_symlink, VirtualEndpoint, VirtualEndpointError};
pub use ws_session::connect;

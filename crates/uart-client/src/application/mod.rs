//! Application layer for uart-client.
//!
//! # Responsibilities
//!
//! - The handle through which everything talks to the server connection
//!   (`session`)
//! - Showing inbound data as text or decoded telemetry frames (`router`)
//! - The interactive and virtual-port loops (`relay`)
//! - The flash request/ack exchange and its deadline (`flash`)
//!
//! # What does NOT belong here?
//!
//! - The WebSocket itself (see `infrastructure::ws_session`)
//! - Pseudo-terminals and symlinks (see `infrastructure::virtual_endpoint`)
//! - Reading stdin (done in `main.rs`)

pub mod flash;
pub mod relay;
pub mod router;
pub mod session;

pub use flash::{flash, load_archive, FlashError, FlashSuccess};
pub use relay::{run_interactive, run_virtual, LocalEndpoint};
pub use router::{Rendered, StreamRouter};
pub use session::{Outbound, SessionError, SessionEvent, SessionHandle, SessionState};

//! Application layer for uart-server.
//!
//! The application layer knows *what* the server does with a serial device
//! and a set of sessions, but delegates *how* bytes reach the hardware or
//! the network to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Discovering, opening, polling and recovering the serial device
//!   (`serial_lifecycle`), behind the [`SerialBackend`] / [`SerialLink`] seams
//! - Running the poll loop that fans every chunk out to all sessions (`relay`)
//! - The broadcast hub that sessions subscribe to (`fanout`)
//! - Flash jobs and the context shared by every session (`flash`, `context`)
//!
//! # What does NOT belong here?
//!
//! - Opening real serial ports (see `infrastructure::serial`)
//! - WebSocket framing and the accept loop (see `infrastructure::ws_server`)
//! - Spawning subprocesses (see `infrastructure::flash_command`)

pub mod context;
pub mod fanout;
pub mod flash;
pub mod relay;
pub mod serial_lifecycle;

pub use context::ServerContext;
pub use fanout::{SessionFeed, SessionHub};
pub use flash::{FlashReport, FlashRunner, NoFlashRunner, NO_FLASH_COMMAND_EXIT_CODE};
pub use relay::{SerialCommand, SerialControl, SerialRelay};
pub use serial_lifecycle::{ConnectionState, SerialBackend, SerialError, SerialLink, SerialManager};

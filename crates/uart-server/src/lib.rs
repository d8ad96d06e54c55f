//! uart-server library crate.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does uart-server do? (for beginners)
//!
//! The *server* runs on the machine that is physically wired to the UART
//! (for example a Raspberry Pi next to a development board).  It:
//!
//! 1. Scans for a serial device whose path starts with a configured prefix
//!    (e.g. `/dev/ttyUSB`) and opens the first one that works.
//! 2. Accepts WebSocket connections from any number of clients.
//! 3. Polls the device every few milliseconds and broadcasts every chunk it
//!    reads to all connected clients.
//! 4. Writes whatever a client sends to the device.
//! 5. Runs a flash command when a client uploads a build archive.
//!
//! When the device disappears (cable unplugged, board reset) the server
//! closes the handle and goes back to scanning; connected clients stay
//! connected and simply receive data again once the device is back.
//!
//! # Architecture
//!
//! ```text
//! [uart-server]
//!   ├── domain/           ServerConfig, SerialSettings, TOML tunables
//!   ├── application/      Serial lifecycle, relay loop, fan-out hub, flash jobs
//!   └── infrastructure/
//!         ├── serial/     serialport-backed device access (+ scripted mock)
//!         ├── flash_command/ Flash job that shells out to a configured command
//!         └── ws_server/  WebSocket accept loop and per-session tasks
//! ```

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: serial lifecycle, relay loop, fan-out, flash jobs.
pub mod application;

/// Infrastructure layer: serial devices, subprocesses, WebSocket server.
pub mod infrastructure;

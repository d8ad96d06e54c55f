//! uart-client library crate.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does uart-client do? (for beginners)
//!
//! The *client* runs on a developer's machine, anywhere on the network.  It
//! connects to a uart-server over WebSocket and works in one of three modes:
//!
//! 1. **Interactive** (default): every line typed on stdin is sent to the
//!    device; everything the device sends is printed.  Typing the
//!    `START_TELEMETRY` sentinel switches the display to decoded binary
//!    telemetry frames, `STOP_TELEMETRY` switches back to text.
//! 2. **Flash** (`--flash build.tar.gz`): uploads the archive, waits up to
//!    ten seconds for the server's verdict and exits with 0 or 1.
//! 3. **Virtual** (`--virtual /tmp/ttyREMOTE`): creates a pseudo-terminal
//!    and a symlink to it, so any local program (minicom, pyserial, a
//!    flashing tool) can open the remote UART like a local one.
//!
//! # Architecture
//!
//! ```text
//! [uart-client]
//!   ├── domain/           ClientConfig, ClientMode, TOML tunables, FlashAck
//!   ├── application/      Session handle, stream router, relay loops, flash RPC
//!   └── infrastructure/
//!         ├── ws_session/       WebSocket driver task
//!         └── virtual_endpoint/ pty pair + symlink
//! ```

/// Domain layer: configuration types and the flash acknowledgment.
pub mod domain;

/// Application layer: session handle, routing, relay loops, flash RPC.
pub mod application;

/// Infrastructure layer: WebSocket driver and virtual serial port.
pub mod infrastructure;

//! # uart-core
//!
//! Shared library for UART-Over-WiFi containing the telemetry frame
//! extractor, the wire envelope codec, and the stream-mode state machine.
//!
//! This crate is used by both the server and the client applications.
//! It has zero dependencies on OS APIs, serial devices, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! UART-Over-WiFi exposes a physical UART (a microcontroller's serial port)
//! to remote machines.  The *server* owns the physical device and broadcasts
//! everything it reads; *clients* print what they receive, decode binary
//! telemetry out of it, or re-expose it locally as a virtual serial port.
//!
//! This crate (`uart-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel.  The [`FrameExtractor`] pulls fixed
//!   68-byte telemetry frames out of an otherwise free-text byte stream, and
//!   [`WireEvent`] is the envelope carried by every WebSocket frame between
//!   server and client.
//!
//! - **`domain`** – Pure state with no I/O: the text/binary [`StreamMode`]
//!   switch driven by operator sentinel commands, and the [`DropCounter`]
//!   that makes the system's drop-on-full policy observable.

pub mod domain;
pub mod protocol;

pub use domain::drop_policy::{Delivery, DropCounter, DropOnFull};
pub use domain::mode::{ModeController, ModeTransition, SentinelCommands, StreamMode};
pub use protocol::extractor::{ExtractorStats, FrameExtractor};
pub use protocol::frame::{TelemetryFrame, FRAME_PAYLOAD_SIZE, FRAME_WIRE_SIZE, SYNCHRO_WORD};
pub use protocol::wire::{decode_event, encode_event, WireError, WireEvent};

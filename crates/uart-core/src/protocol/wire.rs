//! Named-event envelope carried by every WebSocket frame.
//!
//! The transport between server and client is a WebSocket connection.  The
//! handshake itself is the `connect` event and a close frame (or any socket
//! error) is the `disconnect` event.  Everything else travels as one binary
//! WebSocket frame holding a `bincode`-encoded [`WireEvent`]:
//!
//! ```text
//! Message  { payload }                              both directions
//! Flash    { request_id, archive }                  client → server
//! FlashAck { request_id, exit_code, stdin, stdout } server → client
//! ```
//!
//! `request_id` correlates an acknowledgment with the request that caused
//! it, so several flash requests can be in flight on one connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding a wire envelope.
#[derive(Debug, Error)]
pub enum WireError {
    /// The envelope could not be serialized.
    #[error("failed to encode wire event: {0}")]
    Encode(#[source] bincode::Error),

    /// The frame did not contain a valid envelope.
    #[error("failed to decode wire event: {0}")]
    Decode(#[source] bincode::Error),
}

/// One named event on the server ⇄ client channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireEvent {
    /// Raw UART bytes.  Server → client: bytes read from the device.
    /// Client → server: bytes to write to the device.
    Message {
        /// Opaque bytes, relayed unchanged.
        payload: Vec<u8>,
    },

    /// Request to flash a build archive onto the device behind the server.
    Flash {
        /// Correlation id echoed in the matching [`WireEvent::FlashAck`].
        request_id: u64,
        /// Archive bytes (typically a `.tar.gz` build output).
        archive: Vec<u8>,
    },

    /// Single acknowledgment for a [`WireEvent::Flash`] request.
    FlashAck {
        /// Id of the request being acknowledged.
        request_id: u64,
        /// Exit code of the flashing job; zero means success.
        exit_code: i32,
        /// Reserved; uart-server leaves it empty.
        stdin: Vec<u8>,
        /// Captured output of the flashing job.
        stdout: Vec<u8>,
    },
}

impl WireEvent {
    /// Short event name for log lines.  Never includes payload contents.
    pub fn name(&self) -> &'static str {
        match self {
            WireEvent::Message { .. } => "message",
            WireEvent::Flash { .. } => "flash",
            WireEvent::FlashAck { .. } => "flash_ack",
        }
    }
}

/// Encodes `event` into the bytes of one binary WebSocket frame.
///
/// # Errors
///
/// Returns [`WireError::Encode`] if serialization fails.
pub fn encode_event(event: &WireEvent) -> Result<Vec<u8>, WireError> {
    bincode::serialize(event).map_err(WireError::Encode)
}

/// Decodes one binary WebSocket frame into a [`WireEvent`].
///
/// # Errors
///
/// Returns [`WireError::Decode`] if the bytes are not a valid envelope.
pub fn decode_event(bytes: &[u8]) -> Result<WireEvent, WireError> {
    bincode::deserialize(bytes).map_err(WireError::Decode)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Fixed-schema binary telemetry frame.
//!
//! Wire format (all multi-byte fields little-endian):
//! ```text
//! [synchro:4 = EF BE AD DE][counter:u32][value_0:f32]...[value_15:f32]
//! ```
//! The payload following the synchro word is always 68 bytes.  There is no
//! length prefix and no checksum: frame boundaries are defined purely by
//! byte offset from the synchro word.

use std::fmt;

/// Marker preceding every telemetry frame: `0xDEADBEEF` in little-endian
/// byte order.
pub const SYNCHRO_WORD: [u8; 4] = [0xEF, 0xBE, 0xAD, 0xDE];

/// Number of `f32` channels carried by one frame.
pub const FRAME_VALUE_COUNT: usize = 16;

/// Size of the payload that follows the synchro word: 4 + 16 * 4 = 68 bytes.
pub const FRAME_PAYLOAD_SIZE: usize = 4 + FRAME_VALUE_COUNT * 4;

/// Size of a complete frame on the wire including its synchro word.
pub const FRAME_WIRE_SIZE: usize = SYNCHRO_WORD.len() + FRAME_PAYLOAD_SIZE;

/// One decoded telemetry record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    /// Leading unsigned 32-bit field, usually a sample counter.
    pub counter: u32,
    /// Sixteen 32-bit floating-point channels.
    pub values: [f32; FRAME_VALUE_COUNT],
}

impl TelemetryFrame {
    /// Decodes a frame from exactly one 68-byte payload.
    ///
    /// Decoding cannot fail: every bit pattern is a valid `u32` / `f32`.
    pub fn decode(payload: &[u8; FRAME_PAYLOAD_SIZE]) -> Self {
        let counter = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let mut values = [0f32; FRAME_VALUE_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            let off = 4 + i * 4;
            *value = f32::from_le_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
            ]);
        }
        Self { counter, values }
    }

    /// Encodes the frame payload (without synchro word).
    pub fn encode_payload(&self) -> [u8; FRAME_PAYLOAD_SIZE] {
        let mut out = [0u8; FRAME_PAYLOAD_SIZE];
        out[0..4].copy_from_slice(&self.counter.to_le_bytes());
        for (i, value) in self.values.iter().enumerate() {
            let off = 4 + i * 4;
            out[off..off + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Encodes the frame as it appears on the wire: synchro word + payload.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_WIRE_SIZE);
        buf.extend_from_slice(&SYNCHRO_WORD);
        buf.extend_from_slice(&self.encode_payload());
        buf
    }
}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.counter)?;
        for value in &self.values {
            write!(f, " {value:.4}")?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_size_is_68_bytes() {
        assert_eq!(FRAME_PAYLOAD_SIZE, 68);
        assert_eq!(FRAME_WIRE_SIZE, 72);
    }

    #[test]
    fn test_synchro_word_is_deadbeef_little_endian() {
        assert_eq!(u32::from_le_bytes(SYNCHRO_WORD), 0xDEAD_BEEF);
    }

    #[test]
    fn test_decode_reads_little_endian_fields() {
        // Arrange: counter = 1, value_0 = 1.0, value_15 = -2.5
        let mut payload = [0u8; FRAME_PAYLOAD_SIZE];
        payload[0..4].copy_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        payload[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        payload[64..68].copy_from_slice(&(-2.5f32).to_le_bytes());

        // Act
        let frame = TelemetryFrame::decode(&payload);

        // Assert
        assert_eq!(frame.counter, 1);
        assert_eq!(frame.values[0], 1.0);
        assert_eq!(frame.values[15], -2.5);
        assert!(frame.values[1..15].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_to_wire_bytes_starts_with_synchro_word() {
        let frame = TelemetryFrame {
            counter: 7,
            values: [0.5; FRAME_VALUE_COUNT],
        };
        let bytes = frame.to_wire_bytes();
        assert_eq!(bytes.len(), FRAME_WIRE_SIZE);
        assert_eq!(&bytes[..4], &SYNCHRO_WORD);
    }

    #[test]
    fn test_display_contains_counter_and_all_values() {
        let frame = TelemetryFrame {
            counter: 42,
            values: [1.0; FRAME_VALUE_COUNT],
        };
        let text = frame.to_string();
        assert!(text.starts_with("#42 "));
        assert_eq!(text.matches("1.0000").count(), FRAME_VALUE_COUNT);
    }
}

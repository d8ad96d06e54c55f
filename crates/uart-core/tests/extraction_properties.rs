//! Integration tests for the frame extractor through the public API.
//!
//! These tests exercise the stream shapes a real UART produces: log text
//! interleaved with telemetry, frames split at every possible byte offset,
//! and mode switches that flush residual bytes.

use uart_core::protocol::frame::FRAME_VALUE_COUNT;
use uart_core::{
    FrameExtractor, ModeController, SentinelCommands, StreamMode, TelemetryFrame, FRAME_WIRE_SIZE,
};

fn frame(counter: u32) -> TelemetryFrame {
    let mut values = [0f32; FRAME_VALUE_COUNT];
    for (i, v) in values.iter_mut().enumerate() {
        *v = (counter * 100 + i as u32) as f32 / 8.0;
    }
    TelemetryFrame { counter, values }
}

#[test]
fn test_frame_split_at_every_offset_is_recovered() {
    let expected = frame(77);
    let wire = expected.to_wire_bytes();

    for split in 0..=wire.len() {
        // Arrange
        let mut ex = FrameExtractor::new();

        // Act
        ex.append(&wire[..split]);
        let early = ex.try_extract();
        ex.append(&wire[split..]);
        let late = ex.try_extract();

        // Assert
        if split == wire.len() {
            assert_eq!(early, Some(expected), "split at {split}");
            assert_eq!(late, None, "split at {split}");
        } else {
            assert_eq!(early, None, "split at {split}");
            assert_eq!(late, Some(expected), "split at {split}");
        }
        assert!(ex.is_empty());
    }
}

#[test]
fn test_byte_by_byte_mixed_stream_yields_every_frame() {
    // Arrange: text, frame, text, frame, frame, trailing text
    let frames = [frame(1), frame(2), frame(3)];
    let mut stream = b"boot ok\r\n".to_vec();
    stream.extend_from_slice(&frames[0].to_wire_bytes());
    stream.extend_from_slice(b"sensor warm\r\n");
    stream.extend_from_slice(&frames[1].to_wire_bytes());
    stream.extend_from_slice(&frames[2].to_wire_bytes());
    stream.extend_from_slice(b"bye");

    // Act
    let mut ex = FrameExtractor::new();
    let mut got = Vec::new();
    for byte in &stream {
        got.extend(ex.push(std::slice::from_ref(byte)));
    }

    // Assert
    assert_eq!(got, frames);
    assert_eq!(ex.buffered(), b"bye");
    assert_eq!(ex.stats().frames_extracted, 3);
}

#[test]
fn test_trailing_bytes_after_frame_are_kept_exactly() {
    let mut ex = FrameExtractor::new();
    let mut chunk = frame(5).to_wire_bytes();
    chunk.extend_from_slice(&[0xEF, 0xBE]); // start of the next synchro word

    assert_eq!(ex.push(&chunk), vec![frame(5)]);
    assert_eq!(ex.buffered(), &[0xEF, 0xBE]);
}

#[test]
fn test_leaving_binary_mode_surfaces_residual_bytes() {
    // Arrange: binary mode with a half-received frame in the buffer
    let mut ctl = ModeController::new(SentinelCommands::default());
    ctl.observe_command("START_TELEMETRY");
    let mut ex = FrameExtractor::new();
    let wire = frame(8).to_wire_bytes();
    ex.append(&wire[..FRAME_WIRE_SIZE / 2]);

    // Act
    let transition = ctl.observe_command("STOP_TELEMETRY").unwrap();
    let residual = if transition.from == StreamMode::Binary {
        ex.flush()
    } else {
        Vec::new()
    };

    // Assert
    assert_eq!(residual, &wire[..FRAME_WIRE_SIZE / 2]);
    assert!(ex.is_empty());
    assert_eq!(ctl.mode(), StreamMode::Text);
}

#[test]
fn test_long_noise_stream_stays_within_window() {
    let mut ex = FrameExtractor::with_window(1024);
    for _ in 0..100 {
        ex.append(&[b'.'; 512]);
        assert_eq!(ex.try_extract(), None);
        assert!(ex.len() <= 1024);
    }
    // A frame arriving after the noise is still decoded.
    assert_eq!(ex.push(&frame(6).to_wire_bytes()), vec![frame(6)]);
}

//! Stateful extractor that pulls telemetry frames out of a free-text stream.
//!
//! # How it works (for beginners)
//!
//! The remote firmware interleaves human-readable log text with binary
//! telemetry records.  A record is announced by the 4-byte synchro word and
//! followed by a fixed 68-byte payload.  Serial and network layers deliver
//! this stream in arbitrary chunks, so a record may be split across many
//! chunks and one chunk may carry several records.
//!
//! The extractor therefore keeps a growing byte buffer:
//!
//! 1. [`FrameExtractor::append`] adds each inbound chunk at the tail.
//! 2. [`FrameExtractor::try_extract`] scans from the start for the first
//!    synchro word.  When a complete payload follows it, the frame is
//!    decoded and everything up to and including it is removed; bytes in
//!    front of the synchro word are noise (log text) and are discarded.
//! 3. The caller keeps calling `try_extract` until it returns `None`.
//!
//! Insufficient data is "not yet", never an error.
//!
//! # Bounded memory
//!
//! A stream that never contains a synchro word would otherwise grow the
//! buffer forever.  Whenever `try_extract` finds no complete frame and the
//! buffer is longer than the configured window, only the newest `window`
//! bytes are kept.  The window is never smaller than one synchro word plus
//! payload, so a frame that is still arriving is never cut.
//!
//! # Known hazard
//!
//! There is no checksum: payload bytes that happen to equal the synchro word
//! are indistinguishable from a real frame start.

use tracing::trace;

use crate::protocol::frame::{TelemetryFrame, FRAME_PAYLOAD_SIZE, FRAME_WIRE_SIZE, SYNCHRO_WORD};

/// Default sliding-window bound on buffered bytes (64 KiB).
pub const DEFAULT_WINDOW: usize = 64 * 1024;

/// Running counters describing what the extractor did with the bytes it saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    /// Frames decoded and returned to the caller.
    pub frames_extracted: u64,
    /// Bytes discarded because they preceded a synchro word.
    pub noise_discarded: u64,
    /// Bytes dropped by the sliding window.
    pub window_dropped: u64,
}

/// Stateful decoder pulling [`TelemetryFrame`]s out of an append-only buffer.
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
    window: usize,
    stats: ExtractorStats,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor {
    /// Creates an empty extractor with the [`DEFAULT_WINDOW`] bound.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Creates an empty extractor retaining at most `window` bytes when no
    /// frame can be extracted.
    ///
    /// Values smaller than one complete wire frame (72 bytes) are raised to
    /// that minimum.
    pub fn with_window(window: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_WIRE_SIZE * 4),
            window: window.max(FRAME_WIRE_SIZE),
            stats: ExtractorStats::default(),
        }
    }

    /// Appends `chunk` to the tail of the buffer.  Never drops bytes.
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Decodes the first complete frame in the buffer, if any.
    ///
    /// - No synchro word: returns `None`.
    /// - Synchro word with fewer than 68 bytes after it: returns `None` and
    ///   leaves the buffer as it was.
    /// - Complete frame: removes everything up to and including the frame
    ///   and returns it.
    ///
    /// Whenever `None` is returned and the buffer exceeds the window, the
    /// oldest bytes are dropped.
    pub fn try_extract(&mut self) -> Option<TelemetryFrame> {
        let Some(sync_pos) = find_synchro(&self.buffer) else {
            self.enforce_window();
            return None;
        };

        let payload_start = sync_pos + SYNCHRO_WORD.len();
        let payload_end = payload_start + FRAME_PAYLOAD_SIZE;
        if self.buffer.len() < payload_end {
            self.enforce_window();
            return None;
        }

        let mut payload = [0u8; FRAME_PAYLOAD_SIZE];
        payload.copy_from_slice(&self.buffer[payload_start..payload_end]);
        let frame = TelemetryFrame::decode(&payload);

        if sync_pos > 0 {
            trace!("discarding {sync_pos} noise bytes before synchro word");
        }
        self.stats.noise_discarded += sync_pos as u64;
        self.stats.frames_extracted += 1;
        self.buffer.drain(..payload_end);
        Some(frame)
    }

    /// Appends `chunk` and returns every frame that became complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<TelemetryFrame> {
        self.append(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract() {
            frames.push(frame);
        }
        frames
    }

    /// Removes and returns every buffered byte, leaving the extractor empty.
    ///
    /// Used when the session leaves binary mode so residual bytes can be
    /// surfaced as text instead of being lost.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Effective sliding-window size.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    fn enforce_window(&mut self) {
        if self.buffer.len() > self.window {
            let excess = self.buffer.len() - self.window;
            trace!("sliding window dropping {excess} bytes");
            self.buffer.drain(..excess);
            self.stats.window_dropped += excess as u64;
        }
    }
}

fn find_synchro(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNCHRO_WORD.len())
        .position(|candidate| candidate == SYNCHRO_WORD)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Inbound payload routing for the interactive console.
//!
//! In text mode every payload is shown as (lossy) UTF-8.  In binary mode
//! payloads go through the [`FrameExtractor`] and only decoded telemetry
//! frames are shown.  Operator sentinel lines switch between the two; when
//! leaving binary mode whatever the extractor still holds is shown as text
//! so nothing buffered is silently lost.

use std::fmt;

use tracing::info;

use uart_core::{
    FrameExtractor, ModeController, ModeTransition, SentinelCommands, StreamMode, TelemetryFrame,
};

/// One item to show the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    Frame(TelemetryFrame),
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Text(text) => write!(f, "[RECV] {text}"),
            Rendered::Frame(frame) => write!(f, "[FRAME] {frame}"),
        }
    }
}

fn as_text(bytes: &[u8]) -> Rendered {
    let text = String::from_utf8_lossy(bytes);
    Rendered::Text(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Mode state plus the extractor it drives.
#[derive(Debug)]
pub struct StreamRouter {
    mode: ModeController,
    extractor: FrameExtractor,
}

impl StreamRouter {
    /// Starts in text mode with an extractor bounded to `window` bytes.
    pub fn new(sentinels: SentinelCommands, window: usize) -> Self {
        Self {
            mode: ModeController::new(sentinels),
            extractor: FrameExtractor::with_window(window),
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode.mode()
    }

    pub fn extractor(&self) -> &FrameExtractor {
        &self.extractor
    }

    /// Inspects an operator line for a sentinel.
    ///
    /// Returns the transition, if any, and the residual extractor contents
    /// when the transition leaves binary mode.
    pub fn observe_command(&mut self, line: &str) -> Option<(ModeTransition, Option<Rendered>)> {
        let transition = self.mode.observe_command(line)?;
        info!("Stream mode: {} -> {}", transition.from, transition.to);

        let residual = match transition.to {
            StreamMode::Text => {
                let rest = self.extractor.flush();
                (!rest.is_empty()).then(|| as_text(&rest))
            }
            StreamMode::Binary => None,
        };
        Some((transition, residual))
    }

    /// Turns one inbound payload into zero or more items to show.
    pub fn route(&mut self, payload: &[u8]) -> Vec<Rendered> {
        if payload.is_empty() {
            return Vec::new();
        }
        match self.mode.mode() {
            StreamMode::Text => vec![as_text(payload)],
            StreamMode::Binary => self
                .extractor
                .push(payload)
                .into_iter()
                .map(Rendered::Frame)
                .collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Text / binary stream interpretation state.
//!
//! Inbound bytes are either printed as text or fed to the
//! [`FrameExtractor`](crate::FrameExtractor).  Which one is decided by a
//! session-wide [`StreamMode`] that only changes when the operator types one
//! of two sentinel commands.  The same sentinel line is also forwarded to the
//! device, which is what makes the firmware switch its output format.
//!
//! The switch is not aligned to frame boundaries: toggling while a frame is
//! in flight may corrupt that frame.  Callers flush the extractor when
//! leaving binary mode so buffered bytes are surfaced rather than lost.

use std::fmt;

/// Default command that switches the session into binary telemetry mode.
pub const DEFAULT_ENTER_BINARY: &str = "START_TELEMETRY";

/// Default command that switches the session back into text mode.
pub const DEFAULT_LEAVE_BINARY: &str = "STOP_TELEMETRY";

/// How inbound payloads are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Print inbound bytes as (lossy) UTF-8 text.
    #[default]
    Text,
    /// Feed inbound bytes to the frame extractor and print decoded frames.
    Binary,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Text => f.write_str("text"),
            StreamMode::Binary => f.write_str("binary"),
        }
    }
}

/// The two operator commands that drive mode transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelCommands {
    /// Line that switches to [`StreamMode::Binary`].
    pub enter_binary: String,
    /// Line that switches to [`StreamMode::Text`].
    pub leave_binary: String,
}

impl Default for SentinelCommands {
    fn default() -> Self {
        Self {
            enter_binary: DEFAULT_ENTER_BINARY.to_string(),
            leave_binary: DEFAULT_LEAVE_BINARY.to_string(),
        }
    }
}

/// A mode change that actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: StreamMode,
    pub to: StreamMode,
}

/// Finite-state holder of the session's [`StreamMode`].
#[derive(Debug, Clone)]
pub struct ModeController {
    mode: StreamMode,
    sentinels: SentinelCommands,
}

impl ModeController {
    /// Creates a controller starting in [`StreamMode::Text`].
    pub fn new(sentinels: SentinelCommands) -> Self {
        Self {
            mode: StreamMode::Text,
            sentinels,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Sentinel commands this controller reacts to.
    pub fn sentinels(&self) -> &SentinelCommands {
        &self.sentinels
    }

    /// Inspects one operator input line.
    ///
    /// Surrounding whitespace is ignored; the comparison is exact otherwise.
    /// Returns the transition when the line is a sentinel that changes the
    /// current mode, `None` for ordinary lines and for repeated sentinels.
    pub fn observe_command(&mut self, line: &str) -> Option<ModeTransition> {
        let line = line.trim();
        if line == self.sentinels.enter_binary {
            self.switch_to(StreamMode::Binary)
        } else if line == self.sentinels.leave_binary {
            self.switch_to(StreamMode::Text)
        } else {
            None
        }
    }

    /// Moves to `target`, returning the transition if the mode changed.
    pub fn switch_to(&mut self, target: StreamMode) -> Option<ModeTransition> {
        if self.mode == target {
            return None;
        }
        let transition = ModeTransition {
            from: self.mode,
            to: target,
        };
        self.mode = target;
        Some(transition)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_starts_in_text_mode() {
        let ctl = ModeController::new(SentinelCommands::default());
        assert_eq!(ctl.mode(), StreamMode::Text);
    }

    #[test]
    fn test_enter_sentinel_switches_to_binary() {
        // Arrange
        let mut ctl = ModeController::new(SentinelCommands::default());

        // Act
        let transition = ctl.observe_command("START_TELEMETRY\r\n");

        // Assert
        assert_eq!(
            transition,
            Some(ModeTransition {
                from: StreamMode::Text,
                to: StreamMode::Binary
            })
        );
        assert_eq!(ctl.mode(), StreamMode::Binary);
    }

    #[test]
    fn test_repeated_sentinel_is_a_no_op() {
        let mut ctl = ModeController::new(SentinelCommands::default());
        ctl.observe_command("START_TELEMETRY");
        assert_eq!(ctl.observe_command("START_TELEMETRY"), None);
        assert_eq!(ctl.mode(), StreamMode::Binary);
    }

    #[test]
    fn test_leave_sentinel_returns_to_text() {
        let mut ctl = ModeController::new(SentinelCommands::default());
        ctl.observe_command("START_TELEMETRY");
        let t = ctl.observe_command("STOP_TELEMETRY").unwrap();
        assert_eq!(t.from, StreamMode::Binary);
        assert_eq!(t.to, StreamMode::Text);
    }

    #[test]
    fn test_ordinary_lines_do_not_change_mode() {
        let mut ctl = ModeController::new(SentinelCommands::default());
        assert_eq!(ctl.observe_command("help"), None);
        assert_eq!(ctl.observe_command("start_telemetry"), None);
        assert_eq!(ctl.mode(), StreamMode::Text);
    }

    #[test]
    fn test_custom_sentinels_are_honoured() {
        let mut ctl = ModeController::new(SentinelCommands {
            enter_binary: "bin".into(),
            leave_binary: "txt".into(),
        });
        assert!(ctl.observe_command("START_TELEMETRY").is_none());
        assert!(ctl.observe_command("bin").is_some());
        assert_eq!(ctl.mode(), StreamMode::Binary);
    }

    #[test]
    fn test_mode_display_names() {
        assert_eq!(StreamMode::Text.to_string(), "text");
        assert_eq!(StreamMode::Binary.to_string(), "binary");
    }
}

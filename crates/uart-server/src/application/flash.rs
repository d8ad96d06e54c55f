//! Flash jobs.
//!
//! A client uploads a build archive in a `Flash` event and waits for exactly
//! one `FlashAck`.  What "flashing" means is deployment specific, so the
//! server delegates it to a [`FlashRunner`]; the production runner shells out
//! to an operator-configured command (see `infrastructure::flash_command`).

use async_trait::async_trait;
use tracing::warn;

use uart_core::WireEvent;

/// Exit code reported when the server has no flash command configured.
///
/// Same value a shell uses for "command not found".
pub const NO_FLASH_COMMAND_EXIT_CODE: i32 = 127;

/// Outcome of one flash job, as carried back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    pub exit_code: i32,
    pub stdin: Vec<u8>,
    pub stdout: Vec<u8>,
}

impl FlashReport {
    /// A report with an empty `stdin` field.
    pub fn new(exit_code: i32, stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdin: Vec::new(),
            stdout: stdout.into(),
        }
    }

    /// Whether the job succeeded.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Wraps the report in the acknowledgment for `request_id`.
    pub fn into_ack(self, request_id: u64) -> WireEvent {
        WireEvent::FlashAck {
            request_id,
            exit_code: self.exit_code,
            stdin: self.stdin,
            stdout: self.stdout,
        }
    }
}

/// Runs one flash job to completion.
///
/// Implementations never fail: every problem is folded into a nonzero
/// `exit_code` with a message in `stdout`, because the client only ever
/// sees the acknowledgment.
#[async_trait]
pub trait FlashRunner: Send + Sync {
    async fn run(&self, archive: Vec<u8>) -> FlashReport;
}

/// Runner used when no flash command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFlashRunner;

#[async_trait]
impl FlashRunner for NoFlashRunner {
    async fn run(&self, archive: Vec<u8>) -> FlashReport {
        warn!(
            "flash request ({} bytes) rejected: no flash command configured",
            archive.len()
        );
        FlashReport::new(
            NO_FLASH_COMMAND_EXIT_CODE,
            "no flash command configured on server (start it with --flash-command)\n",
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

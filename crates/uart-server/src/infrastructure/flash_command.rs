//! Flash runner that shells out to an operator-supplied command.
//!
//! For each job the archive is written to a uniquely named temporary file
//! and the command runs as
//!
//! ```text
//! sh -c '<command> "$1"' sh <archive path>
//! ```
//!
//! so the path is passed as a positional argument and never spliced into
//! the shell text.  The acknowledgment carries the command's exit code and
//! its stdout followed by its stderr.  The temporary file is removed once
//! the command has finished.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::flash::{FlashReport, FlashRunner};

/// Exit code reported when the archive or the shell could not be set up.
pub const FLASH_SETUP_FAILED_EXIT_CODE: i32 = 1;

/// Runs a shell command for every flash job.
#[derive(Debug, Clone)]
pub struct CommandFlashRunner {
    command: String,
    work_dir: PathBuf,
}

impl CommandFlashRunner {
    /// Creates a runner that stores archives in the system temp directory.
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_work_dir(command, std::env::temp_dir())
    }

    /// Creates a runner that stores archives in `work_dir`.
    pub fn with_work_dir(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl FlashRunner for CommandFlashRunner {
    async fn run(&self, archive: Vec<u8>) -> FlashReport {
        let path = self
            .work_dir
            .join(format!("uart-flash-{}.tar.gz", Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&path, &archive).await {
            warn!("failed to store flash archive at {}: {e}", path.display());
            return FlashReport::new(
                FLASH_SETUP_FAILED_EXIT_CODE,
                format!("server could not store archive: {e}\n"),
            );
        }
        info!("Running flash command: {} {}", self.command, path.display());

        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$1\"", self.command))
            .arg("sh")
            .arg(&path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!("could not remove {}: {e}", path.display());
        }

        match output {
            Ok(output) => {
                let mut text = output.stdout;
                text.extend_from_slice(&output.stderr);
                FlashReport::new(exit_code(&output.status), text)
            }
            Err(e) => {
                warn!("failed to spawn flash command: {e}");
                FlashReport::new(
                    FLASH_SETUP_FAILED_EXIT_CODE,
                    format!("server could not run flash command: {e}\n"),
                )
            }
        }
    }
}

/// Exit code as a shell would report it (128 + signal when killed).
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    FLASH_SETUP_FAILED_EXIT_CODE
}

// ── Tests ─────────────────────────────────────────────────────────────────────

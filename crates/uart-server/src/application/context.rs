//! State shared by every session.
//!
//! Instead of module-level globals, everything a session needs (the hub to
//! subscribe to, the handle to the serial poll loop, the flash runner) lives
//! in one [`ServerContext`] that the accept loop hands to each session task
//! behind an `Arc`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::fanout::SessionHub;
use crate::application::flash::{FlashReport, FlashRunner};
use crate::application::relay::SerialControl;

/// Everything a session task needs.
#[derive(Clone)]
pub struct ServerContext {
    pub hub: SessionHub,
    pub serial: SerialControl,
    pub flash_runner: Arc<dyn FlashRunner>,
}

impl ServerContext {
    pub fn new(
        hub: SessionHub,
        serial: SerialControl,
        flash_runner: Arc<dyn FlashRunner>,
    ) -> Self {
        Self {
            hub,
            serial,
            flash_runner,
        }
    }

    /// Runs one flash job with the serial device released.
    ///
    /// The poll loop closes the device before the job starts and reopens it
    /// once the last overlapping job has finished, so every flash tool owns
    /// the port for its whole run.
    pub async fn flash(&self, archive: Vec<u8>) -> FlashReport {
        info!("Flashing archive ({} bytes)", archive.len());
        let suspended = self.serial.suspend().await;
        if !suspended {
            warn!("serial relay not running; flashing without releasing the port");
        }

        let report = self.flash_runner.run(archive).await;
        info!("Flash finished with exit code {}", report.exit_code);

        if suspended {
            self.serial.resume().await;
        }
        report
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("hub", &self.hub)
            .field("sessions", &self.hub.session_count())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

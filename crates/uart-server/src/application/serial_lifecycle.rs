//! Serial device lifecycle: discovery, polling, recovery.
//!
//! # State machine
//!
//! ```text
//!               scan finds a device
//!  Disconnected ──► Discovering ──────────────► Connected
//!                      ▲                            │
//!                      └──── read / write error ────┘
//! ```
//!
//! The manager owns at most one open [`SerialLink`].  Every I/O error on
//! that link closes it and puts the manager back into `Discovering`; the
//! failed read or write is dropped, never retried on the same handle.
//!
//! Discovery never gives up: a scan that finds nothing usable is followed by
//! a fixed pause (`discovery_interval`) and a fresh scan, forever, with no
//! backoff growth.
//!
//! # Seams
//!
//! [`SerialBackend`] (list candidates, open one) and [`SerialLink`] (an open
//! handle) are traits so the lifecycle can be driven by the scripted
//! `MockSerialBackend` in tests and by `serialport` in production.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use uart_core::{DropCounter, DropOnFull};

use crate::domain::SerialSettings;

/// Upper bound on the bytes taken from the device in one poll.
pub const MAX_READ_CHUNK: usize = 64 * 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised by serial backends.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The candidate pattern could not be compiled into a matcher.
    #[error("invalid device pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// Listing candidate device paths failed.
    #[error("failed to list devices matching '{pattern}*': {source}")]
    Enumerate {
        pattern: String,
        #[source]
        source: io::Error,
    },

    /// A candidate path could not be opened.
    #[error("could not open port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// An open serial device handle.
pub trait SerialLink: Send {
    /// Path the link was opened from, for log lines.
    fn name(&self) -> &str;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Reads up to `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes the whole of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Finds and opens serial devices.
#[cfg_attr(test, mockall::automock)]
pub trait SerialBackend: Send {
    /// Returns every device path starting with `pattern`, sorted.
    fn enumerate(&self, pattern: &str) -> Result<Vec<String>, SerialError>;

    /// Opens `path` with the given line settings.
    fn open(&self, path: &str, settings: &SerialSettings)
        -> Result<Box<dyn SerialLink>, SerialError>;
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing open and no scan has started (or the manager was closed).
    Disconnected,
    /// Scanning for a device; the last scan found nothing usable.
    Discovering,
    /// A device is open.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Discovering => f.write_str("discovering"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// Owns the serial device handle and its [`ConnectionState`].
pub struct SerialManager {
    backend: Box<dyn SerialBackend>,
    settings: SerialSettings,
    discovery_interval: Duration,
    state: ConnectionState,
    link: Option<Box<dyn SerialLink>>,
    write_drops: DropOnFull,
    scans: u64,
}

impl SerialManager {
    /// Creates a manager in [`ConnectionState::Disconnected`].
    pub fn new(
        backend: Box<dyn SerialBackend>,
        settings: SerialSettings,
        discovery_interval: Duration,
    ) -> Self {
        Self {
            backend,
            settings,
            discovery_interval,
            state: ConnectionState::Disconnected,
            link: None,
            write_drops: DropOnFull::new("serial write"),
            scans: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Path of the open device, if any.
    pub fn device_name(&self) -> Option<&str> {
        self.link.as_deref().map(|link| link.name())
    }

    /// Number of discovery scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    /// Counters for writes dropped because no device was usable.
    pub fn write_drops(&self) -> Arc<DropCounter> {
        self.write_drops.counter()
    }

    pub fn discovery_interval(&self) -> Duration {
        self.discovery_interval
    }

    /// Runs one full discovery scan.
    ///
    /// Every candidate is tried in order; the first that opens becomes the
    /// live link.  Returns `true` when a device is open afterwards.  A link
    /// that is already open is kept and no scan happens.
    pub fn scan_once(&mut self) -> bool {
        if self.link.is_some() {
            return true;
        }
        self.state = ConnectionState::Discovering;
        self.scans += 1;

        let candidates = match self.backend.enumerate(&self.settings.pattern) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("{e}");
                return false;
            }
        };
        info!("Detected ports: {candidates:?}");

        for path in candidates {
            match self.backend.open(&path, &self.settings) {
                Ok(link) => {
                    info!(
                        "Connected to {path} at {} baud",
                        self.settings.baud_rate
                    );
                    self.link = Some(link);
                    self.state = ConnectionState::Connected;
                    return true;
                }
                Err(e) => warn!("{e}"),
            }
        }
        false
    }

    /// Scans until a device opens, sleeping `discovery_interval` between
    /// scans.  Never returns while no device can be opened.
    pub async fn discover(&mut self) {
        loop {
            if self.scan_once() {
                return;
            }
            debug!(
                "no usable device matching '{}*'; retrying in {:?}",
                self.settings.pattern, self.discovery_interval
            );
            tokio::time::sleep(self.discovery_interval).await;
        }
    }

    /// Takes whatever the device has buffered without blocking.
    ///
    /// Returns an empty vector when nothing is pending or no device is open.
    /// An I/O error closes the link and returns the manager to discovery.
    pub fn read_available(&mut self) -> Vec<u8> {
        let Some(link) = self.link.as_mut() else {
            return Vec::new();
        };

        let result = link.bytes_available().and_then(|pending| {
            if pending == 0 {
                return Ok(Vec::new());
            }
            let mut buf = vec![0u8; pending.min(MAX_READ_CHUNK)];
            let n = link.read(&mut buf)?;
            buf.truncate(n);
            Ok(buf)
        });

        match result {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Vec::new(),
            Err(e) => {
                self.fail("read", e);
                Vec::new()
            }
        }
    }

    /// Best-effort write of `data` to the device.
    ///
    /// With no device open the bytes are dropped and counted.  A write error
    /// drops the bytes, closes the link and returns the manager to discovery.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            debug!("no serial device open; dropping {} bytes", data.len());
            self.write_drops.drop_bytes(data.len());
            return;
        };

        if let Err(e) = link.write_all(data) {
            self.write_drops.drop_bytes(data.len());
            self.fail("write", e);
        }
    }

    /// Closes the device, if open, and moves to `Disconnected`.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            info!("Serial port closed: {}", link.name());
        }
        self.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, op: &str, error: io::Error) {
        if let Some(link) = self.link.take() {
            warn!(
                "serial {op} on {} failed: {error}; closing and rediscovering",
                link.name()
            );
        }
        self.state = ConnectionState::Discovering;
    }
}

impl fmt::Debug for SerialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialManager")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("device", &self.device_name())
            .field("scans", &self.scans)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

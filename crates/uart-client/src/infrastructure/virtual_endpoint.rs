//! Virtual serial port backed by a pseudo-terminal.
//!
//! [`VirtualEndpoint::open`] allocates a pty pair with `portable-pty`, puts
//! the controller side in non-blocking raw mode and publishes a symlink to
//! the subordinate device at a stable path.  Local programs open the symlink
//! as if it were the remote UART:
//!
//! ```text
//!  /tmp/ttyREMOTE ──symlink──► /dev/pts/7 (subordinate)
//!                                   ▲
//!                                   │ line discipline (raw)
//!                                   ▼
//!                             controller fd ◄──► VirtualEndpoint
//! ```
//!
//! Both sides of the pair are held for the process lifetime.  Keeping the
//! subordinate open means reads on the controller return `WouldBlock`
//! instead of `EIO` while no local program has the port open.
//!
//! The symlink is replaced on every start and left in place on exit.

use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use portable_pty::{native_pty_system, MasterPty, PtySize, SlavePty};
use thiserror::Error;
use tracing::{info, warn};

use uart_core::{Delivery, DropCounter, DropOnFull};

use crate::application::relay::LocalEndpoint;
use crate::domain::LineSettings;

/// Bytes read from the controller per `read` call.
const READ_CHUNK: usize = 4096;

/// Errors from creating the virtual serial port.
#[derive(Debug, Error)]
pub enum VirtualEndpointError {
    /// The pty pair could not be allocated.
    #[error("could not allocate pseudo-terminal: {0}")]
    Allocate(String),

    /// The subordinate device has no name to link to.
    #[error("pseudo-terminal has no device name")]
    NoDeviceName,

    /// Non-blocking mode or line settings could not be applied.
    #[error("could not configure pseudo-terminal: {0}")]
    Configure(#[source] io::Error),

    /// The symlink could not be (re)published.
    #[error("could not link {link} to {target}: {source}")]
    Symlink {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A pty pair standing in for the remote UART.
pub struct VirtualEndpoint {
    link: PathBuf,
    device: PathBuf,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    inbound: DropOnFull,
    _master: Box<dyn MasterPty + Send>,
    _slave: Box<dyn SlavePty + Send>,
}

impl fmt::Debug for VirtualEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualEndpoint")
            .field("link", &self.link)
            .field("device", &self.device)
            .field("dropped_bytes", &self.inbound.counter().dropped_bytes())
            .finish_non_exhaustive()
    }
}

impl VirtualEndpoint {
    /// Allocates the pty pair and publishes `link` pointing at it.
    ///
    /// # Errors
    ///
    /// See [`VirtualEndpointError`]; every variant is fatal for the client.
    pub fn open(link: &Path, line: &LineSettings) -> Result<Self, VirtualEndpointError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| VirtualEndpointError::Allocate(e.to_string()))?;

        let device = pair
            .master
            .tty_name()
            .ok_or(VirtualEndpointError::NoDeviceName)?;
        let fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| VirtualEndpointError::Allocate("controller has no descriptor".into()))?;
        configure_controller(fd, line).map_err(VirtualEndpointError::Configure)?;

        // Clones share the file description, so they inherit O_NONBLOCK.
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| VirtualEndpointError::Allocate(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| VirtualEndpointError::Allocate(e.to_string()))?;

        publish_symlink(&device, link).map_err(|source| VirtualEndpointError::Symlink {
            link: link.to_path_buf(),
            target: device.clone(),
            source,
        })?;
        info!("Virtual serial port {} -> {}", link.display(), device.display());

        Ok(Self {
            link: link.to_path_buf(),
            device,
            reader,
            writer,
            inbound: DropOnFull::new("virtual endpoint"),
            _master: pair.master,
            _slave: pair.slave,
        })
    }

    /// The published symlink.
    pub fn link(&self) -> &Path {
        &self.link
    }

    /// The subordinate device the symlink points at.
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Bytes dropped because the port's input queue was full.
    pub fn inbound_drops(&self) -> Arc<DropCounter> {
        self.inbound.counter()
    }
}

impl LocalEndpoint for VirtualEndpoint {
    fn deliver(&mut self, bytes: &[u8]) -> io::Result<Delivery> {
        if bytes.is_empty() {
            return Ok(Delivery::Delivered);
        }
        let result = self.writer.write(bytes);
        self.inbound.settle(result, bytes.len())
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

/// Points `link` at `target`, replacing whatever was at `link` before.
///
/// A dangling link left by an earlier run is replaced like any other file.
pub fn publish_symlink(target: &Path, link: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(link) {
        Ok(_) => std::fs::remove_file(link)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(target, link)
}

// ── Line settings ─────────────────────────────────────────────────────────────

/// Sets O_NONBLOCK and raw mode with the requested speed and read timeout.
fn configure_controller(fd: RawFd, line: &LineSettings) -> io::Result<()> {
    // SAFETY: `fd` is the live controller descriptor owned by the pty pair;
    // `tio` is fully initialised by tcgetattr before use.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        // No echo and no line editing: bytes pass through unchanged.
        libc::cfmakeraw(&mut tio);
        match baud_constant(line.baud_rate) {
            Some(speed) => {
                libc::cfsetispeed(&mut tio, speed);
                libc::cfsetospeed(&mut tio, speed);
            }
            None => warn!("unsupported baud rate {}; keeping the pty default", line.baud_rate),
        }
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = vtime(line.timeout);
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn baud_constant(rate: u32) -> Option<libc::speed_t> {
    let speed = match rate {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    };
    Some(speed)
}

/// Read timeout in the tenths of a second termios expects, capped at 25.5 s.
fn vtime(timeout: Duration) -> libc::cc_t {
    (timeout.as_millis() / 100).min(u128::from(u8::MAX)) as libc::cc_t
}

// ── Tests ─────────────────────────────────────────────────────────────────────

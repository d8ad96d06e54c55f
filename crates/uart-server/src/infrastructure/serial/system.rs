//! `serialport`-backed device access.
//!
//! Candidates are the entries of the pattern's parent directory whose path
//! matches the glob `<pattern>*` (so `/dev/ttyUSB` finds `/dev/ttyUSB0`,
//! `/dev/ttyUSB1`, ...).  Matching is done with `globset` so the pattern may
//! itself contain glob syntax, e.g. `/dev/tty{USB,ACM}`.
//!
//! A missing parent directory is treated as "no candidates", which keeps
//! discovery retrying instead of failing.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use tracing::trace;

use crate::application::serial_lifecycle::{SerialBackend, SerialError, SerialLink};
use crate::domain::SerialSettings;

/// Lists and opens real serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialBackend;

impl SystemSerialBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Directory to list for `pattern`, and whether candidates are bare names.
fn search_dir(pattern: &str) -> (PathBuf, bool) {
    if pattern.ends_with('/') {
        return (PathBuf::from(pattern), false);
    }
    match Path::new(pattern).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => (parent.to_path_buf(), false),
        _ => (PathBuf::from("."), true),
    }
}

impl SerialBackend for SystemSerialBackend {
    fn enumerate(&self, pattern: &str) -> Result<Vec<String>, SerialError> {
        let matcher = GlobBuilder::new(&format!("{pattern}*"))
            .literal_separator(true)
            .build()
            .map_err(|e| SerialError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let (dir, bare) = search_dir(pattern);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("{} does not exist; no candidates", dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(SerialError::Enumerate {
                    pattern: pattern.to_string(),
                    source,
                })
            }
        };

        let mut found: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| {
                if bare {
                    PathBuf::from(entry.file_name())
                } else {
                    entry.path()
                }
            })
            .filter(|path| matcher.is_match(path))
            .filter_map(|path| path.to_str().map(str::to_owned))
            .collect();
        found.sort();
        Ok(found)
    }

    fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialLink>, SerialError> {
        let port = serialport::new(path, settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| SerialError::Open {
                path: path.to_string(),
                source: io::Error::from(e),
            })?;

        Ok(Box::new(SystemSerialLink {
            name: path.to_string(),
            port,
        }))
    }
}

/// An open `serialport` handle.
struct SystemSerialLink {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SystemSerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

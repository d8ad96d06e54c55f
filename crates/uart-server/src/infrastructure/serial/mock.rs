//! Scripted serial backend for tests.
//!
//! # Why a scripted backend?
//!
//! Real serial devices cannot be plugged in and out from test code.  The
//! `MockSerialBackend` keeps a table of fake device paths in memory; tests
//! add and remove devices, queue bytes for the server to read, and inspect
//! what the server wrote, all while the server drives the backend through
//! the normal [`SerialBackend`] trait.
//!
//! Clones share the same state, so a test keeps one clone and hands another
//! to the `SerialManager`.
//!
//! # Usage in tests
//!
//! ```ignore
//! let backend = MockSerialBackend::new();
//! backend.add_device("/dev/ttyUSB0");
//! let mut mgr = SerialManager::new(Box::new(backend.clone()), settings, interval);
//! mgr.scan_once();
//!
//! backend.push_rx("/dev/ttyUSB0", b"hello");
//! assert_eq!(mgr.read_available(), b"hello");
//!
//! backend.remove_device("/dev/ttyUSB0"); // next read fails, mgr rediscovers
//! ```

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::serial_lifecycle::{SerialBackend, SerialError, SerialLink};
use crate::domain::SerialSettings;

#[derive(Debug, Default)]
struct MockDevice {
    /// Bumped every time the path is (re-)added; stale links see a mismatch.
    generation: u64,
    rx: VecDeque<u8>,
    written: Vec<u8>,
    broken: bool,
}

#[derive(Debug, Default)]
struct MockState {
    devices: BTreeMap<String, MockDevice>,
    open_failures: HashSet<String>,
    open_attempts: Vec<String>,
    scans: u64,
    open_links: usize,
    next_generation: u64,
}

/// In-memory [`SerialBackend`] whose devices are scripted by the test.
#[derive(Debug, Clone, Default)]
pub struct MockSerialBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialBackend {
    /// Creates a backend with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plugs in a device at `path`, replacing any previous one.
    pub fn add_device(&self, path: &str) {
        let mut state = self.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.devices.insert(
            path.to_string(),
            MockDevice {
                generation,
                ..Default::default()
            },
        );
    }

    /// Unplugs the device at `path`; links to it fail from now on.
    pub fn remove_device(&self, path: &str) {
        self.lock().devices.remove(path);
    }

    /// Makes `open(path)` fail (`true`) or succeed again (`false`).
    pub fn set_open_failure(&self, path: &str, fail: bool) {
        let mut state = self.lock();
        if fail {
            state.open_failures.insert(path.to_string());
        } else {
            state.open_failures.remove(path);
        }
    }

    /// Queues bytes for the server to read from `path`.
    pub fn push_rx(&self, path: &str, bytes: &[u8]) {
        if let Some(device) = self.lock().devices.get_mut(path) {
            device.rx.extend(bytes);
        }
    }

    /// Everything written to the current device at `path`.
    pub fn written(&self, path: &str) -> Vec<u8> {
        self.lock()
            .devices
            .get(path)
            .map(|d| d.written.clone())
            .unwrap_or_default()
    }

    /// Makes every read and write on `path` fail until it is re-added.
    pub fn fail_io(&self, path: &str) {
        if let Some(device) = self.lock().devices.get_mut(path) {
            device.broken = true;
        }
    }

    /// Number of `enumerate` calls so far.
    pub fn scan_count(&self) -> u64 {
        self.lock().scans
    }

    /// Every path passed to `open`, in order.
    pub fn open_attempts(&self) -> Vec<String> {
        self.lock().open_attempts.clone()
    }

    /// Number of links currently alive.
    pub fn open_links(&self) -> usize {
        self.lock().open_links
    }
}

impl SerialBackend for MockSerialBackend {
    fn enumerate(&self, pattern: &str) -> Result<Vec<String>, SerialError> {
        let mut state = self.lock();
        state.scans += 1;
        // BTreeMap keys are already sorted.
        Ok(state
            .devices
            .keys()
            .filter(|path| path.starts_with(pattern))
            .cloned()
            .collect())
    }

    fn open(
        &self,
        path: &str,
        _settings: &SerialSettings,
    ) -> Result<Box<dyn SerialLink>, SerialError> {
        let mut state = self.lock();
        state.open_attempts.push(path.to_string());

        let refused = state.open_failures.contains(path);
        let generation = match state.devices.get(path) {
            Some(device) if !refused => device.generation,
            _ => {
                return Err(SerialError::Open {
                    path: path.to_string(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "scripted failure"),
                })
            }
        };
        state.open_links += 1;

        Ok(Box::new(MockLink {
            state: Arc::clone(&self.state),
            path: path.to_string(),
            generation,
        }))
    }
}

/// Handle returned by [`MockSerialBackend::open`].
#[derive(Debug)]
struct MockLink {
    state: Arc<Mutex<MockState>>,
    path: String,
    generation: u64,
}

impl MockLink {
    fn with_device<T>(&self, f: impl FnOnce(&mut MockDevice) -> T) -> io::Result<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.devices.get_mut(&self.path) {
            Some(device) if device.generation == self.generation && !device.broken => {
                Ok(f(device))
            }
            _ => Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged")),
        }
    }
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.path
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.with_device(|d| d.rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_device(|d| {
            let n = buf.len().min(d.rx.len());
            for (slot, byte) in buf.iter_mut().zip(d.rx.drain(..n)) {
                *slot = byte;
            }
            n
        })
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.with_device(|d| d.written.extend_from_slice(data))
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open_links = state.open_links.saturating_sub(1);
    }
}

//! Drop-on-full delivery policy.
//!
//! The bridge has no flow control.  Wherever a write would block the single
//! scheduling thread (virtual endpoint writes, slow WebSocket sessions, serial
//! writes with no open device), the bytes are dropped instead of queued.
//! [`DropOnFull`] makes that an explicit, named policy and counts what it
//! throws away so the loss is observable.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

/// Outcome of one delivery attempt under [`DropOnFull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// All bytes were accepted by the sink.
    Delivered,
    /// Some or all bytes were dropped; the count is in the [`DropCounter`].
    Dropped,
}

/// Lock-free counters of dropped data.
#[derive(Debug, Default)]
pub struct DropCounter {
    bytes: AtomicU64,
    events: AtomicU64,
}

impl DropCounter {
    /// Records one drop of `bytes` bytes.  Returns `true` for the first drop.
    pub fn record(&self, bytes: usize) -> bool {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.events.fetch_add(1, Ordering::Relaxed) == 0
    }

    /// Total bytes dropped.
    pub fn dropped_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Number of drop events.
    pub fn drop_events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }
}

/// Named policy: never block, never queue, count what is dropped.
#[derive(Debug, Clone)]
pub struct DropOnFull {
    label: &'static str,
    counter: Arc<DropCounter>,
}

impl DropOnFull {
    /// Creates a policy whose log lines are tagged with `label`.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            counter: Arc::new(DropCounter::default()),
        }
    }

    /// Shared handle to this policy's counters.
    pub fn counter(&self) -> Arc<DropCounter> {
        Arc::clone(&self.counter)
    }

    /// Records `bytes` dropped bytes.
    ///
    /// The first drop is logged at `warn`, later ones at `debug`.
    pub fn drop_bytes(&self, bytes: usize) {
        if self.counter.record(bytes) {
            warn!("{}: sink full, dropping data (further drops logged at debug)", self.label);
        } else {
            debug!(
                "{}: dropped {bytes} bytes ({} total)",
                self.label,
                self.counter.dropped_bytes()
            );
        }
    }

    /// Classifies the result of a non-blocking write of `len` bytes.
    ///
    /// - `Ok(n)` with `n == len` → [`Delivery::Delivered`].
    /// - `Ok(n)` with `n < len` → the unwritten tail is dropped.
    /// - `Err(WouldBlock)` → all `len` bytes are dropped.
    ///
    /// # Errors
    ///
    /// Any other I/O error is returned unchanged; it is not a backpressure
    /// condition.
    pub fn settle(&self, result: io::Result<usize>, len: usize) -> io::Result<Delivery> {
        match result {
            Ok(n) if n >= len => Ok(Delivery::Delivered),
            Ok(n) => {
                self.drop_bytes(len - n);
                Ok(Delivery::Dropped)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.drop_bytes(len);
                Ok(Delivery::Dropped)
            }
            Err(e) => Err(e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

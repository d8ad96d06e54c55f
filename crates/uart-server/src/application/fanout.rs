//! Broadcast hub between the serial poll loop and the sessions.
//!
//! Every chunk read from the device is published once and delivered,
//! byte-identical, to every session subscribed at that moment.  The hub is
//! a thin wrapper around `tokio::sync::broadcast`: publishing never blocks,
//! and a session that falls more than `capacity` chunks behind loses the
//! oldest ones instead of holding up the poll loop.  Those losses are
//! counted per hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

/// Publishes serial chunks to every connected session.
#[derive(Debug, Clone)]
pub struct SessionHub {
    tx: broadcast::Sender<Vec<u8>>,
    lagged: Arc<AtomicU64>,
}

impl SessionHub {
    /// Creates a hub that buffers up to `capacity` chunks per session.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            lagged: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a new session.  Only chunks published after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> SessionFeed {
        SessionFeed {
            rx: self.tx.subscribe(),
            lagged: Arc::clone(&self.lagged),
        }
    }

    /// Publishes `chunk` and returns how many sessions it was queued for.
    ///
    /// Zero sessions is not an error: the chunk is simply discarded.
    pub fn broadcast(&self, chunk: Vec<u8>) -> usize {
        trace!("broadcasting {} bytes", chunk.len());
        self.tx.send(chunk).unwrap_or(0)
    }

    /// Number of sessions currently subscribed.
    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Chunks lost by slow sessions since the hub was created.
    pub fn lagged_chunks(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }
}

/// One session's view of the hub.
#[derive(Debug)]
pub struct SessionFeed {
    rx: broadcast::Receiver<Vec<u8>>,
    lagged: Arc<AtomicU64>,
}

impl SessionFeed {
    /// Waits for the next chunk.  Returns `None` once the hub is gone.
    ///
    /// If this session fell behind, the skipped chunks are counted and the
    /// oldest chunk still buffered is returned.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.rx.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(RecvError::Lagged(skipped)) => {
                    self.lagged.fetch_add(skipped, Ordering::Relaxed);
                    warn!("session too slow; dropped {skipped} serial chunks");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

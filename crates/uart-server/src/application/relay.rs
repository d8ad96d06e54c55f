//! Serial poll loop.
//!
//! [`SerialRelay`] is the single task that touches the serial device.  On
//! every poll tick it either drains the open device into the [`SessionHub`]
//! or, while no device is open, runs a discovery scan once the discovery
//! interval has elapsed since the last failed one.  Between ticks it handles
//! [`SerialCommand`]s sent by sessions through a [`SerialControl`].
//!
//! Because commands are handled while discovering, a write that arrives
//! with no device open is dropped (and counted) immediately instead of
//! waiting for the device to come back.
//!
//! ```text
//!   sessions ──SerialControl──► [ command queue ] ──► SerialRelay ──► SerialManager
//!                                                         │
//!                                                         └──► SessionHub ──► sessions
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use uart_core::{Delivery, DropCounter, DropOnFull};

use crate::application::fanout::SessionHub;
use crate::application::serial_lifecycle::{ConnectionState, SerialManager};

/// Commands buffered between sessions and the poll loop.
pub const COMMAND_QUEUE_DEPTH: usize = 256;

/// Requests handled by the poll loop.
#[derive(Debug)]
pub enum SerialCommand {
    /// Write these bytes to the device (best-effort).
    Write(Vec<u8>),
    /// Close the device and stop polling until the matching
    /// [`SerialCommand::Resume`].  Suspensions nest: the device is reopened
    /// only once every `Suspend` has been resumed.  The sender is notified
    /// once the device is closed.
    Suspend(oneshot::Sender<()>),
    /// Undo one `Suspend`; the last one rediscovers immediately.
    Resume,
}

/// Cloneable handle used by sessions to reach the poll loop.
#[derive(Debug, Clone)]
pub struct SerialControl {
    tx: mpsc::Sender<SerialCommand>,
    queue_drops: DropOnFull,
}

impl SerialControl {
    /// Queues `data` for the device without waiting.
    ///
    /// A full queue or a stopped relay drops the bytes and counts them.
    pub fn write(&self, data: Vec<u8>) -> Delivery {
        let len = data.len();
        match self.tx.try_send(SerialCommand::Write(data)) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                self.queue_drops.drop_bytes(len);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!("serial relay stopped; dropping {len} bytes");
                self.queue_drops.drop_bytes(len);
                Delivery::Dropped
            }
        }
    }

    /// Asks the poll loop to release the device and waits until it has.
    ///
    /// Returns `false` if the poll loop is no longer running.
    pub async fn suspend(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SerialCommand::Suspend(done_tx)).await.is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }

    /// Lets the poll loop reopen the device.
    pub async fn resume(&self) {
        if self.tx.send(SerialCommand::Resume).await.is_err() {
            debug!("serial relay stopped; resume ignored");
        }
    }

    /// Bytes dropped because the command queue was full or closed.
    pub fn queue_drops(&self) -> Arc<DropCounter> {
        self.queue_drops.counter()
    }
}

/// The task that owns the [`SerialManager`].
#[derive(Debug)]
pub struct SerialRelay {
    manager: SerialManager,
    hub: SessionHub,
    commands: mpsc::Receiver<SerialCommand>,
    poll_interval: Duration,
    /// Outstanding suspensions; polling resumes at zero.
    suspend_depth: usize,
}

impl SerialRelay {
    /// Creates the relay and the control handle that feeds it.
    pub fn new(
        manager: SerialManager,
        hub: SessionHub,
        poll_interval: Duration,
    ) -> (Self, SerialControl) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let relay = Self {
            manager,
            hub,
            commands,
            poll_interval,
            suspend_depth: 0,
        };
        let control = SerialControl {
            tx,
            queue_drops: DropOnFull::new("serial queue"),
        };
        (relay, control)
    }

    /// Polls until `running` is cleared or every [`SerialControl`] is dropped.
    ///
    /// The device is closed before returning; the manager is handed back so
    /// callers can inspect its counters.
    pub async fn run(mut self, running: Arc<AtomicBool>) -> SerialManager {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let discovery_interval = self.manager.discovery_interval();
        let mut next_scan = Instant::now();

        while running.load(Ordering::Relaxed) {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command, &mut next_scan),
                    None => {
                        debug!("all serial controls dropped; stopping relay");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.suspend_depth > 0 {
                        continue;
                    }
                    if self.manager.state() == ConnectionState::Connected {
                        let chunk = self.manager.read_available();
                        if !chunk.is_empty() {
                            debug!("[RECV] {} bytes", chunk.len());
                            self.hub.broadcast(chunk);
                        }
                    } else if Instant::now() >= next_scan && !self.manager.scan_once() {
                        next_scan = Instant::now() + discovery_interval;
                    }
                }
            }
        }

        self.manager.close();
        self.manager
    }

    fn handle(&mut self, command: SerialCommand, next_scan: &mut Instant) {
        match command {
            SerialCommand::Write(data) => {
                debug!("[SEND] {} bytes", data.len());
                self.manager.write(&data);
            }
            SerialCommand::Suspend(done) => {
                if self.suspend_depth == 0 {
                    info!("Releasing serial port for flashing");
                    self.manager.close();
                }
                self.suspend_depth += 1;
                let _ = done.send(());
            }
            SerialCommand::Resume => match self.suspend_depth {
                0 => debug!("resume without suspend ignored"),
                1 => {
                    info!("Flash finished; rediscovering serial port");
                    self.suspend_depth = 0;
                    *next_scan = Instant::now();
                }
                _ => {
                    self.suspend_depth -= 1;
                    debug!("{} flash job(s) still hold the serial port", self.suspend_depth);
                }
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

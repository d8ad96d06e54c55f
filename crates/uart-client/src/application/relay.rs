//! Client relay loops.
//!
//! Two long-running loops glue the session to the local side:
//!
//! - [`run_interactive`]: operator lines from stdin go to the server (with
//!   `\r\n` appended, echoed as `[SEND] ...`) and may switch the stream
//!   mode; inbound payloads are shown through the [`StreamRouter`].
//! - [`run_virtual`]: inbound payloads are written to a [`LocalEndpoint`]
//!   (the pty behind the virtual serial port); bytes local programs write to
//!   it are polled on a fixed tick and sent to the server.
//!
//! Both loops end when the session reports `Disconnected`; the client has a
//! single connection lifetime and does not reconnect.

use std::io::{self, Write};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use uart_core::Delivery;

use crate::application::router::StreamRouter;
use crate::application::session::{SessionEvent, SessionHandle};

/// A local byte sink/source standing in for the remote UART.
pub trait LocalEndpoint {
    /// Writes `bytes` without blocking; what does not fit is dropped.
    fn deliver(&mut self, bytes: &[u8]) -> io::Result<Delivery>;

    /// Takes whatever local programs wrote, without blocking.
    fn read_available(&mut self) -> io::Result<Vec<u8>>;
}

/// Runs the interactive console until the session ends.
///
/// `lines` yields operator input lines (without line terminator); when it
/// closes (stdin EOF) the loop keeps showing inbound data.
pub async fn run_interactive<W: Write>(
    session: &SessionHandle,
    events: &mut mpsc::Receiver<SessionEvent>,
    lines: &mut mpsc::Receiver<String>,
    router: &mut StreamRouter,
    out: &mut W,
) -> io::Result<()> {
    let mut stdin_open = true;

    loop {
        // Operator input first so a sentinel switches mode before the
        // payloads queued behind it are routed.
        tokio::select! {
            biased;

            line = lines.recv(), if stdin_open => match line {
                Some(line) => {
                    if let Some((_, Some(residual))) = router.observe_command(&line) {
                        writeln!(out, "{residual}")?;
                    }
                    match session.send(format!("{line}\r\n").into_bytes()) {
                        Ok(()) => writeln!(out, "[SEND] {line}")?,
                        Err(e) => warn!("Could not send message: {e}"),
                    }
                }
                None => {
                    debug!("stdin closed; still receiving");
                    stdin_open = false;
                }
            },

            event = events.recv() => match event {
                Some(SessionEvent::Connected) => writeln!(out, "Connected to server.")?,
                Some(SessionEvent::Message(payload)) => {
                    for item in router.route(&payload) {
                        writeln!(out, "{item}")?;
                    }
                }
                Some(SessionEvent::Disconnected) | None => {
                    writeln!(out, "Disconnected from server.")?;
                    return Ok(());
                }
            },
        }
        out.flush()?;
    }
}

/// Runs the virtual serial port bridge until the session ends.
///
/// # Errors
///
/// Returns the endpoint's I/O error if it fails for a reason other than
/// backpressure; the caller treats that as fatal.
pub async fn run_virtual<E: LocalEndpoint>(
    session: &SessionHandle,
    events: &mut mpsc::Receiver<SessionEvent>,
    endpoint: &mut E,
    poll_interval: Duration,
) -> io::Result<()> {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Connected) => debug!("virtual bridge connected"),
                Some(SessionEvent::Message(payload)) => {
                    if endpoint.deliver(&payload)? == Delivery::Dropped {
                        debug!("virtual port full; inbound bytes dropped");
                    }
                }
                Some(SessionEvent::Disconnected) | None => return Ok(()),
            },

            _ = ticker.tick() => {
                let local = endpoint.read_available()?;
                if !local.is_empty() {
                    if let Err(e) = session.send(local) {
                        warn!("Could not send message: {e}");
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::watch;

    use super::*;
    use crate::application::session::{Outbound, SessionState};
    use uart_core::{SentinelCommands, TelemetryFrame};

    fn connected_session() -> (SessionHandle, mpsc::Receiver<Outbound>, watch::Sender<SessionState>) {
        let (tx, rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(SessionState::Connected);
        (SessionHandle::from_parts(tx, state_rx), rx, state_tx)
    }

    fn sent(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Ok(Outbound::Send(payload)) = rx.try_recv() {
            out.push(payload);
        }
        out
    }

    #[tokio::test]
    async fn test_interactive_echoes_and_sends_with_crlf() {
        // Arrange
        let (session, mut outbound, _state) = connected_session();
        let (event_tx, mut events) = mpsc::channel(8);
        let (line_tx, mut lines) = mpsc::channel(8);
        let mut router = StreamRouter::new(SentinelCommands::default(), 4096);
        let mut out = Vec::new();

        line_tx.send("help".to_string()).await.unwrap();
        drop(line_tx);
        event_tx
            .send(SessionEvent::Message(b"usage: ...\r\n".to_vec()))
            .await
            .unwrap();
        event_tx.send(SessionEvent::Disconnected).await.unwrap();

        // Act
        run_interactive(&session, &mut events, &mut lines, &mut router, &mut out)
            .await
            .unwrap();

        // Assert
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("[SEND] help\n"));
        assert!(printed.contains("[RECV] usage: ...\n"));
        assert!(printed.ends_with("Disconnected from server.\n"));
        assert_eq!(sent(&mut outbound), vec![b"help\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_sentinel_is_forwarded_and_switches_to_frames() {
        // Arrange
        let (session, mut outbound, _state) = connected_session();
        let (event_tx, mut events) = mpsc::channel(8);
        let (line_tx, mut lines) = mpsc::channel(8);
        let mut router = StreamRouter::new(SentinelCommands::default(), 4096);
        let mut out = Vec::new();
        let frame = TelemetryFrame {
            counter: 3,
            values: [0.5; 16],
        };

        line_tx.send("START_TELEMETRY".to_string()).await.unwrap();

        // Act: run until the sentinel line has been processed, then feed a frame
        let driver = async {
            tokio::task::yield_now().await;
            event_tx
                .send(SessionEvent::Message(frame.to_wire_bytes()))
                .await
                .unwrap();
            event_tx.send(SessionEvent::Disconnected).await.unwrap();
        };
        let relay = run_interactive(&session, &mut events, &mut lines, &mut router, &mut out);
        let (result, ()) = tokio::join!(relay, driver);
        result.unwrap();

        // Assert
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("[FRAME] #3 0.5000"));
        assert!(!printed.contains("[RECV]"));
        assert_eq!(sent(&mut outbound), vec![b"START_TELEMETRY\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_fatal() {
        let (session, _outbound, state) = connected_session();
        state.send(SessionState::Closing).unwrap();
        let (event_tx, mut events) = mpsc::channel(8);
        let (line_tx, mut lines) = mpsc::channel(8);
        let mut router = StreamRouter::new(SentinelCommands::default(), 4096);
        let mut out = Vec::new();

        line_tx.send("lost".to_string()).await.unwrap();
        drop(line_tx);
        event_tx.send(SessionEvent::Disconnected).await.unwrap();

        run_interactive(&session, &mut events, &mut lines, &mut router, &mut out)
            .await
            .unwrap();

        assert!(!String::from_utf8(out).unwrap().contains("[SEND] lost"));
    }

    /// In-memory endpoint with a bounded inbound buffer.
    struct FakeEndpoint {
        capacity: usize,
        delivered: Vec<u8>,
        dropped: usize,
        local: VecDeque<Vec<u8>>,
    }

    impl LocalEndpoint for FakeEndpoint {
        fn deliver(&mut self, bytes: &[u8]) -> io::Result<Delivery> {
            let room = self.capacity - self.delivered.len();
            let n = room.min(bytes.len());
            self.delivered.extend_from_slice(&bytes[..n]);
            self.dropped += bytes.len() - n;
            Ok(if n == bytes.len() {
                Delivery::Delivered
            } else {
                Delivery::Dropped
            })
        }

        fn read_available(&mut self) -> io::Result<Vec<u8>> {
            Ok(self.local.pop_front().unwrap_or_default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_bridges_both_directions() {
        // Arrange
        let (session, mut outbound, _state) = connected_session();
        let (event_tx, mut events) = mpsc::channel(8);
        let mut endpoint = FakeEndpoint {
            capacity: 4,
            delivered: Vec::new(),
            dropped: 0,
            local: VecDeque::from(vec![b"AT\r".to_vec()]),
        };

        // Act
        let driver = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            event_tx
                .send(SessionEvent::Message(b"OK\r\nextra".to_vec()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            event_tx.send(SessionEvent::Disconnected).await.unwrap();
        };
        let relay = run_virtual(&session, &mut events, &mut endpoint, Duration::from_millis(10));
        let (result, ()) = tokio::join!(relay, driver);
        result.unwrap();

        // Assert
        assert_eq!(endpoint.delivered, b"OK\r\n");
        assert_eq!(endpoint.dropped, 5);
        assert_eq!(sent(&mut outbound), vec![b"AT\r".to_vec()]);
    }
}

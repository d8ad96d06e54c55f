//! Session handle: the application's view of the server connection.
//!
//! The WebSocket itself is owned by a single driver task (see
//! `infrastructure::ws_session`).  Everything else talks to that task through
//! a cloneable [`SessionHandle`] and receives [`SessionEvent`]s from it.
//!
//! ```text
//!  SessionHandle ──Outbound──► driver task ──► WebSocket
//!  relay loop   ◄─SessionEvent─ driver task ◄── WebSocket
//! ```
//!
//! # State machine
//!
//! `Disconnected → Connecting → Connected → Closing → Disconnected`.
//! `SessionEvent::Disconnected` is emitted exactly once per connection,
//! whatever ended it (close frame, EOF, socket error, local close).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};

use crate::domain::FlashAck;

/// Errors from the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The WebSocket handshake with the server failed.
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The session is not (or no longer) connected.
    #[error("not connected to server")]
    NotConnected,

    /// The outbound queue is full; the message was dropped.
    #[error("outbound queue full; dropped {0} bytes")]
    QueueFull(usize),
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake completed.
    Connected,
    /// A `message` event arrived from the server.
    Message(Vec<u8>),
    /// The connection is gone.
    Disconnected,
}

/// Requests from handles to the driver task.
#[derive(Debug)]
pub enum Outbound {
    /// Send a `message` event.
    Send(Vec<u8>),
    /// Send a `flash` event and route its ack to `reply`.
    Flash {
        request_id: u64,
        archive: Vec<u8>,
        reply: oneshot::Sender<FlashAck>,
    },
    /// Close the connection.
    Close,
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Outbound>,
    state: watch::Receiver<SessionState>,
    next_request_id: Arc<AtomicU64>,
}

impl SessionHandle {
    /// Builds a handle from the driver's channel ends.
    pub fn from_parts(tx: mpsc::Sender<Outbound>, state: watch::Receiver<SessionState>) -> Self {
        Self {
            tx,
            state,
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Queues a `message` event without waiting.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] once the session is closing or gone,
    /// [`SessionError::QueueFull`] if the driver is behind.  Either way the
    /// message is dropped, never retried.
    pub fn send(&self, payload: Vec<u8>) -> Result<(), SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let len = payload.len();
        self.tx
            .try_send(Outbound::Send(payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => SessionError::QueueFull(len),
                TrySendError::Closed(_) => SessionError::NotConnected,
            })
    }

    /// Sends a `flash` event; the returned receiver resolves with its ack.
    ///
    /// The receiver fails if the session ends before the ack arrives.
    pub async fn request_flash(
        &self,
        archive: Vec<u8>,
    ) -> Result<oneshot::Receiver<FlashAck>, SessionError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply, ack) = oneshot::channel();
        self.tx
            .send(Outbound::Flash {
                request_id,
                archive,
                reply,
            })
            .await
            .map_err(|_| SessionError::NotConnected)?;
        Ok(ack)
    }

    /// Asks the driver to close the connection.  Idempotent.
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(state: SessionState) -> (SessionHandle, mpsc::Receiver<Outbound>, watch::Sender<SessionState>) {
        let (tx, rx) = mpsc::channel(2);
        let (state_tx, state_rx) = watch::channel(state);
        (SessionHandle::from_parts(tx, state_rx), rx, state_tx)
    }

    #[test]
    fn test_send_queues_message_when_connected() {
        let (session, mut rx, _state) = handle(SessionState::Connected);
        session.send(b"hi\r\n".to_vec()).unwrap();
        assert!(matches!(rx.try_recv(), Ok(Outbound::Send(p)) if p == b"hi\r\n"));
    }

    #[test]
    fn test_send_fails_when_not_connected() {
        let (session, _rx, _state) = handle(SessionState::Closing);
        assert!(matches!(
            session.send(vec![1]),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn test_send_reports_full_queue() {
        let (session, _rx, _state) = handle(SessionState::Connected);
        session.send(vec![1]).unwrap();
        session.send(vec![2]).unwrap();
        assert!(matches!(
            session.send(vec![3, 4]),
            Err(SessionError::QueueFull(2))
        ));
    }

    #[test]
    fn test_state_follows_driver() {
        let (session, _rx, state) = handle(SessionState::Connected);
        state.send(SessionState::Disconnected).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_flash_requests_get_distinct_ids() {
        let (session, mut rx, _state) = handle(SessionState::Connected);
        let _a = session.request_flash(vec![1]).await.unwrap();
        let _b = session.request_flash(vec![2]).await.unwrap();

        let ids: Vec<u64> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .into_iter()
            .map(|o| match o {
                Outbound::Flash { request_id, .. } => request_id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
    }
}

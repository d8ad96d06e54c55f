//! WebSocket session driver.
//!
//! [`connect`] performs the handshake (the `connect` event) and spawns one
//! driver task that owns the socket for the rest of the connection.  The
//! driver:
//!
//! - encodes [`Outbound`] requests from every [`SessionHandle`] as binary
//!   frames,
//! - decodes inbound frames into [`SessionEvent::Message`]s,
//! - routes each `FlashAck` to the request with the same `request_id`,
//! - and publishes the [`SessionState`] through a `watch` channel.
//!
//! Whatever ends the connection, the driver emits exactly one
//! [`SessionEvent::Disconnected`] and drops every pending flash reply so
//! that waiting callers see the session close instead of hanging.

use std::collections::HashMap;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use uart_core::{decode_event, encode_event, WireEvent};

use crate::application::session::{Outbound, SessionError, SessionEvent, SessionHandle, SessionState};
use crate::domain::FlashAck;

/// Requests handles can queue before `send` reports a full queue.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Inbound events buffered for the relay loop.
const EVENT_QUEUE_DEPTH: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

type PendingFlashes = HashMap<u64, oneshot::Sender<FlashAck>>;

/// Connects to `url` and starts the driver task.
///
/// The returned receiver yields [`SessionEvent::Connected`] first and
/// [`SessionEvent::Disconnected`] last.
///
/// # Errors
///
/// Returns [`SessionError::Connect`] if the TCP connection or the WebSocket
/// handshake fails.
pub async fn connect(
    url: &str,
) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>), SessionError> {
    let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
    info!("Connecting to {url}");

    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| SessionError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    info!("Connected to {url}");
    state_tx.send_replace(SessionState::Connected);

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    // The queue is empty here, so this cannot fail.
    let _ = event_tx.try_send(SessionEvent::Connected);

    tokio::spawn(drive(ws, out_rx, event_tx, state_tx));
    Ok((SessionHandle::from_parts(out_tx, state_rx), event_rx))
}

// ── Driver task ───────────────────────────────────────────────────────────────

async fn drive(
    ws: WsStream,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending = PendingFlashes::new();

    let reason = loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(Outbound::Send(payload)) => {
                    if let Err(e) = send_event(&mut ws_tx, WireEvent::Message { payload }).await {
                        break format!("send failed: {e}");
                    }
                }
                Some(Outbound::Flash { request_id, archive, reply }) => {
                    pending.insert(request_id, reply);
                    let event = WireEvent::Flash { request_id, archive };
                    if let Err(e) = send_event(&mut ws_tx, event).await {
                        break format!("send failed: {e}");
                    }
                }
                Some(Outbound::Close) | None => {
                    state.send_replace(SessionState::Closing);
                    let _ = ws_tx.close().await;
                    break "closed locally".to_string();
                }
            },

            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Binary(data))) => {
                    if let Some(event) = dispatch(&data, &mut pending) {
                        if events.send(event).await.is_err() {
                            debug!("event receiver dropped; discarding inbound data");
                        }
                    }
                }
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("ignoring text frame ({} bytes)", text.len());
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => break "closed by server".to_string(),
                Some(Err(WsError::ConnectionClosed)) => break "connection closed".to_string(),
                Some(Err(e)) => break e.to_string(),
            },
        }
    };

    state.send_replace(SessionState::Disconnected);
    if !pending.is_empty() {
        warn!("{} flash request(s) left unanswered", pending.len());
    }
    drop(pending);
    info!("Session ended: {reason}");
    let _ = events.send(SessionEvent::Disconnected).await;
}

/// Decodes one inbound frame.
///
/// `Message` events are returned for the relay loop; acks are handed to
/// their pending request and produce nothing.
fn dispatch(data: &[u8], pending: &mut PendingFlashes) -> Option<SessionEvent> {
    let event = match decode_event(data) {
        Ok(event) => event,
        Err(e) => {
            warn!("{e}");
            return None;
        }
    };

    match event {
        WireEvent::Message { payload } => Some(SessionEvent::Message(payload)),
        WireEvent::FlashAck {
            request_id,
            exit_code,
            stdin,
            stdout,
        } => {
            match pending.remove(&request_id) {
                Some(reply) => {
                    let _ = reply.send(FlashAck {
                        exit_code,
                        stdin,
                        stdout,
                    });
                }
                None => warn!("ack for unknown flash request {request_id} ignored"),
            }
            None
        }
        other => {
            warn!("unexpected {} event ignored", other.name());
            None
        }
    }
}

async fn send_event(sink: &mut WsSink, event: WireEvent) -> Result<(), String> {
    let bytes = encode_event(&event).map_err(|e| e.to_string())?;
    sink.send(WsMessage::Binary(bytes))
        .await
        .map_err(|e| e.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(event: WireEvent) -> Vec<u8> {
        encode_event(&event).unwrap()
    }

    #[test]
    fn test_message_becomes_session_event() {
        let mut pending = PendingFlashes::new();
        let data = encoded(WireEvent::Message {
            payload: b"hello".to_vec(),
        });

        assert_eq!(
            dispatch(&data, &mut pending),
            Some(SessionEvent::Message(b"hello".to_vec()))
        );
    }

    #[test]
    fn test_ack_is_routed_by_request_id() {
        // Arrange
        let mut pending = PendingFlashes::new();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        pending.insert(1, tx1);
        pending.insert(2, tx2);
        let data = encoded(WireEvent::FlashAck {
            request_id: 2,
            exit_code: 0,
            stdin: Vec::new(),
            stdout: b"ok".to_vec(),
        });

        // Act
        let event = dispatch(&data, &mut pending);

        // Assert
        assert_eq!(event, None);
        assert_eq!(rx2.try_recv().unwrap().stdout, b"ok");
        assert!(rx1.try_recv().is_err());
        assert!(pending.contains_key(&1));
        assert!(!pending.contains_key(&2));
    }

    #[test]
    fn test_unknown_ack_and_garbage_are_ignored() {
        let mut pending = PendingFlashes::new();
        let ack = encoded(WireEvent::FlashAck {
            request_id: 9,
            exit_code: 1,
            stdin: Vec::new(),
            stdout: Vec::new(),
        });

        assert_eq!(dispatch(&ack, &mut pending), None);
        assert_eq!(dispatch(&[0xFF; 3], &mut pending), None);
    }

    #[test]
    fn test_flash_request_from_server_is_ignored() {
        let mut pending = PendingFlashes::new();
        let data = encoded(WireEvent::Flash {
            request_id: 1,
            archive: vec![1, 2, 3],
        });
        assert_eq!(dispatch(&data, &mut pending), None);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect(&format!("ws://127.0.0.1:{port}/")).await;

        assert!(matches!(result, Err(SessionError::Connect { .. })));
    }
}

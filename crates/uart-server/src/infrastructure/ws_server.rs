//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections and upgrading each to a WebSocket
//!    session (the `connect` event).
//! 3. Running one task per session that multiplexes three sources:
//!    - **Serial → client**: chunks from the [`SessionHub`] feed, sent as
//!      `Message` events.
//!    - **Client → serial**: `Message` events handed to the serial poll loop.
//!    - **Flash acks**: results of flash jobs spawned for `Flash` events.
//! 4. Stopping the accept loop when the `running` flag is cleared, then
//!    sending every open session a close frame and waiting briefly for the
//!    session tasks to finish.
//!
//! # Subscribe before handshake
//!
//! A session subscribes to the hub as soon as its TCP connection is
//! accepted, before the WebSocket handshake completes.  Everything the
//! device produces after the client's `connect()` returns is therefore
//! delivered to that client.
//!
//! # Malformed input
//!
//! Text frames, undecodable binary frames and unexpected events are logged
//! and ignored.  Only a close frame, EOF, a socket error or server shutdown
//! ends a session.
//!
//! [`SessionHub`]: crate::application::SessionHub

use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use uart_core::{decode_event, encode_event, Delivery, WireError, WireEvent};

use crate::application::{ServerContext, SessionFeed};

/// Flash acks a session can have waiting to be sent.
const ACK_QUEUE_DEPTH: usize = 8;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// How long shutdown waits for sessions to send their close frames.
const SESSION_DRAIN: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors from the WebSocket server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen socket could not be bound.
    #[error("failed to bind WebSocket listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The WebSocket upgrade handshake failed.
    #[error("WebSocket handshake failed with {peer}: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: WsError,
    },

    /// A frame could not be written to the client.
    #[error("WebSocket send failed: {0}")]
    Send(#[source] WsError),

    /// An outgoing event could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket listen socket.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is in use or not permitted.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!("Listening on ws://{}", listener.local_addr().unwrap_or(addr));
    Ok(listener)
}

/// Runs the accept loop until `running` is set to `false`.
///
/// Each accepted connection is handed off to a dedicated Tokio task so that
/// one slow client never blocks others or the serial poll loop.  On shutdown
/// every session is told to close its WebSocket; sessions still busy after
/// a one-second drain are aborted.
pub async fn run_server(listener: TcpListener, ctx: Arc<ServerContext>, running: Arc<AtomicBool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the flag is re-checked even when nobody connects.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                let feed = ctx.hub.subscribe();
                let ctx = Arc::clone(&ctx);
                let shutdown = shutdown_rx.clone();
                sessions.spawn(async move {
                    handle_session(stream, peer, ctx, feed, shutdown).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }

        // Reap finished sessions so the set only holds live ones.
        while sessions.try_join_next().is_some() {}
    }

    shutdown_tx.send_replace(true);
    if !sessions.is_empty() {
        info!("closing {} session(s)", sessions.len());
    }
    let drained = timeout(SESSION_DRAIN, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("{} session(s) did not close in time; aborting", sessions.len());
        sessions.abort_all();
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point of each session task; logs the outcome of [`run_session`].
async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    feed: SessionFeed,
    shutdown: watch::Receiver<bool>,
) {
    let id = Uuid::new_v4();
    match run_session(stream, peer, id, ctx, feed, shutdown).await {
        Ok(()) => info!("Client disconnected: {id}"),
        Err(e) => warn!("Client disconnected: {id} ({e})"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    id: Uuid,
    ctx: Arc<ServerContext>,
    mut feed: SessionFeed,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|source| ServerError::Handshake { peer, source })?;
    info!("Client connected: {id} ({peer})");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (ack_tx, mut ack_rx) = mpsc::channel::<WireEvent>(ACK_QUEUE_DEPTH);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("session {id}: server shutting down");
                if let Err(e) = ws_tx.close().await {
                    debug!("session {id}: close frame not sent: {e}");
                }
                break;
            }

            chunk = feed.next() => match chunk {
                Some(payload) => send_event(&mut ws_tx, &WireEvent::Message { payload }).await?,
                None => {
                    debug!("session {id}: hub closed");
                    break;
                }
            },

            Some(ack) = ack_rx.recv() => send_event(&mut ws_tx, &ack).await?,

            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Binary(data))) => handle_event(id, &data, &ctx, &ack_tx),
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("session {id}: ignoring text frame ({} bytes)", text.len());
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => break,
                Some(Err(e)) => {
                    debug!("session {id}: WebSocket error: {e}");
                    break;
                }
            },
        }
    }

    Ok(())
}

/// Dispatches one decoded client event.
fn handle_event(
    id: Uuid,
    data: &[u8],
    ctx: &Arc<ServerContext>,
    acks: &mpsc::Sender<WireEvent>,
) {
    let event = match decode_event(data) {
        Ok(event) => event,
        Err(e) => {
            warn!("session {id}: {e}");
            return;
        }
    };

    match event {
        WireEvent::Message { payload } => {
            debug!("session {id}: {} bytes for the device", payload.len());
            if ctx.serial.write(payload) == Delivery::Dropped {
                debug!("session {id}: serial queue full");
            }
        }
        WireEvent::Flash {
            request_id,
            archive,
        } => {
            info!("session {id}: flash request {request_id} ({} bytes)", archive.len());
            let ctx = Arc::clone(ctx);
            let acks = acks.clone();
            tokio::spawn(async move {
                let report = ctx.flash(archive).await;
                if acks.send(report.into_ack(request_id)).await.is_err() {
                    debug!("session {id} ended before flash {request_id} finished");
                }
            });
        }
        other => warn!("session {id}: unexpected {} event ignored", other.name()),
    }
}

async fn send_event(sink: &mut WsSink, event: &WireEvent) -> Result<(), ServerError> {
    let bytes = encode_event(event)?;
    sink.send(WsMessage::Binary(bytes))
        .await
        .map_err(ServerError::Send)
}

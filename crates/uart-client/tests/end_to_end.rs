//! Client against the real server stack over loopback WebSockets.
//!
//! The server side runs with a scripted serial backend so the tests can play
//! the device: push bytes it "reads" and inspect what it was written.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use uart_client::application::{
    flash, run_interactive, FlashError, SessionEvent, SessionState, StreamRouter,
};
use uart_client::infrastructure::connect;
use uart_core::{SentinelCommands, TelemetryFrame};
use uart_server::application::{
    FlashReport, FlashRunner, SerialManager, SerialRelay, ServerContext, SessionHub,
};
use uart_server::domain::SerialSettings;
use uart_server::infrastructure::{bind, run_server, MockSerialBackend};

const DEVICE: &str = "/dev/ttyUSB0";
const WAIT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────────────────

/// Fails archives containing `bad`, accepts everything else.
struct HexChecker;

#[async_trait]
impl FlashRunner for HexChecker {
    async fn run(&self, archive: Vec<u8>) -> FlashReport {
        if archive.windows(3).any(|w| w == b"bad") {
            FlashReport::new(1, "bad hex")
        } else {
            FlashReport::new(0, "ok")
        }
    }
}

struct TestServer {
    addr: SocketAddr,
    backend: MockSerialBackend,
    running: Arc<AtomicBool>,
}

impl TestServer {
    async fn start() -> Self {
        let backend = MockSerialBackend::new();
        backend.add_device(DEVICE);

        let manager = SerialManager::new(
            Box::new(backend.clone()),
            SerialSettings {
                pattern: "/dev/ttyUSB".into(),
                ..Default::default()
            },
            Duration::from_millis(100),
        );
        let hub = SessionHub::new(64);
        let (relay, serial) = SerialRelay::new(manager, hub.clone(), Duration::from_millis(5));
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(relay.run(Arc::clone(&running)));

        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = Arc::new(ServerContext::new(hub, serial, Arc::new(HexChecker)));
        tokio::spawn(run_server(listener, ctx, Arc::clone(&running)));

        tokio::time::timeout(WAIT, async {
            while backend.open_links() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        Self {
            addr,
            backend,
            running,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    async fn wait_written(&self, expected: &[u8]) {
        tokio::time::timeout(WAIT, async {
            while self.backend.written(DEVICE) != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("device never received the expected bytes");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> Option<SessionEvent> {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a session event")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_flash_success_over_loopback() {
    // Arrange
    let server = TestServer::start().await;
    let (session, mut events) = connect(&server.url()).await.unwrap();

    // Act
    let result = flash(&session, b"good build".to_vec(), Duration::from_secs(10)).await;

    // Assert
    assert_eq!(result.unwrap().stdout, b"ok");
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Connected));
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Disconnected));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_flash_rejection_carries_exit_code_and_output() {
    let server = TestServer::start().await;
    let (session, _events) = connect(&server.url()).await.unwrap();

    let result = flash(&session, b"a bad build".to_vec(), Duration::from_secs(10)).await;

    match result {
        Err(FlashError::Rejected { exit_code, stdout }) => {
            assert_eq!(exit_code, 1);
            assert_eq!(stdout, b"bad hex");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_messages_flow_both_ways() {
    // Arrange
    let server = TestServer::start().await;
    let (session, mut events) = connect(&server.url()).await.unwrap();
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Connected));

    // Act
    session.send(b"help\r\n".to_vec()).unwrap();
    server.backend.push_rx(DEVICE, b"usage: ...\r\n");

    // Assert
    server.wait_written(b"help\r\n").await;
    assert_eq!(
        next_event(&mut events).await,
        Some(SessionEvent::Message(b"usage: ...\r\n".to_vec()))
    );
}

#[tokio::test]
async fn test_disconnected_is_emitted_exactly_once() {
    // Arrange
    let server = TestServer::start().await;
    let (session, mut events) = connect(&server.url()).await.unwrap();
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Connected));

    // Act
    session.close().await;
    session.close().await;

    // Assert
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Disconnected));
    assert_eq!(next_event(&mut events).await, None);
    assert!(session.send(b"late".to_vec()).is_err());
}

#[tokio::test]
async fn test_interactive_console_decodes_telemetry_after_sentinel() {
    // Arrange
    let server = TestServer::start().await;
    let (session, mut events) = connect(&server.url()).await.unwrap();
    let (line_tx, mut lines) = mpsc::channel(8);
    let mut router = StreamRouter::new(SentinelCommands::default(), 4096);
    let frame = TelemetryFrame {
        counter: 42,
        values: [1.25; 16],
    };

    // Act
    let operator = async {
        line_tx.send("START_TELEMETRY".to_string()).await.unwrap();
        server.wait_written(b"START_TELEMETRY\r\n").await;
        let mut stream = b"boot log\r\n".to_vec();
        stream.extend(frame.to_wire_bytes());
        server.backend.push_rx(DEVICE, &stream);
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.close().await;
    };
    let mut out = Vec::new();
    let console = run_interactive(&session, &mut events, &mut lines, &mut router, &mut out);
    let (result, ()) = tokio::time::timeout(WAIT, async { tokio::join!(console, operator) })
        .await
        .expect("console never finished");
    result.unwrap();

    // Assert
    let printed = String::from_utf8(out).unwrap();
    assert!(printed.starts_with("Connected to server.\n"));
    assert!(printed.contains("[SEND] START_TELEMETRY\n"));
    assert!(printed.contains("[FRAME] #42 1.2500"));
    assert!(!printed.contains("boot log"));
    assert!(printed.ends_with("Disconnected from server.\n"));
}

//! UART-Over-WiFi server — entry point.
//!
//! Owns one physical serial device and shares it with any number of
//! WebSocket clients: every byte read from the device is broadcast to all
//! clients, and every `message` a client sends is written to the device.
//!
//! # Usage
//!
//! ```text
//! uart-server [OPTIONS] <TTY_PATH>
//!
//! Arguments:
//!   <TTY_PATH>  Device path prefix; every path matching <TTY_PATH>* is tried
//!
//! Options:
//!   --host <HOST>              Address to bind to [default: 0.0.0.0]
//!   --port <PORT>              Port to bind to [default: 8080]
//!   --baudrate <BAUD>          Serial baud rate [default: 115200]
//!   --timeout <SECS>           Serial read/write timeout [default: 1]
//!   --flash-command <CMD>      Command run for flash requests (archive path appended)
//!   --config <FILE>            Optional TOML file with tunables
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable             | Default   | Description                  |
//! |----------------------|-----------|------------------------------|
//! | `UART_HOST`          | `0.0.0.0` | Bind address                 |
//! | `UART_PORT`          | `8080`    | Bind port                    |
//! | `UART_BAUDRATE`      | `115200`  | Serial baud rate             |
//! | `UART_TIMEOUT`       | `1`       | Serial timeout (secs)        |
//! | `UART_FLASH_COMMAND` | unset     | Flash command                |
//! | `UART_SERVER_CONFIG` | unset     | Path of the TOML tunables    |
//!
//! # Startup sequence
//!
//! 1. Parse the CLI and the optional TOML file, initialise logging.
//! 2. Discover the serial device (retrying every discovery interval until
//!    one opens, or until Ctrl+C).
//! 3. Bind the WebSocket listener; a bind failure exits with code 1.
//! 4. Start the serial poll loop and accept clients until Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use uart_server::application::{
    FlashRunner, NoFlashRunner, SerialManager, SerialRelay, ServerContext, SessionHub,
};
use uart_server::domain::{FileConfig, SerialSettings, ServerConfig};
use uart_server::infrastructure::{bind, run_server, CommandFlashRunner, SystemSerialBackend};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// UART-Over-WiFi server.
///
/// Broadcasts a local serial device to WebSocket clients.
#[derive(Debug, Parser)]
#[command(
    name = "uart-server",
    about = "Start a WebSocket server which broadcasts UART input of a given tty",
    version
)]
struct Cli {
    /// Host to bind to.
    #[arg(long, default_value = "0.0.0.0", env = "UART_HOST")]
    host: String,

    /// Port to bind to.
    #[arg(long, default_value_t = 8080, env = "UART_PORT")]
    port: u16,

    /// tty baud rate.
    #[arg(long, default_value_t = 115_200, env = "UART_BAUDRATE")]
    baudrate: u32,

    /// tty timeout in seconds.
    #[arg(long, default_value_t = 1, env = "UART_TIMEOUT")]
    timeout: u64,

    /// Shell command run for flash requests; the archive path is appended.
    #[arg(long, env = "UART_FLASH_COMMAND")]
    flash_command: Option<String>,

    /// Optional TOML file with tunables (intervals, queue depth, log level).
    #[arg(long, env = "UART_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// tty path prefix.  Every path matching `<tty_path>*` is tried.
    tty_path: String,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--host` is not a valid IP address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.host, self.port))?;

        Ok(ServerConfig {
            bind_addr,
            serial: SerialSettings {
                pattern: self.tty_path,
                baud_rate: self.baudrate,
                timeout: Duration::from_secs(self.timeout),
            },
            flash_command: self.flash_command,
            ..ServerConfig::default()
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// A single-threaded runtime is enough: the serial poll loop, the accept
/// loop and every session are cooperative tasks that never block.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = match cli.config.as_deref() {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FileConfig::default(),
    };

    // `RUST_LOG` wins over the file's log_level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&file.log_level)),
        )
        .init();

    let mut config = cli.into_server_config()?;
    file.apply_to(&mut config);
    info!("Loaded config: {config:?}");

    // ── Serial discovery ──────────────────────────────────────────────────────
    let mut manager = SerialManager::new(
        Box::new(SystemSerialBackend::new()),
        config.serial.clone(),
        config.discovery_interval,
    );
    tokio::select! {
        _ = manager.discover() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received exit, exiting");
            return Ok(());
        }
    }

    // ── Listener ──────────────────────────────────────────────────────────────
    let listener = bind(config.bind_addr).await?;

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received exit, exiting");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Relay + sessions ──────────────────────────────────────────────────────
    let hub = SessionHub::new(config.session_queue_depth);
    let (relay, serial) = SerialRelay::new(manager, hub.clone(), config.poll_interval);
    let relay_task = tokio::spawn(relay.run(Arc::clone(&running)));

    let flash_runner: Arc<dyn FlashRunner> = match config.flash_command.clone() {
        Some(command) => Arc::new(CommandFlashRunner::new(command)),
        None => {
            warn!("no --flash-command configured; flash requests will be rejected");
            Arc::new(NoFlashRunner)
        }
    };
    let ctx = Arc::new(ServerContext::new(hub, serial, flash_runner));

    run_server(listener, ctx, Arc::clone(&running)).await;

    // The relay closes the serial port on its way out.
    relay_task.await.context("serial relay task failed")?;
    info!("uart-server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["uart-server", "/dev/ttyUSB"]);

        // Assert
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.baudrate, 115_200);
        assert_eq!(cli.timeout, 1);
        assert_eq!(cli.flash_command, None);
        assert_eq!(cli.tty_path, "/dev/ttyUSB");
    }

    #[test]
    fn test_cli_requires_tty_path() {
        assert!(Cli::try_parse_from(["uart-server"]).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "uart-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--baudrate",
            "9600",
            "--timeout",
            "3",
            "--flash-command",
            "./flash.sh",
            "/dev/ttyACM",
        ]);
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.baudrate, 9600);
        assert_eq!(cli.flash_command.as_deref(), Some("./flash.sh"));
    }

    #[test]
    fn test_into_server_config_maps_fields() {
        // Arrange
        let cli = Cli::parse_from(["uart-server", "--port", "9001", "--timeout", "2", "/dev/ttyUSB"]);

        // Act
        let config = cli.into_server_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9001");
        assert_eq!(config.serial.pattern, "/dev/ttyUSB");
        assert_eq!(config.serial.timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_into_server_config_invalid_host_returns_error() {
        let cli = Cli {
            host: "not.an.ip".to_string(),
            port: 8080,
            baudrate: 115_200,
            timeout: 1,
            flash_command: None,
            config: None,
            tty_path: "/dev/ttyUSB".to_string(),
        };
        assert!(cli.into_server_config().is_err());
    }
}

//! UART-Over-WiFi client — entry point.
//!
//! Connects to a uart-server and either runs an interactive console,
//! uploads a build archive for flashing, or exposes the remote UART as a
//! local virtual serial port.
//!
//! # Usage
//!
//! ```text
//! uart-client [OPTIONS] <HOST> [PORT]
//!
//! Arguments:
//!   <HOST>  Server host
//!   [PORT]  Server port [default: 8080]
//!
//! Options:
//!   -f, --flash <PATH>  Upload a build archive, wait for the verdict, exit 0/1
//!   --virtual <PATH>    Expose the remote UART as a pty symlinked at PATH
//!   --baudrate <BAUD>   Baud rate of the virtual port [default: 115200]
//!   --timeout <SECS>    Read timeout of the virtual port [default: 1]
//!   --config <FILE>     Optional TOML file with tunables
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning                                                         |
//! |------|-----------------------------------------------------------------|
//! | 0    | Flash succeeded, or the session ended normally                  |
//! | 1    | Flash failed or timed out, archive missing, startup error        |

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use uart_client::application::{
    flash, load_archive, run_interactive, run_virtual, SessionHandle, StreamRouter,
};
use uart_client::domain::{ClientConfig, ClientMode, FileConfig};
use uart_client::infrastructure::connect;

/// Operator lines buffered between the stdin thread and the relay loop.
const STDIN_QUEUE_DEPTH: usize = 64;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// UART-Over-WiFi client.
#[derive(Debug, Parser)]
#[command(
    name = "uart-client",
    about = "Connect to a UART-Over-WiFi server: console, flasher or virtual serial port",
    version
)]
struct Cli {
    /// Server host.
    host: String,

    /// Server port.
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Build archive to upload for flashing.
    #[arg(short = 'f', long, value_name = "PATH", conflicts_with = "virtual_path")]
    flash: Option<PathBuf>,

    /// Path of the virtual serial port symlink to create.
    #[arg(long = "virtual", value_name = "PATH")]
    virtual_path: Option<PathBuf>,

    /// Baud rate of the virtual serial port.
    #[arg(long, default_value_t = 115_200, env = "UART_BAUDRATE")]
    baudrate: u32,

    /// Read timeout of the virtual serial port, in seconds.
    #[arg(long, default_value_t = 1, env = "UART_TIMEOUT")]
    timeout: u64,

    /// Optional TOML file with tunables (deadline, buffer window, sentinels).
    #[arg(long, env = "UART_CLIENT_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ClientConfig`].
    fn into_client_config(self) -> ClientConfig {
        let mode = match (self.flash, self.virtual_path) {
            (Some(archive), _) => ClientMode::Flash(archive),
            (None, Some(link)) => ClientMode::Virtual(link),
            (None, None) => ClientMode::Interactive,
        };
        let mut config = ClientConfig::new(&self.host, self.port, mode);
        config.line.baud_rate = self.baudrate;
        config.line.timeout = Duration::from_secs(self.timeout);
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
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
        .with_writer(std::io::stderr)
        .init();

    let mut config = cli.into_client_config();
    file.apply_to(&mut config);
    info!("Loaded config: {config:?}");

    match config.mode.clone() {
        ClientMode::Flash(path) => run_flash(&config, path).await,
        ClientMode::Interactive => run_console(&config).await,
        ClientMode::Virtual(link) => run_virtual_port(&config, link).await,
    }
}

// ── Modes ─────────────────────────────────────────────────────────────────────

async fn run_flash(config: &ClientConfig, path: PathBuf) -> anyhow::Result<ExitCode> {
    // Checked before any network activity.
    let archive = match load_archive(&path) {
        Ok(archive) => archive,
        Err(e) => {
            eprintln!("Flash error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let (session, _events) = connect(&config.server_url).await?;
    match flash(&session, archive, config.flash_deadline).await {
        Ok(success) => {
            if !success.stdout.is_empty() {
                print!("{}", String::from_utf8_lossy(&success.stdout));
            }
            println!("Success");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Flash error: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_console(config: &ClientConfig) -> anyhow::Result<ExitCode> {
    let (session, mut events) = connect(&config.server_url).await?;
    close_on_ctrl_c(session.clone());

    let (line_tx, mut lines) = mpsc::channel(STDIN_QUEUE_DEPTH);
    spawn_stdin_reader(line_tx);

    let mut router = StreamRouter::new(config.sentinels.clone(), config.buffer_window);
    run_interactive(&session, &mut events, &mut lines, &mut router, &mut std::io::stdout())
        .await
        .context("could not write to stdout")?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(unix)]
async fn run_virtual_port(config: &ClientConfig, link: PathBuf) -> anyhow::Result<ExitCode> {
    use uart_client::infrastructure::VirtualEndpoint;

    let mut endpoint = match VirtualEndpoint::open(&link, &config.line) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let (session, mut events) = connect(&config.server_url).await?;
    close_on_ctrl_c(session.clone());

    run_virtual(&session, &mut events, &mut endpoint, config.poll_interval)
        .await
        .context("virtual serial port failed")?;
    info!(
        "Virtual serial port closed ({} bytes dropped)",
        endpoint.inbound_drops().dropped_bytes()
    );
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(unix))]
async fn run_virtual_port(_config: &ClientConfig, _link: PathBuf) -> anyhow::Result<ExitCode> {
    anyhow::bail!("--virtual needs a Unix pseudo-terminal")
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Closes the session on Ctrl+C; the relay loop then ends normally.
fn close_on_ctrl_c(session: SessionHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received exit, exiting");
                session.close().await;
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });
}

/// Reads stdin lines on a plain thread.
///
/// A blocking stdin read inside the runtime would keep it from shutting
/// down until the operator pressed Enter.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_interactive() {
        // Arrange / Act
        let cli = Cli::parse_from(["uart-client", "192.168.1.20"]);
        let config = cli.into_client_config();

        // Assert
        assert_eq!(config.server_url, "ws://192.168.1.20:8080/");
        assert_eq!(config.mode, ClientMode::Interactive);
        assert_eq!(config.line.baud_rate, 115_200);
        assert_eq!(config.line.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_cli_requires_host() {
        assert!(Cli::try_parse_from(["uart-client"]).is_err());
    }

    #[test]
    fn test_cli_positional_port() {
        let cli = Cli::parse_from(["uart-client", "pi.local", "9000"]);
        assert_eq!(cli.into_client_config().server_url, "ws://pi.local:9000/");
    }

    #[test]
    fn test_cli_flash_mode() {
        let cli = Cli::parse_from(["uart-client", "pi.local", "--flash", "build.tar.gz"]);
        assert_eq!(
            cli.into_client_config().mode,
            ClientMode::Flash(PathBuf::from("build.tar.gz"))
        );
    }

    #[test]
    fn test_cli_short_flash_flag() {
        let cli = Cli::parse_from(["uart-client", "pi.local", "-f", "build.tar.gz"]);
        assert_eq!(
            cli.into_client_config().mode,
            ClientMode::Flash(PathBuf::from("build.tar.gz"))
        );
    }

    #[test]
    fn test_cli_virtual_mode_with_line_settings() {
        // Arrange / Act
        let cli = Cli::parse_from([
            "uart-client",
            "pi.local",
            "--virtual",
            "/tmp/ttyREMOTE",
            "--baudrate",
            "9600",
            "--timeout",
            "3",
        ]);
        let config = cli.into_client_config();

        // Assert
        assert_eq!(config.mode, ClientMode::Virtual(PathBuf::from("/tmp/ttyREMOTE")));
        assert_eq!(config.line.baud_rate, 9600);
        assert_eq!(config.line.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_cli_flash_and_virtual_conflict() {
        let result = Cli::try_parse_from([
            "uart-client",
            "pi.local",
            "--flash",
            "a.tar.gz",
            "--virtual",
            "/tmp/tty",
        ]);
        assert!(result.is_err());
    }
}

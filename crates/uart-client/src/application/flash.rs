//! Flash RPC.
//!
//! Uploads a build archive and waits, up to a fixed deadline, for the
//! server's single acknowledgment.  The session is closed as soon as the
//! verdict is known: flashing ends the client's session.
//!
//! Three outcomes are kept apart:
//!
//! | Outcome                        | Result                         | Exit code |
//! |--------------------------------|--------------------------------|-----------|
//! | ack with exit code 0           | `Ok(FlashSuccess)`             | 0         |
//! | ack with nonzero exit code     | `Err(FlashError::Rejected)`    | 1         |
//! | no ack before the deadline     | `Err(FlashError::Timeout)`     | 1         |

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::info;

use crate::application::session::{SessionError, SessionHandle};
use crate::domain::FlashAck;

/// Successful flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSuccess {
    pub stdout: Vec<u8>,
}

/// Why a flash did not succeed.
#[derive(Debug, Error)]
pub enum FlashError {
    /// The archive path does not exist.
    #[error("path {0} does not exist")]
    ArchiveMissing(PathBuf),

    /// The archive exists but could not be read.
    #[error("could not read {path}: {source}")]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server ran the job and it failed.
    #[error("flash error (exit code {exit_code}): {}", String::from_utf8_lossy(.stdout))]
    Rejected { exit_code: i32, stdout: Vec<u8> },

    /// No acknowledgment arrived in time.
    #[error("timeout on flash after {0:?}")]
    Timeout(Duration),

    /// The connection ended before the acknowledgment arrived.
    #[error("connection closed before the flash was acknowledged")]
    SessionClosed,

    /// The request could not be sent.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Reads the archive at `path`.
///
/// Runs before any network activity so a typo in the path fails fast.
pub fn load_archive(path: &Path) -> Result<Vec<u8>, FlashError> {
    if !path.exists() {
        return Err(FlashError::ArchiveMissing(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| FlashError::ArchiveUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Uploads `archive` and waits up to `deadline` for the verdict.
///
/// The session is closed before returning, whatever the outcome.
pub async fn flash(
    session: &SessionHandle,
    archive: Vec<u8>,
    deadline: Duration,
) -> Result<FlashSuccess, FlashError> {
    info!("Flashing {} bytes", archive.len());
    let outcome = timeout(deadline, async {
        let pending = session.request_flash(archive).await?;
        let ack = pending.await.map_err(|_| FlashError::SessionClosed)?;
        Ok::<FlashAck, FlashError>(ack)
    })
    .await;
    session.close().await;

    let ack = match outcome {
        Ok(result) => result?,
        Err(_) => return Err(FlashError::Timeout(deadline)),
    };

    if ack.exit_code == 0 {
        Ok(FlashSuccess { stdout: ack.stdout })
    } else {
        Err(FlashError::Rejected {
            exit_code: ack.exit_code,
            stdout: ack.stdout,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::sync::{mpsc, watch};

    use super::*;
    use crate::application::session::{Outbound, SessionState};

    /// Stands in for the driver task: answers flash requests with `reply`
    /// (or never, when `None`) and records whether the session was closed.
    fn fake_session(
        reply: Option<FlashAck>,
    ) -> (SessionHandle, tokio::task::JoinHandle<bool>) {
        let (tx, mut rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(SessionState::Connected);
        let driver = tokio::spawn(async move {
            let _state = state_tx;
            let mut waiting = Vec::new();
            while let Some(outbound) = rx.recv().await {
                match outbound {
                    Outbound::Flash { reply: tx, .. } => match reply.clone() {
                        Some(ack) => {
                            let _ = tx.send(ack);
                        }
                        None => waiting.push(tx),
                    },
                    Outbound::Close => return true,
                    Outbound::Send(_) => {}
                }
            }
            false
        });
        (SessionHandle::from_parts(tx, state_rx), driver)
    }

    fn ack(exit_code: i32, stdout: &[u8]) -> FlashAck {
        FlashAck {
            exit_code,
            stdin: Vec::new(),
            stdout: stdout.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_zero_exit_code_is_success() {
        // Arrange
        let (session, driver) = fake_session(Some(ack(0, b"ok")));

        // Act
        let result = flash(&session, b"archive".to_vec(), Duration::from_secs(10)).await;

        // Assert
        assert_eq!(result.unwrap(), FlashSuccess { stdout: b"ok".to_vec() });
        assert!(driver.await.unwrap(), "session must be closed after the ack");
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_is_rejected() {
        let (session, driver) = fake_session(Some(ack(1, b"bad hex")));

        let result = flash(&session, b"archive".to_vec(), Duration::from_secs(10)).await;

        match result {
            Err(FlashError::Rejected { exit_code, stdout }) => {
                assert_eq!(exit_code, 1);
                assert_eq!(stdout, b"bad hex");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(driver.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_times_out_after_deadline() {
        // Arrange
        let (session, driver) = fake_session(None);
        let started = tokio::time::Instant::now();

        // Act
        let result = flash(&session, b"archive".to_vec(), Duration::from_secs(10)).await;

        // Assert
        assert!(matches!(result, Err(FlashError::Timeout(d)) if d == Duration::from_secs(10)));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert!(driver.await.unwrap());
    }

    #[tokio::test]
    async fn test_session_dropped_before_ack_is_distinct_from_timeout() {
        // Arrange: the driver drops every reply sender immediately
        let (tx, mut rx) = mpsc::channel(8);
        let (_state_tx, state_rx) = watch::channel(SessionState::Connected);
        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                drop(outbound);
            }
        });
        let session = SessionHandle::from_parts(tx, state_rx);

        // Act
        let result = flash(&session, vec![1], Duration::from_secs(10)).await;

        // Assert
        assert!(matches!(result, Err(FlashError::SessionClosed)));
    }

    #[test]
    fn test_load_archive_missing_path() {
        let result = load_archive(Path::new("/nonexistent/build.tar.gz"));
        assert!(matches!(result, Err(FlashError::ArchiveMissing(_))));
    }

    #[test]
    fn test_load_archive_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.tar.gz");
        std::fs::write(&path, b"\x1f\x8b payload").unwrap();
        assert_eq!(load_archive(&path).unwrap(), b"\x1f\x8b payload");
    }
}

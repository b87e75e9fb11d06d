//! Control surface exposed to an out-of-process UI layer: a Unix domain
//! socket that answers every connection with one JSON snapshot.
//!
//! Grounded in `guard-service::status::spawn_status_server` — same
//! transport (local-only UDS, `0600` permissions, stale-socket cleanup
//! on bind) and same one-shot-per-connection protocol, narrowed to the
//! fields this daemon actually has: detection/recovery counters, the
//! orchestrator phase, and live backup count.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::error;

use crate::counters::Counters;
use crate::orchestrator::Orchestrator;
use sentinel_core::backup_store::BackupStore;

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub phase: crate::orchestrator::Phase,
    pub detections: u64,
    pub recoveries: u64,
    pub files_tracked: usize,
}

fn snapshot(
    orchestrator: &Orchestrator,
    counters: &Counters,
    store: &BackupStore,
) -> StatusSnapshot {
    StatusSnapshot {
        phase: orchestrator.phase(),
        detections: counters.detections(),
        recoveries: counters.recoveries(),
        files_tracked: store.live_count(),
    }
}

#[cfg(unix)]
pub fn spawn_status_server(
    socket_path: PathBuf,
    orchestrator: Arc<Orchestrator>,
    counters: Arc<Counters>,
    store: Arc<BackupStore>,
) -> Result<JoinHandle<()>> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;

    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let payload =
                        serde_json::to_vec(&snapshot(&orchestrator, &counters, &store))
                            .unwrap_or_default();
                    let _ = stream.write_all(&payload).await;
                    let _ = stream.shutdown().await;
                }
                Err(err) => {
                    error!(error = %err, "status socket accept error");
                    break;
                }
            }
        }
    });

    Ok(task)
}

#[cfg(not(unix))]
pub fn spawn_status_server(
    _socket_path: PathBuf,
    _orchestrator: Arc<Orchestrator>,
    _counters: Arc<Counters>,
    _store: Arc<BackupStore>,
) -> Result<JoinHandle<()>> {
    Err(anyhow::anyhow!(
        "status server is only available on unix via UDS transport"
    ))
}

pub fn default_socket_path(state_dir: &Path) -> PathBuf {
    state_dir.join("sentinel.sock")
}

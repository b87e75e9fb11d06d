//! Optional periodic reconciliation sweep: re-runs checksum-based
//! recovery against the whole catalog on a fixed interval, independent
//! of any single detection. The "belt" to the watcher's "suspenders" —
//! it catches drift the event stream missed (restarts, unmounted
//! volumes, coalesced inotify events).
//!
//! Grounded in `guard-service::integrity::audit_loop::spawn_audit_loop`:
//! same `tokio::select!` shape over a sleep/shutdown race, trimmed of
//! the teacher's `Notify`-based wake-early handle since nothing in this
//! daemon needs to force an out-of-band sweep.

use std::sync::Arc;
use std::time::Duration;

use sentinel_core::backup_store::BackupStore;
use tokio::sync::watch;
use tracing::{info, warn};

pub fn spawn_reconcile_loop(
    store: Arc<BackupStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "reconcile loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reconcile loop shutting down");
                        return;
                    }
                }
            }
            if *shutdown.borrow() {
                return;
            }

            let store = store.clone();
            let result =
                tokio::task::spawn_blocking(move || store.checksum_recovery(None)).await;
            match result {
                Ok((restored, failed)) => {
                    if restored > 0 || failed > 0 {
                        info!(restored, failed, "reconcile sweep restored drifted files");
                    }
                }
                Err(e) => warn!(error = %e, "reconcile sweep task panicked"),
            }
        }
    })
}

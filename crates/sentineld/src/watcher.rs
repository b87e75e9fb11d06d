//! Real-time file-system watcher bridging the sync `notify` callback into a
//! tokio broadcast channel.
//!
//! Grounded in `guard-service::integrity::watcher::FileWatcher`: a
//! dedicated OS thread receives from a `std::sync::mpsc` channel fed by
//! `notify` and republishes onto a `tokio::sync::broadcast` channel so
//! every subscriber task sees the same event stream.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub enum RawChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

pub struct FileWatcher {
    watcher: RecommendedWatcher,
    change_tx: broadcast::Sender<RawChange>,
}

impl FileWatcher {
    pub fn new() -> Result<(Self, broadcast::Receiver<RawChange>)> {
        let (change_tx, change_rx) = broadcast::channel(4096);
        let tx = change_tx.clone();

        let (sync_tx, sync_rx) = mpsc::channel::<Result<Event, notify::Error>>();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = sync_tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let tx_clone = tx.clone();
        std::thread::Builder::new()
            .name("sentinel-watcher-bridge".into())
            .spawn(move || loop {
                match sync_rx.recv() {
                    Ok(Ok(event)) => {
                        for change in classify_event(&event) {
                            if tx_clone.send(change).is_err() {
                                debug!("all receivers dropped, stopping watcher bridge");
                                return;
                            }
                        }
                    }
                    Ok(Err(e)) => error!(error = %e, "file watcher error"),
                    Err(_) => {
                        debug!("watcher channel closed");
                        return;
                    }
                }
            })?;

        Ok((Self { watcher, change_tx: tx }, change_rx))
    }

    pub fn watch_paths(&mut self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if path.exists() {
                let mode = if path.is_dir() {
                    RecursiveMode::Recursive
                } else {
                    RecursiveMode::NonRecursive
                };
                self.watcher.watch(path, mode)?;
                info!(path = %path.display(), "watching");
            } else {
                warn!(path = %path.display(), "path does not exist, cannot watch");
            }
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RawChange> {
        self.change_tx.subscribe()
    }
}

fn classify_event(event: &Event) -> Vec<RawChange> {
    let mut changes = Vec::new();
    match &event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                if path.is_dir() {
                    continue;
                }
                changes.push(RawChange::Created(path.clone()));
            }
        }
        EventKind::Modify(modify_kind) => {
            use notify::event::ModifyKind;
            match modify_kind {
                ModifyKind::Name(_) if event.paths.len() >= 2 => {
                    changes.push(RawChange::Renamed {
                        from: event.paths[0].clone(),
                        to: event.paths[1].clone(),
                    });
                }
                _ => {
                    for path in &event.paths {
                        if path.is_dir() {
                            continue;
                        }
                        changes.push(RawChange::Modified(path.clone()));
                    }
                }
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                changes.push(RawChange::Removed(path.clone()));
            }
        }
        _ => {}
    }
    changes
}

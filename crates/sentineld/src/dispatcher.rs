//! Event dispatcher: the single task that owns all Feature Extractor
//! state, normalizes raw watcher events, drives the Backup Store, and
//! hands features to the Anomaly Scorer.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sentinel_core::anomaly::AnomalyScorer;
use sentinel_core::backup_store::BackupStore;
use sentinel_core::config::EngineConfig;
use sentinel_core::entropy::file_entropy;
use sentinel_core::event::FsEvent;
use sentinel_core::features::{ExtractorWindows, FeatureExtractor};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;
use crate::watcher::RawChange;

/// Rolling window for the mean-entropy-of-recent-modifications hint fed
/// to `current_features`; reuses the op-rate window per SPEC_FULL.md
/// §4.2's "the rolling mean over Modified events in the last window".
const ENTROPY_WINDOW: Duration = Duration::from_secs(10);

fn to_relpath(monitoring_dir: &Path, abspath: &Path) -> String {
    abspath
        .strip_prefix(monitoring_dir)
        .unwrap_or(abspath)
        .to_string_lossy()
        .replace('\\', "/")
}

pub struct Dispatcher {
    monitoring_dir: PathBuf,
    extractor: FeatureExtractor,
    entropy_samples: VecDeque<(Instant, f64)>,
    store: Arc<BackupStore>,
    scorer: Arc<AnomalyScorer>,
    orchestrator: Arc<Orchestrator>,
    cfg: EngineConfig,
}

impl Dispatcher {
    pub fn new(
        monitoring_dir: PathBuf,
        store: Arc<BackupStore>,
        scorer: Arc<AnomalyScorer>,
        orchestrator: Arc<Orchestrator>,
        cfg: EngineConfig,
    ) -> Self {
        Dispatcher {
            monitoring_dir,
            extractor: FeatureExtractor::new(ExtractorWindows::default(), Instant::now()),
            entropy_samples: VecDeque::new(),
            store,
            scorer,
            orchestrator,
            cfg,
        }
    }

    fn record_entropy(&mut self, now: Instant, value: f64) {
        self.entropy_samples.push_back((now, value));
        while let Some((ts, _)) = self.entropy_samples.front() {
            if now.saturating_duration_since(*ts) > ENTROPY_WINDOW {
                self.entropy_samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn mean_entropy(&self) -> f64 {
        if self.entropy_samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.entropy_samples.iter().map(|(_, v)| v).sum();
        sum / self.entropy_samples.len() as f64
    }

    /// Seed the catalog and extension map from the existing tree, then
    /// back up every file found.
    pub fn scan_initial(&mut self) {
        for entry in walkdir::WalkDir::new(&self.monitoring_dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let relpath = to_relpath(&self.monitoring_dir, entry.path());
            self.extractor
                .record(&FsEvent::created(relpath), Instant::now());
            if let Err(e) = self.store.backup(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "initial backup failed");
            }
        }
        info!("initial directory scan and backup complete");
    }

    fn evaluate(&mut self, now: Instant) {
        if self.orchestrator.is_restoring() {
            debug!("recovery in progress, skipping evaluation");
            return;
        }
        let recent = self.extractor.recent_op_count(now);
        let features = self.extractor.current_features(self.mean_entropy(), now);
        let detection = self.scorer.score(&features, recent, &self.cfg);
        if detection.suspicious {
            self.orchestrator.handle_detection(detection);
        }
    }

    fn handle_raw(&mut self, change: RawChange, now: Instant) {
        match change {
            RawChange::Created(path) => {
                if path.is_dir() {
                    return;
                }
                let relpath = to_relpath(&self.monitoring_dir, &path);
                self.extractor.record(&FsEvent::created(relpath), now);
                if let Err(e) = self.store.backup(&path) {
                    warn!(path = %path.display(), error = %e, "backup on create failed");
                }
                self.evaluate(now);
            }
            RawChange::Modified(path) => {
                if path.is_dir() {
                    return;
                }
                let relpath = to_relpath(&self.monitoring_dir, &path);
                self.extractor.record(&FsEvent::modified(relpath), now);
                let entropy = file_entropy(&path);
                self.record_entropy(now, entropy);
                if let Err(e) = self.store.backup(&path) {
                    warn!(path = %path.display(), error = %e, "backup on modify failed");
                }
                self.evaluate(now);
            }
            RawChange::Removed(path) => {
                let relpath = to_relpath(&self.monitoring_dir, &path);
                self.extractor.record(&FsEvent::deleted(relpath.clone()), now);
                if let Err(e) = self.store.mark_deleted(&relpath) {
                    warn!(path = %path.display(), error = %e, "tombstone on delete failed");
                }
                self.evaluate(now);
            }
            RawChange::Renamed { from, to } => {
                let src = to_relpath(&self.monitoring_dir, &from);
                let dst = to_relpath(&self.monitoring_dir, &to);
                self.extractor.record(&FsEvent::renamed(src, dst), now);
                if to.is_file() {
                    if let Err(e) = self.store.backup(&to) {
                        warn!(path = %to.display(), error = %e, "backup on rename failed");
                    }
                }
                self.evaluate(now);
            }
        }
    }

    /// Drive the dispatcher loop until `shutdown` fires or the channel
    /// closes. Also listens for the orchestrator's post-restore reset
    /// signal on `reset_rx`.
    pub async fn run(
        mut self,
        mut raw_rx: broadcast::Receiver<RawChange>,
        mut reset_rx: mpsc::UnboundedReceiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatcher shutting down");
                        break;
                    }
                }
                Some(()) = reset_rx.recv() => {
                    self.extractor.reset_ext_changes(Instant::now());
                    debug!("ext_changes counter reset after recovery");
                }
                change = raw_rx.recv() => {
                    match change {
                        Ok(change) => self.handle_raw(change, Instant::now()),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "dispatcher lagged behind watcher");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}

//! Sliding-window behavioral feature extraction.
//!
//! Owned exclusively by the dispatcher task (see design notes in
//! SPEC_FULL.md §9): every mutating method takes `&mut self`, and there is
//! no internal locking. Other components only ever see the computed
//! [`FeatureVector`] snapshot.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::event::{FeatureVector, FsEvent, FsEventKind};

/// Window sizes and ring capacity, overridable for tests.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorWindows {
    pub op_window: Duration,
    pub ext_window: Duration,
    pub pattern_window: Duration,
    pub ring_capacity: usize,
}

impl Default for ExtractorWindows {
    fn default() -> Self {
        ExtractorWindows {
            op_window: Duration::from_secs(10),
            ext_window: Duration::from_secs(30),
            pattern_window: Duration::from_secs(10),
            ring_capacity: 200,
        }
    }
}

const SUSPICIOUS_RENAME_MOTIFS: [&str; 3] = ["encrypted", "locked", "crypt"];

pub struct FeatureExtractor {
    windows: ExtractorWindows,
    op_ring: VecDeque<Instant>,
    ext_changes: u32,
    last_reset: Instant,
    extension_map: HashMap<String, String>,
    recent_creates: HashMap<String, Instant>,
    recent_deletes: HashMap<String, Instant>,
}

fn extension_of(relpath: &str) -> String {
    relpath
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn base_of(relpath: &str) -> &str {
    relpath.rsplit_once('.').map(|(base, _)| base).unwrap_or(relpath)
}

impl FeatureExtractor {
    pub fn new(windows: ExtractorWindows, now: Instant) -> Self {
        FeatureExtractor {
            windows,
            op_ring: VecDeque::with_capacity(windows.ring_capacity),
            ext_changes: 0,
            last_reset: now,
            extension_map: HashMap::new(),
            recent_creates: HashMap::new(),
            recent_deletes: HashMap::new(),
        }
    }

    /// Record an already-classified file-system event at time `now`,
    /// applying the extension-change and pattern-detection rules of
    /// SPEC_FULL.md §4.2.
    pub fn record(&mut self, event: &FsEvent, now: Instant) {
        self.maybe_reset_ext_changes(now);
        self.push_op_timestamp(now);
        self.prune_pattern_maps(now);

        match &event.kind {
            FsEventKind::Created => {
                self.extension_map
                    .insert(event.relpath.clone(), extension_of(&event.relpath));
                self.recent_creates.insert(event.relpath.clone(), now);

                if event.relpath.to_lowercase().contains(".encrypted") {
                    let possible_original = event.relpath.replace(".encrypted", "");
                    if self.extension_map.contains_key(&possible_original) {
                        self.ext_changes += 1;
                    }
                }
                self.check_delete_create_pattern(&event.relpath, now);
            }
            FsEventKind::Modified => {
                let new_ext = extension_of(&event.relpath);
                if let Some(prev) = self.extension_map.get(&event.relpath) {
                    if *prev != new_ext {
                        self.ext_changes += 1;
                    }
                }
                self.extension_map.insert(event.relpath.clone(), new_ext);
            }
            FsEventKind::Deleted => {
                self.recent_deletes.insert(event.relpath.clone(), now);
            }
            FsEventKind::Renamed { from } => {
                let src_ext = extension_of(from);
                let dst_ext = extension_of(&event.relpath);
                if src_ext != dst_ext {
                    self.ext_changes += 1;
                    let dst_lower = event.relpath.to_lowercase();
                    if SUSPICIOUS_RENAME_MOTIFS.iter().any(|m| dst_lower.contains(m)) {
                        self.ext_changes += 1;
                    }
                }
                self.extension_map.remove(from);
                self.extension_map.insert(event.relpath.clone(), dst_ext);
            }
        }
    }

    fn maybe_reset_ext_changes(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_reset) > self.windows.ext_window {
            self.ext_changes = 0;
            self.last_reset = now;
        }
    }

    fn push_op_timestamp(&mut self, now: Instant) {
        self.op_ring.push_back(now);
        while self.op_ring.len() > self.windows.ring_capacity {
            self.op_ring.pop_front();
        }
        while let Some(&front) = self.op_ring.front() {
            if now.saturating_duration_since(front) > self.windows.op_window {
                self.op_ring.pop_front();
            } else {
                break;
            }
        }
    }

    fn prune_pattern_maps(&mut self, now: Instant) {
        let window = self.windows.pattern_window;
        self.recent_creates
            .retain(|_, ts| now.saturating_duration_since(*ts) <= window);
        self.recent_deletes
            .retain(|_, ts| now.saturating_duration_since(*ts) <= window);
    }

    /// Pattern: `delete(X.ext)` followed within the pattern window by
    /// `create(X.anything)`. Each matched pair counts +1.
    fn check_delete_create_pattern(&mut self, created_relpath: &str, now: Instant) {
        let created_base = base_of(created_relpath).to_string();
        let window = self.windows.pattern_window;
        let matched = self.recent_deletes.iter().any(|(deleted_path, ts)| {
            now.saturating_duration_since(*ts) <= window
                && base_of(deleted_path) == created_base
                && deleted_path.as_str() != created_relpath
        });
        if matched {
            self.ext_changes += 1;
        }
    }

    /// Current feature snapshot. `entropy_hint` is supplied by the
    /// dispatcher: the rolling mean Shannon entropy over `Modified` events
    /// in the current window.
    pub fn current_features(&self, entropy_hint: f64, now: Instant) -> FeatureVector {
        let op_rate = if self.op_ring.len() < 2 {
            0.0
        } else {
            let oldest = *self.op_ring.front().unwrap();
            let elapsed = now.saturating_duration_since(oldest).as_secs_f64().max(1.0);
            self.op_ring.len() as f64 / elapsed
        };

        FeatureVector {
            op_rate,
            ext_changes: self.ext_changes as f64,
            mean_entropy: entropy_hint,
        }
    }

    /// Number of operations recorded within the op window as of `now`.
    pub fn recent_op_count(&self, now: Instant) -> usize {
        self.op_ring
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) <= self.windows.op_window)
            .count()
    }

    /// Reset called by the orchestrator after a completed recovery.
    pub fn reset_ext_changes(&mut self, now: Instant) {
        self.ext_changes = 0;
        self.last_reset = now;
    }

    pub fn ext_changes(&self) -> u32 {
        self.ext_changes
    }
}

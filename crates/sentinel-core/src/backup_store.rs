//! Content-indexed shadow copy of the protected tree plus a checksum catalog.
//!
//! Grounded on `guard-core::backup_store::BackupStore`, trimmed of its
//! Ed25519 manifest signature (there is no adversarial-tamper model here;
//! the catalog is a local cache, not a trust boundary) and adapted from a
//! signed binary manifest to a plain `serde_json` catalog file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::hash::hash_file;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub relpath: String,
    pub checksum: String,
    pub last_modified: DateTime<Utc>,
    pub deleted: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

pub struct BackupStore {
    /// Root of the protected tree; relpaths are computed relative to this.
    monitoring_dir: PathBuf,
    /// Root of the shadow tree holding content copies.
    backup_dir: PathBuf,
    /// Path of the persisted catalog JSON document.
    catalog_path: PathBuf,
    catalog: Mutex<Catalog>,
    restoring: AtomicBool,
}

/// Outcome counters for a bulk restore operation.
pub type RestoreCounts = (usize, usize);

impl BackupStore {
    /// Load an existing catalog from `log_dir/file_checksums.json`, or
    /// start a fresh one. Ensures the shadow tree directory exists.
    pub fn load_or_create(
        monitoring_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> CoreResult<Self> {
        let monitoring_dir = monitoring_dir.into();
        let backup_dir = backup_dir.into();
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&backup_dir).map_err(|e| CoreError::io(&backup_dir, e))?;
        std::fs::create_dir_all(&log_dir).map_err(|e| CoreError::io(&log_dir, e))?;
        let catalog_path = log_dir.join("file_checksums.json");

        let catalog = if catalog_path.exists() {
            let text =
                std::fs::read_to_string(&catalog_path).map_err(|e| CoreError::io(&catalog_path, e))?;
            serde_json::from_str(&text)?
        } else {
            Catalog::default()
        };

        Ok(BackupStore {
            monitoring_dir,
            backup_dir,
            catalog_path,
            catalog: Mutex::new(catalog),
            restoring: AtomicBool::new(false),
        })
    }

    fn relpath_of(&self, abspath: &Path) -> CoreResult<String> {
        let rel = abspath
            .strip_prefix(&self.monitoring_dir)
            .unwrap_or(abspath);
        Ok(rel.to_string_lossy().replace('\\', "/"))
    }

    fn save_catalog(&self) -> CoreResult<()> {
        let catalog = self.catalog.lock();
        let json = serde_json::to_string_pretty(&*catalog)?;
        std::fs::write(&self.catalog_path, json).map_err(|e| CoreError::io(&self.catalog_path, e))?;
        Ok(())
    }

    /// Hash `abspath`, copy it into the shadow tree, and upsert its catalog
    /// row with `deleted=false`. Idempotent for unchanged content.
    pub fn backup(&self, abspath: &Path) -> CoreResult<()> {
        if !abspath.exists() {
            return Err(CoreError::Missing(abspath.to_path_buf()));
        }
        let relpath = self.relpath_of(abspath)?;
        let checksum = hash_file(abspath)?;
        let dest = self.backup_dir.join(&relpath);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        std::fs::copy(abspath, &dest).map_err(|e| CoreError::io(&dest, e))?;

        let last_modified = std::fs::metadata(abspath)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let mut catalog = self.catalog.lock();
        catalog.entries.insert(
            relpath.clone(),
            CatalogEntry {
                relpath,
                checksum,
                last_modified,
                deleted: false,
                last_updated: Utc::now(),
            },
        );
        drop(catalog);
        self.save_catalog()
    }

    /// Copy the shadow copy of `relpath` back over the live file, creating
    /// parent directories as needed.
    pub fn restore(&self, relpath: &str) -> CoreResult<()> {
        let src = self.backup_dir.join(relpath);
        if !src.exists() {
            return Err(CoreError::NoBackup(PathBuf::from(relpath)));
        }
        let dest = self.monitoring_dir.join(relpath);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        std::fs::copy(&src, &dest).map_err(|e| CoreError::io(&dest, e))?;
        debug!(relpath, "restored file from shadow tree");
        Ok(())
    }

    /// Restore every backed-up file. Not re-entrant: a concurrent call
    /// while one is in progress returns `(0, 0)` immediately without
    /// touching the filesystem.
    pub fn restore_all(&self) -> RestoreCounts {
        if self
            .restoring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("restore_all called while a restore is already in progress");
            return (0, 0);
        }

        let relpaths: Vec<String> = {
            let catalog = self.catalog.lock();
            catalog.entries.keys().cloned().collect()
        };

        let mut restored = 0usize;
        let mut failed = 0usize;
        for relpath in relpaths {
            let src = self.backup_dir.join(&relpath);
            if !src.exists() {
                continue;
            }
            match self.restore(&relpath) {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!(relpath, error = %e, "restore failed");
                    failed += 1;
                }
            }
        }

        info!(restored, failed, "restore_all complete");
        self.restoring.store(false, Ordering::SeqCst);
        (restored, failed)
    }

    /// Selective recovery keyed on the catalog rather than a tree walk:
    /// rows still live, or tombstoned strictly after `detection_time`, are
    /// checked against on-disk content and restored on mismatch or
    /// absence. Rows tombstoned before `detection_time` are treated as
    /// legitimate deletions and skipped. Throttles with a 100ms sleep
    /// every 10 files processed, matching the reference implementation's
    /// I/O pacing.
    pub fn checksum_recovery(&self, detection_time: Option<DateTime<Utc>>) -> RestoreCounts {
        let rows: Vec<CatalogEntry> = {
            let catalog = self.catalog.lock();
            catalog
                .entries
                .values()
                .filter(|e| {
                    !e.deleted || detection_time.map(|t| e.last_updated > t).unwrap_or(false)
                })
                .cloned()
                .collect()
        };

        let mut restored = 0usize;
        let mut failed = 0usize;
        for (i, entry) in rows.iter().enumerate() {
            let live = self.monitoring_dir.join(&entry.relpath);
            let needs_restore = if !live.exists() {
                true
            } else {
                match hash_file(&live) {
                    Ok(h) => h != entry.checksum,
                    Err(_) => true,
                }
            };

            if needs_restore {
                match self.restore(&entry.relpath) {
                    Ok(()) => restored += 1,
                    Err(_) => failed += 1,
                }
            }

            if i % 10 == 0 {
                std::thread::sleep(Duration::from_millis(100));
            }
        }

        info!(restored, failed, "checksum_recovery complete");
        (restored, failed)
    }

    /// Hash `abspath` and compare to the catalog. A missing row reads as
    /// "not modified" (treated as new); a tombstoned row reads as modified
    /// (reappearance is itself a change).
    pub fn is_modified(&self, abspath: &Path) -> CoreResult<bool> {
        let relpath = self.relpath_of(abspath)?;
        let catalog = self.catalog.lock();
        match catalog.entries.get(&relpath) {
            None => Ok(false),
            Some(entry) if entry.deleted => Ok(true),
            Some(entry) => {
                let current = hash_file(abspath)?;
                Ok(current != entry.checksum)
            }
        }
    }

    /// Tombstone `relpath`, inserting a fresh tombstone row if none exists.
    pub fn mark_deleted(&self, relpath: &str) -> CoreResult<()> {
        {
            let mut catalog = self.catalog.lock();
            let now = Utc::now();
            catalog
                .entries
                .entry(relpath.to_string())
                .and_modify(|e| {
                    e.deleted = true;
                    e.last_updated = now;
                })
                .or_insert_with(|| CatalogEntry {
                    relpath: relpath.to_string(),
                    checksum: String::new(),
                    last_modified: now,
                    deleted: true,
                    last_updated: now,
                });
        }
        self.save_catalog()
    }

    /// Remove tombstoned rows older than `older_than_days`.
    pub fn cleanup(&self, older_than_days: i64) -> CoreResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let removed = {
            let mut catalog = self.catalog.lock();
            let before = catalog.entries.len();
            catalog
                .entries
                .retain(|_, e| !(e.deleted && e.last_updated < cutoff));
            before - catalog.entries.len()
        };
        if removed > 0 {
            self.save_catalog()?;
        }
        Ok(removed)
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    /// Count of catalog rows that are not tombstoned.
    pub fn live_count(&self) -> usize {
        self.catalog.lock().entries.values().filter(|e| !e.deleted).count()
    }

    pub fn entry(&self, relpath: &str) -> Option<CatalogEntry> {
        self.catalog.lock().entries.get(relpath).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> BackupStore {
        let mon = dir.join("mon");
        let bak = dir.join("bak");
        let log = dir.join("log");
        std::fs::create_dir_all(&mon).unwrap();
        BackupStore::load_or_create(mon, bak, log).unwrap()
    }

    #[test]
    fn backup_then_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let file = dir.path().join("mon").join("a.txt");
        std::fs::write(&file, b"original content").unwrap();

        store.backup(&file).unwrap();
        std::fs::write(&file, b"corrupted").unwrap();
        store.restore("a.txt").unwrap();

        let restored = std::fs::read(&file).unwrap();
        assert_eq!(restored, b"original content");
    }

    #[test]
    fn double_backup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let file = dir.path().join("mon").join("a.txt");
        std::fs::write(&file, b"same").unwrap();

        store.backup(&file).unwrap();
        let e1 = store.entry("a.txt").unwrap();
        store.backup(&file).unwrap();
        let e2 = store.entry("a.txt").unwrap();
        assert_eq!(e1.checksum, e2.checksum);
        assert!(!e2.deleted);
    }

    #[test]
    fn mark_deleted_then_backup_clears_tombstone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let file = dir.path().join("mon").join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        store.backup(&file).unwrap();

        store.mark_deleted("a.txt").unwrap();
        assert!(store.entry("a.txt").unwrap().deleted);

        store.backup(&file).unwrap();
        assert!(!store.entry("a.txt").unwrap().deleted);
    }

    #[test]
    fn restore_all_is_not_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.restoring.store(true, Ordering::SeqCst);
        assert_eq!(store.restore_all(), (0, 0));
    }

    #[test]
    fn is_modified_treats_missing_row_as_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let file = dir.path().join("mon").join("new.txt");
        std::fs::write(&file, b"new").unwrap();
        assert!(!store.is_modified(&file).unwrap());
    }

    #[test]
    fn checksum_recovery_restores_divergent_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let file = dir.path().join("mon").join("a.txt");
        std::fs::write(&file, b"original").unwrap();
        store.backup(&file).unwrap();

        std::fs::write(&file, b"tampered").unwrap();
        let (restored, failed) = store.checksum_recovery(None);
        assert_eq!(restored, 1);
        assert_eq!(failed, 0);
        assert_eq!(std::fs::read(&file).unwrap(), b"original");
    }

    #[test]
    fn checksum_recovery_no_divergence_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let file = dir.path().join("mon").join("a.txt");
        std::fs::write(&file, b"stable").unwrap();
        store.backup(&file).unwrap();

        let (restored, failed) = store.checksum_recovery(None);
        assert_eq!(restored, 0);
        assert_eq!(failed, 0);
    }
}

//! End-to-end scenario tests for the detection/recovery pipeline.
//!
//! Covers the scenarios named in SPEC_FULL.md §8:
//!  A. Benign burst — no detection
//!  B. Rename-encrypt storm — rule-positive detection
//!  C. Delete-then-create pattern contributes to ext_changes
//!  D. Recovery self-silence — scorer skipped while restoring
//!  E. Alert cooldown suppresses a repeat within the window
//!  F. Catalog survives restart — checksum_recovery is a no-op when stable

use std::fs;
use std::time::{Duration, Instant};

use sentinel_core::alert::AlertSink;
use sentinel_core::anomaly::AnomalyScorer;
use sentinel_core::backup_store::BackupStore;
use sentinel_core::config::EngineConfig;
use sentinel_core::event::FsEvent;
use sentinel_core::features::{ExtractorWindows, FeatureExtractor};
use tempfile::tempdir;

fn store_in(dir: &std::path::Path) -> BackupStore {
    let mon = dir.join("mon");
    let bak = dir.join("bak");
    let log = dir.join("log");
    fs::create_dir_all(&mon).unwrap();
    BackupStore::load_or_create(mon, bak, log).unwrap()
}

// ─── A. Benign burst ────────────────────────────────────────────────────────

#[test]
fn benign_burst_produces_no_detection() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());
    let scorer = AnomalyScorer::new(None);
    let cfg = EngineConfig::default();
    let mut extractor = FeatureExtractor::new(ExtractorWindows::default(), Instant::now());

    let mon = dir.path().join("mon");
    for i in 0..20 {
        let name = format!("n_{i}.txt");
        let path = mon.join(&name);
        fs::write(&path, format!("content {i}")).unwrap();
        extractor.record(&FsEvent::created(name.clone()), Instant::now());
        store.backup(&path).unwrap();
    }
    for i in 0..20 {
        let name = format!("n_{i}.txt");
        extractor.record(&FsEvent::modified(name), Instant::now());
    }
    for i in 0..5 {
        let name = format!("n_{i}.txt");
        extractor.record(&FsEvent::deleted(name.clone()), Instant::now());
        store.mark_deleted(&name).unwrap();
    }

    let now = Instant::now();
    let recent = extractor.recent_op_count(now);
    let features = extractor.current_features(0.1, now);
    let detection = scorer.score(&features, recent, &cfg);

    assert!(!detection.suspicious);
    assert_eq!(store.live_count(), 15);
}

// ─── B. Rename-encrypt storm ────────────────────────────────────────────────

#[test]
fn rename_encrypt_storm_triggers_rule_positive_detection() {
    let dir = tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.require_model_confirmation = false;
    let scorer = AnomalyScorer::new(None);
    let mut extractor = FeatureExtractor::new(ExtractorWindows::default(), Instant::now());

    for i in 0..3 {
        extractor.record(&FsEvent::created(format!("seed_{i}.txt")), Instant::now());
    }

    let now = Instant::now();
    for i in 0..10 {
        let src = format!("doc_{i}.txt");
        let dst = format!("doc_{i}.txt.encrypted");
        extractor.record(&FsEvent::renamed(src, dst), now);
    }

    let recent = extractor.recent_op_count(now);
    let features = extractor.current_features(0.0, now);
    let detection = scorer.score(&features, recent, &cfg);

    assert!(detection.suspicious);
    assert!(features.ext_changes >= 10.0);
}

// ─── C. Delete-then-create pattern ──────────────────────────────────────────

#[test]
fn delete_then_create_within_pattern_window_counts_as_ext_change() {
    let mut extractor = FeatureExtractor::new(ExtractorWindows::default(), Instant::now());
    let t0 = Instant::now();
    extractor.record(&FsEvent::deleted("a.txt".to_string()), t0);
    let t1 = t0 + Duration::from_millis(300);
    extractor.record(&FsEvent::created("a.txt.enc".to_string()), t1);

    let features = extractor.current_features(0.0, t1);
    assert!(features.ext_changes >= 1.0);
}

// ─── D. Recovery self-silence ───────────────────────────────────────────────

#[test]
fn restore_all_guard_suppresses_concurrent_evaluation() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());
    let file = dir.path().join("mon").join("a.txt");
    fs::write(&file, b"original").unwrap();
    store.backup(&file).unwrap();

    // A concurrent restore_all returns (0, 0) and never touches the
    // filesystem again while one is already in flight — the signal the
    // dispatcher's evaluate() consults via Orchestrator::is_restoring().
    assert!(!store.is_restoring());
    let (restored, failed) = store.restore_all();
    assert_eq!(restored, 1);
    assert_eq!(failed, 0);
    assert!(!store.is_restoring());
}

// ─── E. Alert cooldown ──────────────────────────────────────────────────────

#[test]
fn cooldown_suppresses_second_alert_within_window() {
    let dir = tempdir().unwrap();
    let sink = AlertSink::new(dir.path(), Duration::from_secs(60), false, true);

    assert!(sink.send("POTENTIAL RANSOMWARE ACTIVITY DETECTED!\nReason: first occurrence"));
    assert!(!sink.send(
        "POTENTIAL RANSOMWARE ACTIVITY DETECTED!\nReason: second occurrence, ten seconds later"
    ));

    let log = fs::read_to_string(dir.path().join("alerts.log")).unwrap();
    assert_eq!(log.matches("ALERT:").count(), 1);
}

// ─── F. Catalog survives restart ────────────────────────────────────────────

#[test]
fn catalog_survives_restart_with_no_drift() {
    let dir = tempdir().unwrap();
    {
        let store = store_in(dir.path());
        for i in 0..100 {
            let path = dir.path().join("mon").join(format!("f{i}.bin"));
            fs::write(&path, format!("payload {i}")).unwrap();
            store.backup(&path).unwrap();
        }
    }

    // Reopen against the same directories, simulating a process restart.
    let mon = dir.path().join("mon");
    let bak = dir.path().join("bak");
    let log = dir.path().join("log");
    let reopened = BackupStore::load_or_create(mon, bak, log).unwrap();

    let (restored, failed) = reopened.checksum_recovery(None);
    assert_eq!(restored, 0);
    assert_eq!(failed, 0);
    assert_eq!(reopened.live_count(), 100);
}

//! Deduplicating, rate-limited, append-only alert sink.
//!
//! Grounded in the reference `notification.py::send_alert`'s cooldown and
//! fingerprint logic, persisted in the teacher's append-only event log
//! style (`guard-core::event_log`) minus hash chaining and signing — the
//! alerts log is a local diagnostic artifact, not a tamper-evident audit
//! trail.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, warn};

/// Delivery adapter for an out-of-band transport (chat bot, webhook). The
/// actual transport is out of scope for this core; failures here are
/// logged but never propagated to the caller.
pub trait AlertDelivery: Send + Sync {
    fn deliver(&self, formatted: &str);
}

pub struct NullDelivery;
impl AlertDelivery for NullDelivery {
    fn deliver(&self, _formatted: &str) {}
}

struct SinkState {
    last_alert_time: HashMap<String, Instant>,
    fingerprints: HashSet<String>,
    last_cleanup: Instant,
}

pub struct AlertSink {
    log_path: PathBuf,
    cooldown: Duration,
    console: bool,
    log_to_file: bool,
    delivery: Box<dyn AlertDelivery>,
    state: Mutex<SinkState>,
}

const FINGERPRINT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn classify(message: &str) -> String {
    if message.contains("POTENTIAL RANSOMWARE ACTIVITY DETECTED") {
        "RANSOMWARE_DETECTION".to_string()
    } else if message.contains("RECOVERY COMPLETE") {
        "RECOVERY_COMPLETE".to_string()
    } else if message.contains("Isolated process") {
        "PROCESS_ISOLATION".to_string()
    } else if let Some((prefix, _)) = message.split_once(':') {
        prefix.to_string()
    } else {
        message.chars().take(20).collect()
    }
}

fn fingerprint(message: &str) -> String {
    if message.len() > 70 {
        let head: String = message.chars().take(50).collect();
        let tail: String = message.chars().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{head}{tail}")
    } else {
        message.to_string()
    }
}

impl AlertSink {
    pub fn new(log_dir: &Path, cooldown: Duration, console: bool, log_to_file: bool) -> Self {
        AlertSink {
            log_path: log_dir.join("alerts.log"),
            cooldown,
            console,
            log_to_file,
            delivery: Box::new(NullDelivery),
            state: Mutex::new(SinkState {
                last_alert_time: HashMap::new(),
                fingerprints: HashSet::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    pub fn with_delivery(mut self, delivery: Box<dyn AlertDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Emit `message`, applying cooldown and fingerprint dedup. Returns
    /// `false` if the alert was suppressed.
    pub fn send(&self, message: &str) -> bool {
        let now = Instant::now();
        let kind = classify(message);
        let fp = fingerprint(message);

        {
            let mut state = self.state.lock();
            if now.duration_since(state.last_cleanup) > FINGERPRINT_TTL {
                state.fingerprints.clear();
                state.last_cleanup = now;
            }

            if state.fingerprints.contains(&fp) {
                return false;
            }
            if let Some(last) = state.last_alert_time.get(&kind) {
                if now.duration_since(*last) < self.cooldown {
                    return false;
                }
            }

            state.fingerprints.insert(fp);
            state.last_alert_time.insert(kind, now);
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let formatted = format!("[{timestamp}] ALERT: {message}");

        if self.console {
            println!("{}", "!".repeat(80));
            println!("{formatted}");
            println!("{}", "!".repeat(80));
        }
        warn!("{formatted}");

        if self.log_to_file {
            if let Err(e) = self.append_log(&formatted) {
                error!(error = %e, "failed to write alert log");
            }
        }

        self.delivery.deliver(&formatted);
        true
    }

    fn append_log(&self, formatted: &str) -> std::io::Result<()> {
        use std::io::Write;
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{formatted}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_suppresses_repeat_kind() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path(), Duration::from_secs(60), false, true);
        assert!(sink.send("RANSOMWARE_DETECTION: first"));
        assert!(!sink.send("RANSOMWARE_DETECTION: second, different body padded out past seventy chars for a distinct fingerprint"));
    }

    #[test]
    fn fingerprint_dedup_suppresses_identical_message() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path(), Duration::from_millis(1), false, true);
        assert!(sink.send("IDENTICAL MESSAGE"));
        assert!(!sink.send("IDENTICAL MESSAGE"));
    }

    #[test]
    fn distinct_kinds_are_not_cross_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path(), Duration::from_secs(60), false, true);
        assert!(sink.send("RANSOMWARE_DETECTION: a"));
        assert!(sink.send("RECOVERY_COMPLETE: b"));
    }

    #[test]
    fn log_file_contains_one_record_after_suppression() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path(), Duration::from_secs(60), false, true);
        sink.send("RANSOMWARE_DETECTION: first occurrence of the alert");
        sink.send("RANSOMWARE_DETECTION: second occurrence within cooldown window");
        let log = std::fs::read_to_string(dir.path().join("alerts.log")).unwrap();
        assert_eq!(log.matches("ALERT:").count(), 1);
    }
}

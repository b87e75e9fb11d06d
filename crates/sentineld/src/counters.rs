use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters observed through the control surface — the
/// `EngineState` value named in SPEC_FULL.md §9 ("global counters and
/// singletons... map to a process-wide value constructed once at startup
/// and passed explicitly to each component").
#[derive(Default)]
pub struct Counters {
    detections: AtomicU64,
    recoveries: AtomicU64,
}

impl Counters {
    pub fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }
}

//! Hybrid anomaly scorer: weighted linear threshold, rule ensemble, and an
//! optional pre-trained statistical model.

pub mod model;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::event::FeatureVector;
use model::AnomalyModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Threshold,
    Rule,
    Model,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub suspicious: bool,
    pub confidence: f64,
    pub reason: String,
    pub sources: Vec<DetectionSource>,
}

pub struct AnomalyScorer {
    model: Option<AnomalyModel>,
    warned_unavailable: AtomicBool,
}

impl AnomalyScorer {
    pub fn new(model: Option<AnomalyModel>) -> Self {
        AnomalyScorer {
            model,
            warned_unavailable: AtomicBool::new(false),
        }
    }

    fn warn_model_unavailable_once(&self) {
        if self
            .warned_unavailable
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!("anomaly model unavailable; scoring degraded to threshold + rule ensemble");
        }
    }

    fn threshold_score(features: &FeatureVector, cfg: &EngineConfig) -> f64 {
        let op_term = (features.op_rate / cfg.file_op_frequency_threshold) * (cfg.frequency_weight / 100.0);
        let ext_term = (features.ext_changes / cfg.extension_change_threshold.max(1.0))
            * (cfg.extension_weight / 100.0);
        let ent_term = (features.mean_entropy / cfg.entropy_threshold) * (cfg.entropy_weight / 100.0);
        op_term + ext_term + ent_term
    }

    fn rule_positive(features: &FeatureVector) -> bool {
        let FeatureVector {
            op_rate,
            ext_changes,
            mean_entropy,
        } = *features;

        (ext_changes >= 5.0)
            || (op_rate >= 12.0 && ext_changes >= 3.0)
            || (op_rate >= 12.0 && mean_entropy >= 0.8)
            || (ext_changes >= 3.0 && mean_entropy >= 0.85)
    }

    /// Feature-width adapter: the scorer's model always sees a canonical
    /// 3-wide vector, so padding/truncation is a no-op today but keeps the
    /// contract explicit for an extended vector variant per SPEC_FULL.md
    /// design notes.
    fn adapt_width(features: &[f64]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            if let Some(v) = features.get(i) {
                *slot = *v;
            } else {
                debug!(expected = 3, got = features.len(), "feature vector shape mismatch, zero-padded");
            }
        }
        out
    }

    /// `min_events` is the number of events observed in the current op
    /// window; fewer than 3 suppresses detection unconditionally
    /// (SPEC_FULL.md §4.4, "minimum data requirement").
    pub fn score(&self, features: &FeatureVector, recent_event_count: usize, cfg: &EngineConfig) -> Detection {
        if recent_event_count < 3 {
            return Detection {
                suspicious: false,
                confidence: 0.0,
                reason: "not enough recent operations".to_string(),
                sources: vec![],
            };
        }

        let score = Self::threshold_score(features, cfg);
        let threshold_positive = score > cfg.detection_threshold;
        let rule_positive = Self::rule_positive(features);

        let (model_decision, model_positive) = match &self.model {
            Some(model) => model.predict(Self::adapt_width(&features.as_array())),
            None => {
                self.warn_model_unavailable_once();
                (0.0, false)
            }
        };

        let suspicious = if cfg.require_model_confirmation {
            threshold_positive && model_positive
        } else {
            threshold_positive || rule_positive || model_positive
        };

        let ext_bonus = (features.ext_changes * 10.0).min(30.0);
        let confidence = if model_decision < 0.0 {
            50.0 + model_decision.abs() * 50.0 + ext_bonus
        } else {
            50.0 - model_decision * 25.0 + ext_bonus
        }
        .clamp(0.0, 100.0);

        let mut sources = Vec::new();
        if threshold_positive {
            sources.push(DetectionSource::Threshold);
        }
        if rule_positive {
            sources.push(DetectionSource::Rule);
        }
        if model_positive {
            sources.push(DetectionSource::Model);
        }

        let reason = format!(
            "op_rate={:.2}/s ext_changes={} entropy={:.2} score={:.2} model={}",
            features.op_rate,
            features.ext_changes as u32,
            features.mean_entropy,
            score,
            if model_positive { "positive" } else { "negative" }
        );

        Detection {
            suspicious,
            confidence,
            reason,
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn fewer_than_three_events_never_detects() {
        let scorer = AnomalyScorer::new(None);
        let cfg = base_cfg();
        let features = FeatureVector {
            op_rate: 999.0,
            ext_changes: 999.0,
            mean_entropy: 1.0,
        };
        let d = scorer.score(&features, 2, &cfg);
        assert!(!d.suspicious);
    }

    #[test]
    fn rule_one_fires_without_model_confirmation() {
        let scorer = AnomalyScorer::new(None);
        let mut cfg = base_cfg();
        cfg.require_model_confirmation = false;
        let features = FeatureVector {
            op_rate: 0.0,
            ext_changes: 5.0,
            mean_entropy: 0.0,
        };
        let d = scorer.score(&features, 5, &cfg);
        assert!(d.suspicious);
        assert!(d.sources.contains(&DetectionSource::Rule));
    }

    #[test]
    fn model_confirmation_gate_suppresses_rule_only_positive() {
        let scorer = AnomalyScorer::new(None); // no model => model_positive always false
        let mut cfg = base_cfg();
        cfg.require_model_confirmation = true;
        let features = FeatureVector {
            op_rate: 0.0,
            ext_changes: 5.0,
            mean_entropy: 0.0,
        };
        let d = scorer.score(&features, 5, &cfg);
        // rule fires but model can't confirm (no model) and threshold alone
        // doesn't cross 0.6 at these values, so overall verdict is negative.
        assert!(!d.suspicious);
    }

    #[test]
    fn missing_model_degrades_without_failing() {
        let scorer = AnomalyScorer::new(None);
        let cfg = base_cfg();
        let features = FeatureVector {
            op_rate: 1.0,
            ext_changes: 0.0,
            mean_entropy: 0.0,
        };
        let d = scorer.score(&features, 5, &cfg);
        assert!(!d.suspicious);
    }

    #[test]
    fn confidence_bonus_is_capped_at_thirty() {
        let scorer = AnomalyScorer::new(None);
        let cfg = base_cfg();
        let features = FeatureVector {
            op_rate: 0.0,
            ext_changes: 10.0,
            mean_entropy: 0.0,
        };
        let d = scorer.score(&features, 5, &cfg);
        assert!(d.confidence <= 100.0);
    }
}

//! Self-contained stand-in for the reference system's pre-trained
//! `sklearn.ensemble.IsolationForest` + `StandardScaler` artifact.
//!
//! No pickle/joblib loader is feasible from Rust, so the model is a native
//! serializable type following the same two-stage shape (optional
//! standardization, then isolation-forest anomaly scoring) and the same
//! narrow `predict(features) -> (decision_value, anomaly)` contract the
//! spec names. It ships with its own `fit`, so an operator without an
//! external training pipeline can still produce an artifact locally.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const FEATURE_WIDTH: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; FEATURE_WIDTH],
    pub scale: [f64; FEATURE_WIDTH],
}

impl StandardScaler {
    pub fn fit(samples: &[[f64; FEATURE_WIDTH]]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut mean = [0.0; FEATURE_WIDTH];
        for s in samples {
            for i in 0..FEATURE_WIDTH {
                mean[i] += s[i];
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = [0.0; FEATURE_WIDTH];
        for s in samples {
            for i in 0..FEATURE_WIDTH {
                var[i] += (s[i] - mean[i]).powi(2);
            }
        }
        let mut scale = [1.0; FEATURE_WIDTH];
        for i in 0..FEATURE_WIDTH {
            let v = (var[i] / n).sqrt();
            scale[i] = if v > 1e-9 { v } else { 1.0 };
        }

        StandardScaler { mean, scale }
    }

    pub fn transform(&self, features: &[f64; FEATURE_WIDTH]) -> [f64; FEATURE_WIDTH] {
        let mut out = [0.0; FEATURE_WIDTH];
        for i in 0..FEATURE_WIDTH {
            out[i] = (features[i] - self.mean[i]) / self.scale[i];
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf { size: usize },
    Split {
        feature: usize,
        split_value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    root: Node,
    height_limit: u32,
}

impl IsolationTree {
    fn build(
        data: &[[f64; FEATURE_WIDTH]],
        depth: u32,
        height_limit: u32,
        rng: &mut StdRng,
    ) -> Node {
        if depth >= height_limit || data.len() <= 1 {
            return Node::Leaf { size: data.len() };
        }

        let feature = rng.gen_range(0..FEATURE_WIDTH);
        let (min, max) = data.iter().fold((f64::MAX, f64::MIN), |(mn, mx), s| {
            (mn.min(s[feature]), mx.max(s[feature]))
        });
        if !(min < max) {
            return Node::Leaf { size: data.len() };
        }
        let split_value = rng.gen_range(min..max);

        let left: Vec<_> = data.iter().filter(|s| s[feature] < split_value).cloned().collect();
        let right: Vec<_> = data.iter().filter(|s| s[feature] >= split_value).cloned().collect();
        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size: data.len() };
        }

        Node::Split {
            feature,
            split_value,
            left: Box::new(Self::build(&left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build(&right, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(&self, sample: &[f64; FEATURE_WIDTH]) -> f64 {
        fn walk(node: &Node, sample: &[f64; FEATURE_WIDTH], depth: f64) -> f64 {
            match node {
                Node::Leaf { size } => depth + average_path_length(*size),
                Node::Split {
                    feature,
                    split_value,
                    left,
                    right,
                } => {
                    if sample[*feature] < *split_value {
                        walk(left, sample, depth + 1.0)
                    } else {
                        walk(right, sample, depth + 1.0)
                    }
                }
            }
        }
        walk(&self.root, sample, 0.0)
    }
}

/// Average path length of an unsuccessful BST search over `n` items —
/// the standard isolation-forest normalization constant `c(n)`.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * (n - 1.0).ln() + 0.5772156649 - 2.0 * (n - 1.0) / n
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
}

impl IsolationForest {
    /// Train a small forest from scratch. `n_trees` and `sample_size`
    /// follow the usual isolation-forest defaults (100 trees, 256-sample
    /// subsamples) when callers pass 0 for either.
    pub fn fit(samples: &[[f64; FEATURE_WIDTH]], n_trees: usize, sample_size: usize, seed: u64) -> Self {
        let n_trees = if n_trees == 0 { 100 } else { n_trees };
        let sample_size = if sample_size == 0 { 256.min(samples.len().max(1)) } else { sample_size };
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as u32;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(n_trees);
        for _ in 0..n_trees {
            let subsample: Vec<_> = if samples.len() <= sample_size {
                samples.to_vec()
            } else {
                (0..sample_size)
                    .map(|_| samples[rng.gen_range(0..samples.len())])
                    .collect()
            };
            let root = IsolationTree::build(&subsample, 0, height_limit, &mut rng);
            trees.push(IsolationTree { root, height_limit });
        }

        IsolationForest { trees, sample_size }
    }

    /// Anomaly score in `0.0..=1.0`; values near 1 indicate anomalies.
    fn anomaly_score(&self, sample: &[f64; FEATURE_WIDTH]) -> f64 {
        let avg_path: f64 = self.trees.iter().map(|t| t.path_length(sample)).sum::<f64>()
            / self.trees.len().max(1) as f64;
        let c = average_path_length(self.sample_size).max(1e-9);
        2f64.powf(-avg_path / c)
    }

    /// `decision_value` mirrors scikit-learn's `decision_function`: positive
    /// for normal points, negative for anomalies. `anomaly` is the
    /// corresponding boolean verdict (`score > 0.5`, the conventional
    /// isolation-forest cutoff).
    pub fn predict(&self, sample: &[f64; FEATURE_WIDTH]) -> (f64, bool) {
        let score = self.anomaly_score(sample);
        let decision = 0.5 - score;
        (decision, score > 0.5)
    }
}

/// The full artifact: an optional scaler plus the forest, serialized to
/// JSON at a configurable path (SPEC_FULL.md §6, "Model artifact").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyModel {
    pub scaler: Option<StandardScaler>,
    pub forest: IsolationForest,
}

impl AnomalyModel {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Standardize (if a scaler is present) then score. Feature-width
    /// mismatches are handled by the caller (`scorer::adapt_width`); this
    /// method always receives a canonical 3-wide vector.
    pub fn predict(&self, features: [f64; FEATURE_WIDTH]) -> (f64, bool) {
        let scaled = match &self.scaler {
            Some(scaler) => scaler.transform(&features),
            None => features,
        };
        self.forest.predict(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn benign_samples() -> Vec<[f64; FEATURE_WIDTH]> {
        (0..200)
            .map(|i| [1.0 + (i % 3) as f64 * 0.1, 0.0, 0.1])
            .collect()
    }

    #[test]
    fn anomalous_point_scores_lower_decision_than_benign() {
        let samples = benign_samples();
        let forest = IsolationForest::fit(&samples, 50, 64, 7);
        let (benign_decision, _) = forest.predict(&[1.1, 0.0, 0.1]);
        let (anomaly_decision, anomaly_flag) = forest.predict(&[50.0, 20.0, 0.99]);
        assert!(anomaly_decision < benign_decision);
        assert!(anomaly_flag);
    }

    #[test]
    fn scaler_roundtrips_mean_and_scale() {
        let samples: Vec<_> = benign_samples();
        let scaler = StandardScaler::fit(&samples);
        let scaled = scaler.transform(&[1.1, 0.0, 0.1]);
        assert!(scaled[0].abs() < 5.0);
    }

    #[test]
    fn model_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let forest = IsolationForest::fit(&benign_samples(), 10, 32, 1);
        let model = AnomalyModel {
            scaler: Some(StandardScaler::fit(&benign_samples())),
            forest,
        };
        model.save(&path).unwrap();
        let loaded = AnomalyModel::load(&path).unwrap();
        assert_eq!(loaded.predict([1.0, 0.0, 0.1]).1, model.predict([1.0, 0.0, 0.1]).1);
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Flat key=value engine configuration, matching the layout operators edit
/// by hand. Unknown keys are ignored; missing keys fall back to
/// [`EngineConfig::default`] field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub monitoring_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,

    pub file_op_frequency_threshold: f64,
    pub extension_change_threshold: f64,
    pub entropy_threshold: f64,

    pub frequency_weight: f64,
    pub extension_weight: f64,
    pub entropy_weight: f64,

    pub detection_threshold: f64,
    pub require_model_confirmation: bool,

    pub auto_recovery: bool,
    pub recovery_timeout_secs: u64,

    pub enable_console_alerts: bool,
    pub log_alerts: bool,
    pub enable_external_alerts: bool,
    pub external_alert_endpoint: Option<String>,
    pub external_alert_token: Option<String>,

    pub alert_cooldown_secs: u64,
    pub reconcile_interval_secs: u64,

    pub model_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            monitoring_dir: PathBuf::from("./test_directory"),
            backup_dir: PathBuf::from("./backup_directory"),
            log_dir: PathBuf::from("./logs"),

            file_op_frequency_threshold: 10.0,
            extension_change_threshold: 3.0,
            entropy_threshold: 0.8,

            frequency_weight: 30.0,
            extension_weight: 50.0,
            entropy_weight: 20.0,

            detection_threshold: 0.6,
            require_model_confirmation: true,

            auto_recovery: true,
            recovery_timeout_secs: 10,

            enable_console_alerts: true,
            log_alerts: true,
            enable_external_alerts: false,
            external_alert_endpoint: None,
            external_alert_token: None,

            alert_cooldown_secs: 60,
            reconcile_interval_secs: 0,

            model_path: None,
        }
    }
}

impl EngineConfig {
    /// Load a flat `KEY=VALUE` file, ignoring blank lines and `#` comments.
    /// Keys absent from the file keep their default value.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut cfg = EngineConfig::default();
        if !path.exists() {
            return Ok(cfg);
        }
        let text = std::fs::read_to_string(path)?;
        let raw = parse_kv(&text);
        cfg.apply(&raw);
        Ok(cfg)
    }

    fn apply(&mut self, raw: &HashMap<String, String>) {
        macro_rules! set_str {
            ($key:literal, $field:expr) => {
                if let Some(v) = raw.get($key) {
                    $field = v.clone().into();
                }
            };
        }
        macro_rules! set_parse {
            ($key:literal, $field:expr) => {
                if let Some(v) = raw.get($key) {
                    if let Ok(parsed) = v.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        set_str!("MONITORING_DIR", self.monitoring_dir);
        set_str!("BACKUP_DIR", self.backup_dir);
        set_str!("LOG_DIR", self.log_dir);

        set_parse!("FILE_OP_FREQUENCY_THRESHOLD", self.file_op_frequency_threshold);
        set_parse!("EXTENSION_CHANGE_THRESHOLD", self.extension_change_threshold);
        set_parse!("ENTROPY_THRESHOLD", self.entropy_threshold);

        set_parse!("FREQUENCY_WEIGHT", self.frequency_weight);
        set_parse!("EXTENSION_WEIGHT", self.extension_weight);
        set_parse!("ENTROPY_WEIGHT", self.entropy_weight);

        set_parse!("DETECTION_THRESHOLD", self.detection_threshold);
        set_parse!("REQUIRE_MODEL_CONFIRMATION", self.require_model_confirmation);

        set_parse!("AUTO_RECOVERY", self.auto_recovery);
        set_parse!("RECOVERY_TIMEOUT", self.recovery_timeout_secs);

        set_parse!("ENABLE_CONSOLE_ALERTS", self.enable_console_alerts);
        set_parse!("LOG_ALERTS", self.log_alerts);
        set_parse!("ENABLE_EXTERNAL_ALERTS", self.enable_external_alerts);

        if let Some(v) = raw.get("EXTERNAL_ALERT_ENDPOINT") {
            self.external_alert_endpoint = Some(v.clone());
        }
        if let Some(v) = raw.get("EXTERNAL_ALERT_TOKEN") {
            self.external_alert_token = Some(v.clone());
        }

        set_parse!("COOLDOWN", self.alert_cooldown_secs);
        set_parse!("RECONCILE_INTERVAL_SECS", self.reconcile_interval_secs);

        if let Some(v) = raw.get("MODEL_PATH") {
            self.model_path = Some(PathBuf::from(v));
        }
    }
}

fn parse_kv(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            out.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.detection_threshold, 0.6);
        assert_eq!(cfg.recovery_timeout_secs, 10);
        assert!(cfg.require_model_confirmation);
    }

    #[test]
    fn load_overrides_only_present_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentineld.conf");
        std::fs::write(&path, "DETECTION_THRESHOLD=0.9\n# comment\n\nAUTO_RECOVERY=false\n").unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.detection_threshold, 0.9);
        assert!(!cfg.auto_recovery);
        assert_eq!(cfg.recovery_timeout_secs, 10); // unchanged default
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/path/sentineld.conf")).unwrap();
        assert_eq!(cfg.monitoring_dir, PathBuf::from("./test_directory"));
    }
}

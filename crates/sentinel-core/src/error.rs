use std::path::PathBuf;

/// Error taxonomy shared by every core component.
///
/// `IoError` and `NoBackup` surface to callers; `ModelUnavailable` and
/// `FeatureShapeMismatch` are recoverable degradations the scorer applies
/// itself and only logs.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no backup exists for {0}")]
    NoBackup(PathBuf),

    #[error("source file missing: {0}")]
    Missing(PathBuf),

    #[error("anomaly model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("feature vector shape mismatch: expected {expected}, got {got}")]
    FeatureShapeMismatch { expected: usize, got: usize },

    #[error("recovery already in progress")]
    RecoveryBusy,

    #[error("catalog serialization error: {0}")]
    Catalog(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

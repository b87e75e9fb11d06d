use serde::{Deserialize, Serialize};

/// A normalized file-system event, already classified by the dispatcher.
/// Directory events never reach this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Renamed { from: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsEvent {
    pub kind: FsEventKind,
    /// relpath of the current/destination name.
    pub relpath: String,
}

impl FsEvent {
    pub fn created(relpath: impl Into<String>) -> Self {
        FsEvent {
            kind: FsEventKind::Created,
            relpath: relpath.into(),
        }
    }

    pub fn modified(relpath: impl Into<String>) -> Self {
        FsEvent {
            kind: FsEventKind::Modified,
            relpath: relpath.into(),
        }
    }

    pub fn deleted(relpath: impl Into<String>) -> Self {
        FsEvent {
            kind: FsEventKind::Deleted,
            relpath: relpath.into(),
        }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        FsEvent {
            kind: FsEventKind::Renamed { from: from.into() },
            relpath: to.into(),
        }
    }
}

/// The canonical 3-feature behavioral snapshot: operations per second,
/// extension changes in the current window, and mean entropy of recently
/// modified content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub op_rate: f64,
    pub ext_changes: f64,
    pub mean_entropy: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; 3] {
        [self.op_rate, self.ext_changes, self.mean_entropy]
    }
}

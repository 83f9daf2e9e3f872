//! Backup manifest written before any destructive write of a run

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub source: PathBuf,
    pub backup: PathBuf,
}

/// Per-run list of snapshotted files.
///
/// `created` holds targets that did not exist before the run's first write,
/// `restored` is set once the run has been rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupManifest {
    pub files: Vec<BackupEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restored: bool,
}

impl BackupManifest {
    /// True once `source` has been snapshotted or recorded as created
    pub fn covers(&self, source: &Path) -> bool {
        self.files.iter().any(|entry| entry.source == source)
            || self.created.iter().any(|created| created == source)
    }
}

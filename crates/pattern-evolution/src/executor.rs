//! Audited writes with backup and restore
//!
//! Every write to a protected file goes through a run id. Before the first
//! write of a run touches a file, the file's bytes are copied into
//! `<backup_root>/<run_id>/` and recorded in that run's manifest, which is
//! persisted before the destructive write happens. `restore` puts every
//! recorded file back and removes files the run created.
//!
//! The executor is not safe for concurrent writers against the same run id
//! or target file. Callers serialize rounds per target.

use serde::Serialize;
use shared_types::{BackupEntry, BackupManifest};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::ExecutorError;

pub const MANIFEST_FILE: &str = "manifest.json";

/// What a `restore` call put back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    /// Files copied back from their backups
    pub restored: usize,
    /// Files the run created that were deleted
    pub removed: usize,
    /// Sources whose backup had disappeared; these were left as they are
    pub missing: Vec<PathBuf>,
}

impl RestoreSummary {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExecutorError + '_ {
    move |source| ExecutorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write through a temp file in the same directory, then rename over the
/// target
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Resolve symlinks and relative segments for a path that may not exist
/// yet: canonicalize the nearest existing ancestor and re-attach the rest.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut resolved = resolved;
                for part in tail.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = existing.file_name().ok_or(e)?;
                tail.push(name.to_os_string());
                existing = existing
                    .parent()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no existing ancestor"))?;
            }
            Err(e) => return Err(e),
        }
    }
}

fn has_parent_segments(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Backup/apply/restore over a fixed set of allowed root directories
#[derive(Debug, Clone)]
pub struct SafeFileExecutor {
    allowed_roots: Vec<PathBuf>,
    backup_root: PathBuf,
}

impl SafeFileExecutor {
    /// Allowed roots must exist; the backup root is created on demand
    pub fn new<I, P>(allowed_roots: I, backup_root: impl AsRef<Path>) -> Result<Self, ExecutorError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let allowed_roots = allowed_roots
            .into_iter()
            .map(|root| {
                let root = root.as_ref();
                root.canonicalize().map_err(io_error(root))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let backup_root = backup_root.as_ref();
        fs::create_dir_all(backup_root).map_err(io_error(backup_root))?;
        let backup_root = backup_root.canonicalize().map_err(io_error(backup_root))?;
        Ok(Self {
            allowed_roots,
            backup_root,
        })
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Time-ordered run id with a random suffix
    pub fn create_run_id(&self) -> String {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{stamp}_{}", &suffix[..8])
    }

    /// Resolve `path` and check it lies under an allowed root. Returns the
    /// resolved path and its backup location relative to the run directory.
    pub fn authorize(&self, path: &Path) -> Result<(PathBuf, PathBuf), ExecutorError> {
        let resolved = resolve_path(path).map_err(io_error(path))?;
        if has_parent_segments(&resolved) {
            return Err(ExecutorError::PathNotAllowed(path.to_path_buf()));
        }
        for (i, root) in self.allowed_roots.iter().enumerate() {
            if let Ok(rel) = resolved.strip_prefix(root) {
                if rel.as_os_str().is_empty() {
                    break;
                }
                let mirror = if i == 0 {
                    rel.to_path_buf()
                } else {
                    Path::new(&format!("_root{i}")).join(rel)
                };
                return Ok((resolved, mirror));
            }
        }
        Err(ExecutorError::PathNotAllowed(path.to_path_buf()))
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, ExecutorError> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ExecutorError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.backup_root.join(run_id))
    }

    pub fn manifest_path(&self, run_id: &str) -> Result<PathBuf, ExecutorError> {
        Ok(self.run_dir(run_id)?.join(MANIFEST_FILE))
    }

    /// The run's manifest, or an empty one if the run has not written yet
    pub fn load_manifest(&self, run_id: &str) -> Result<BackupManifest, ExecutorError> {
        let path = self.manifest_path(run_id)?;
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|source| ExecutorError::Manifest { path, source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BackupManifest::default()),
            Err(source) => Err(ExecutorError::Io { path, source }),
        }
    }

    fn save_manifest(&self, run_id: &str, manifest: &BackupManifest) -> Result<(), ExecutorError> {
        let path = self.manifest_path(run_id)?;
        let bytes = serde_json::to_vec_pretty(manifest)
            .map_err(|source| ExecutorError::Manifest {
                path: path.clone(),
                source,
            })?;
        write_atomic(&path, &bytes).map_err(io_error(&path))
    }

    /// Snapshot each file into the run's backup area unless the run already
    /// covers it. Files that do not exist yet are recorded as created.
    /// Returns the files copied by this call.
    pub fn backup_files<P: AsRef<Path>>(
        &self,
        files: &[P],
        run_id: &str,
    ) -> Result<Vec<PathBuf>, ExecutorError> {
        let run_dir = self.run_dir(run_id)?;
        let mut manifest = self.load_manifest(run_id)?;
        if manifest.restored {
            return Err(ExecutorError::RunRestored(run_id.to_string()));
        }

        let mut copied = Vec::new();
        let mut changed = false;
        for file in files {
            let (source, mirror) = self.authorize(file.as_ref())?;
            if manifest.covers(&source) {
                debug!(run_id, file = %source.display(), "Already backed up in this run");
                continue;
            }
            if !source.exists() {
                manifest.created.push(source);
                changed = true;
                continue;
            }

            let backup = run_dir.join(mirror);
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::copy(&source, &backup).map_err(io_error(&source))?;
            debug!(run_id, file = %source.display(), backup = %backup.display(), "Backed up file");
            manifest.files.push(BackupEntry {
                source: source.clone(),
                backup,
            });
            copied.push(source);
            changed = true;
        }

        if changed || !self.manifest_path(run_id)?.exists() {
            self.save_manifest(run_id, &manifest)?;
        }
        Ok(copied)
    }

    /// Back up, then replace `file` with pretty-printed JSON
    pub fn apply_json<T: Serialize + ?Sized>(
        &self,
        file: &Path,
        payload: &T,
        run_id: &str,
    ) -> Result<(), ExecutorError> {
        let bytes = serde_json::to_vec_pretty(payload)?;
        self.apply_bytes(file, &bytes, run_id)
    }

    /// Back up, then replace `file` with `content`
    pub fn apply_text(&self, file: &Path, content: &str, run_id: &str) -> Result<(), ExecutorError> {
        self.apply_bytes(file, content.as_bytes(), run_id)
    }

    fn apply_bytes(&self, file: &Path, bytes: &[u8], run_id: &str) -> Result<(), ExecutorError> {
        self.backup_files(&[file], run_id)?;
        let (target, _) = self.authorize(file)?;
        write_atomic(&target, bytes).map_err(io_error(&target))?;
        info!(run_id, file = %target.display(), bytes = bytes.len(), "Applied write");
        Ok(())
    }

    /// Copy every backup of the run over its source and delete the files
    /// the run created. Safe to call when nothing was applied. Returns the
    /// number of files put back.
    pub fn restore(&self, run_id: &str) -> Result<RestoreSummary, ExecutorError> {
        let manifest_path = self.manifest_path(run_id)?;
        let mut summary = RestoreSummary::default();
        if !manifest_path.exists() {
            debug!(run_id, "Nothing to restore");
            return Ok(summary);
        }
        let mut manifest = self.load_manifest(run_id)?;

        for entry in &manifest.files {
            self.authorize(&entry.source)?;
            let bytes = match fs::read(&entry.backup) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(run_id, backup = %entry.backup.display(), "Backup missing, skipping");
                    summary.missing.push(entry.source.clone());
                    continue;
                }
                Err(source) => {
                    return Err(ExecutorError::Io {
                        path: entry.backup.clone(),
                        source,
                    })
                }
            };
            write_atomic(&entry.source, &bytes).map_err(io_error(&entry.source))?;
            summary.restored += 1;
        }
        for created in &manifest.created {
            self.authorize(created)?;
            match fs::remove_file(created) {
                Ok(()) => {
                    debug!(run_id, file = %created.display(), "Removed file created by run");
                    summary.removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ExecutorError::Io {
                        path: created.clone(),
                        source,
                    })
                }
            }
        }

        manifest.restored = true;
        self.save_manifest(run_id, &manifest)?;
        info!(
            run_id,
            restored = summary.restored,
            removed = summary.removed,
            missing = summary.missing.len(),
            "Restored run"
        );
        Ok(summary)
    }
}

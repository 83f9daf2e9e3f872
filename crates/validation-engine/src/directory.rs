//! Directory scanning and report persistence

use serde::Serialize;
use shared_types::{Report, ReportStatus, Summary};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Suffix of documents produced by the extractor
pub const DOCUMENT_SUFFIX: &str = "_extracted_revised.json";
/// Suffix of per-document failure reports
pub const REPORT_SUFFIX: &str = "_validation_report.json";
pub const SUMMARY_FILE: &str = "validation_summary.json";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ValidationError + '_ {
    move |source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Extracted documents in `dir`, sorted by file name
pub fn document_files(dir: &Path) -> Result<Vec<PathBuf>, ValidationError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let is_document = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(DOCUMENT_SUFFIX));
        if is_document && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Where the failure report for a document file is written
pub fn report_path_for(json_path: &Path) -> PathBuf {
    let name = json_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(DOCUMENT_SUFFIX) {
        Some(stem) => json_path.with_file_name(format!("{stem}{REPORT_SUFFIX}")),
        None => json_path.with_extension("validation_report.json"),
    }
}

/// Local time, RFC 3339 with whole seconds
pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

fn write_json<T: Serialize>(path: &Path, payload: &T) -> Result<(), ValidationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let content = serde_json::to_string_pretty(payload).map_err(|source| ValidationError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(io_error(path))
}

/// Write `validation_summary.json` into `dir`
pub fn write_summary(dir: &Path, summary: &Summary) -> Result<PathBuf, ValidationError> {
    let path = dir.join(SUMMARY_FILE);
    write_json(&path, summary)?;
    Ok(path)
}

/// Write one report file per non-passing report, next to its document.
/// Returns the paths written.
pub fn write_failure_reports(dir: &Path, reports: &[Report]) -> Result<Vec<PathBuf>, ValidationError> {
    let mut written = Vec::new();
    for report in reports {
        if report.status == ReportStatus::Pass || report.context.json_filename.is_empty() {
            continue;
        }
        let path = report_path_for(&dir.join(&report.context.json_filename));
        write_json(&path, report)?;
        debug!(path = %path.display(), status = report.status.as_str(), "Wrote failure report");
        written.push(path);
    }
    Ok(written)
}

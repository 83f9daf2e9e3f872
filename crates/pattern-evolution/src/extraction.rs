//! Extraction collaborator and the bounded worker pool that drives it
//!
//! OCR and field extraction live outside this crate. The service is owned
//! by the caller and passed by reference; any internal model handle it
//! holds is its own concern to guard.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use validation_engine::DOCUMENT_SUFFIX;

use crate::error::ExtractionError;

/// Extension of source files handed to the extractor
pub const SOURCE_EXTENSION: &str = "pdf";

#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Extract one source file into a document JSON object
    async fn extract(&self, source: &Path) -> Result<Value, ExtractionError>;
}

/// Source files in `dir`, sorted by name
pub fn source_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ExtractionError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ExtractionError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if is_source && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<output_dir>/<stem>_extracted_revised.json`
pub fn output_path_for(output_dir: &Path, source: &Path) -> PathBuf {
    output_dir.join(format!("{}{DOCUMENT_SUFFIX}", file_stem(source)))
}

/// Per-source outcome, keyed by source file name
pub type BatchOutcome = BTreeMap<String, Result<PathBuf, ExtractionError>>;

/// Extract every source into `output_dir` with at most `workers` in
/// flight. Results are keyed by file name; completion order is irrelevant.
#[instrument(skip(service, sources, output_dir), fields(count = sources.len()))]
pub async fn extract_batch<S>(
    service: &S,
    sources: &[PathBuf],
    output_dir: &Path,
    workers: usize,
) -> BatchOutcome
where
    S: ExtractionService + ?Sized,
{
    let workers = workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));

    let jobs: Vec<_> = sources
        .iter()
        .map(|source| {
            let sem = semaphore.clone();
            async move {
                let name = file_name(source);
                let result = match sem.acquire().await {
                    Ok(_permit) => extract_one(service, source, output_dir).await,
                    Err(_) => Err(ExtractionError::Failed {
                        source_path: source.clone(),
                        message: "worker pool closed".to_string(),
                    }),
                };
                (name, result)
            }
        })
        .collect();

    let results: Vec<(String, Result<PathBuf, ExtractionError>)> =
        stream::iter(jobs).buffer_unordered(workers).collect().await;

    let outcome: BatchOutcome = results.into_iter().collect();
    let failed = outcome.values().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!(failed, total = outcome.len(), "Some extractions failed");
    }
    outcome
}

async fn extract_one<S>(service: &S, source: &Path, output_dir: &Path) -> Result<PathBuf, ExtractionError>
where
    S: ExtractionService + ?Sized,
{
    let document = service.extract(source).await?;
    let output = output_path_for(output_dir, source);
    let bytes = serde_json::to_vec_pretty(&document).map_err(|e| ExtractionError::Failed {
        source_path: source.to_path_buf(),
        message: e.to_string(),
    })?;
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| ExtractionError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;
    tokio::fs::write(&output, bytes)
        .await
        .map_err(|source| ExtractionError::Io {
            path: output.clone(),
            source,
        })?;
    debug!(source = %source.display(), output = %output.display(), "Extracted document");
    Ok(output)
}

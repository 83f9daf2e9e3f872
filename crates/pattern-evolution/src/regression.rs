//! Labeled-sample regression gate
//!
//! A samples directory holds source files and, for some of them, a
//! `<stem>_truth.json` sidecar listing the fields the extractor must
//! reproduce. The runner extracts every source into a scratch directory and
//! diffs each output against its truth.

use serde_json::{Map, Value};
use shared_types::{
    CaseStatus, FieldDiff, RegressionCase, RegressionResult, RegressionStatus,
    EXTRACTED_TEXT_FIELD,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::error::{ExtractionError, RegressionError};
use crate::extraction::{extract_batch, file_name, file_stem, source_files, ExtractionService};

pub const TRUTH_SUFFIX: &str = "_truth.json";
pub const DEFAULT_OUTPUT_DIR: &str = "regression_outputs";

pub const REASON_NO_SAMPLES: &str = "no_samples";
pub const REASON_MISSING_TRUTH: &str = "missing_truth";
pub const REASON_MISSING_OUTPUT: &str = "missing_output";
pub const REASON_INVALID_OUTPUT: &str = "invalid_output";

#[derive(Debug, Clone)]
pub struct RegressionRunner {
    samples_dir: PathBuf,
    output_dir: Option<PathBuf>,
    workers: usize,
}

impl RegressionRunner {
    pub fn new(samples_dir: impl Into<PathBuf>) -> Self {
        Self {
            samples_dir: samples_dir.into(),
            output_dir: None,
            workers: 1,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.samples_dir.join(DEFAULT_OUTPUT_DIR))
    }

    #[instrument(skip(self, service), fields(samples = %self.samples_dir.display()))]
    pub async fn run<S>(&self, service: &S) -> Result<RegressionResult, RegressionError>
    where
        S: ExtractionService + ?Sized,
    {
        let sources = source_files(&self.samples_dir).map_err(|e| match e {
            ExtractionError::Io { path, source } => RegressionError::Io { path, source },
            other => RegressionError::Io {
                path: self.samples_dir.clone(),
                source: std::io::Error::other(other.to_string()),
            },
        })?;
        if sources.is_empty() {
            info!("No regression samples, skipping");
            return Ok(RegressionResult::skipped(REASON_NO_SAMPLES));
        }

        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir).map_err(|source| RegressionError::Io {
            path: output_dir.clone(),
            source,
        })?;
        let outputs = extract_batch(service, &sources, &output_dir, self.workers).await;

        let mut cases = Vec::with_capacity(sources.len());
        for source in &sources {
            let name = file_name(source);
            let truth_path = self
                .samples_dir
                .join(format!("{}{TRUTH_SUFFIX}", file_stem(source)));
            if !truth_path.exists() {
                cases.push(RegressionCase::with_reason(
                    &name,
                    CaseStatus::Skipped,
                    REASON_MISSING_TRUTH,
                ));
                continue;
            }
            let truth = read_json(&truth_path)?;

            let output_path = match outputs.get(&name) {
                Some(Ok(path)) if path.exists() => path,
                Some(Err(e)) => {
                    warn!(file = %name, "Extraction failed: {}", e);
                    cases.push(missing_output(&name));
                    continue;
                }
                _ => {
                    cases.push(missing_output(&name));
                    continue;
                }
            };
            let output = match read_json(output_path) {
                Ok(Value::Object(map)) => map,
                _ => {
                    cases.push(RegressionCase::with_reason(
                        &name,
                        CaseStatus::Failed,
                        REASON_INVALID_OUTPUT,
                    ));
                    continue;
                }
            };

            let diffs = compare_truth(&output, &truth);
            if diffs.is_empty() {
                cases.push(RegressionCase::passed(&name));
            } else {
                cases.push(RegressionCase::failed_with_diffs(&name, diffs));
            }
        }

        let passed = cases.iter().filter(|c| c.status == CaseStatus::Passed).count();
        let failed = cases.iter().filter(|c| c.status == CaseStatus::Failed).count();
        info!(total = sources.len(), passed, failed, "Regression finished");
        Ok(RegressionResult {
            status: RegressionStatus::Done,
            reason: None,
            total: sources.len(),
            passed,
            failed,
            cases,
        })
    }
}

fn missing_output(name: &str) -> RegressionCase {
    RegressionCase::with_reason(name, CaseStatus::Failed, REASON_MISSING_OUTPUT)
}

fn read_json(path: &Path) -> Result<Value, RegressionError> {
    let content = fs::read_to_string(path).map_err(|source| RegressionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| RegressionError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// One diff per truth key whose value differs in the output. The raw text
/// payload is never compared.
pub fn compare_truth(output: &Map<String, Value>, truth: &Value) -> Vec<FieldDiff> {
    let Some(truth) = truth.as_object() else {
        return Vec::new();
    };
    truth
        .iter()
        .filter(|(key, _)| key.as_str() != EXTRACTED_TEXT_FIELD)
        .filter_map(|(key, expected)| {
            let actual = output.get(key).unwrap_or(&Value::Null);
            (!json_equal(expected, actual)).then(|| FieldDiff {
                field: key.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            })
        })
        .collect()
}

/// Structural equality where `1` and `1.0` are the same number
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

//! Labeled-sample regression results

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub expected: Value,
    pub actual: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionCase {
    pub file: String,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffs: Option<Vec<FieldDiff>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RegressionCase {
    pub fn passed(file: &str) -> Self {
        Self {
            file: file.to_string(),
            status: CaseStatus::Passed,
            diffs: None,
            reason: None,
        }
    }

    pub fn failed_with_diffs(file: &str, diffs: Vec<FieldDiff>) -> Self {
        Self {
            file: file.to_string(),
            status: CaseStatus::Failed,
            diffs: Some(diffs),
            reason: None,
        }
    }

    pub fn with_reason(file: &str, status: CaseStatus, reason: &str) -> Self {
        Self {
            file: file.to_string(),
            status,
            diffs: None,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegressionStatus {
    Done,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub status: RegressionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cases: Vec<RegressionCase>,
}

impl RegressionResult {
    pub fn skipped(reason: &str) -> Self {
        Self {
            status: RegressionStatus::Skipped,
            reason: Some(reason.to_string()),
            total: 0,
            passed: 0,
            failed: 0,
            cases: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Key holding the raw OCR/text payload of an extracted document
pub const EXTRACTED_TEXT_FIELD: &str = "extracted_text";

/// Key holding the classifier's document type
pub const DOCUMENT_TYPE_FIELD: &str = "document_type";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentShapeError {
    #[error("document root must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// An extracted document: field name -> value, plus `document_type` and
/// `extracted_text`. Read-only to the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn from_value(value: Value) -> Result<Self, DocumentShapeError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DocumentShapeError::NotAnObject(json_kind(&other))),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// `document_type` when it is a string
    pub fn document_type(&self) -> Option<&str> {
        self.str_field(DOCUMENT_TYPE_FIELD)
    }

    pub fn extracted_text(&self) -> Option<&str> {
        self.str_field(EXTRACTED_TEXT_FIELD)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// True when the field is absent, null, or a whitespace-only string
    pub fn is_missing_or_blank(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Copy of the fields with the raw text payload removed
    pub fn without_extracted_text(&self) -> Map<String, Value> {
        let mut fields = self.fields.clone();
        fields.remove(EXTRACTED_TEXT_FIELD);
        fields
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One validation outcome (error or warning)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl Finding {
    pub fn new(code: impl Into<String>, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            field: field.map(str::to_string),
            message: message.into(),
            rule: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

/// Verdict for one document.
///
/// `FailHuman` is terminal: automated repair never touches it again.
/// `FailLlm` is repair-eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pass,
    FailLlm,
    FailHuman,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pass => "PASS",
            ReportStatus::FailLlm => "FAIL_LLM",
            ReportStatus::FailHuman => "FAIL_HUMAN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::FailHuman)
    }

    pub fn is_repairable(&self) -> bool {
        matches!(self, ReportStatus::FailLlm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContext {
    pub pdf_filename: Option<String>,
    pub json_filename: String,
    pub extracted_text_preview: String,
}

/// Per-document validation report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub status: ReportStatus,
    pub document_type: String,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub context: ReportContext,
    pub spec_version: Option<String>,
}

impl Report {
    pub fn error_codes(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|f| f.code.as_str())
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.error_codes().any(|c| c == code)
    }

    /// Move a repair-eligible report to `FailHuman`, appending the finding
    /// that explains why. Returns false (and changes nothing) for any other
    /// status.
    pub fn escalate(&mut self, finding: Finding) -> bool {
        if self.status != ReportStatus::FailLlm {
            return false;
        }
        self.status = ReportStatus::FailHuman;
        self.errors.push(finding);
        true
    }
}

/// Aggregate over a document set. Rebuilt from reports, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub spec_version: Option<String>,
    pub dir: String,
    pub total: usize,
    pub pass: usize,
    pub fail_human: usize,
    pub fail_llm: usize,
    pub errors_by_code: BTreeMap<String, usize>,
    pub generated_at: String,
}

impl Summary {
    /// Aggregate counts only, so report order does not matter
    pub fn from_reports(
        spec_version: Option<String>,
        dir: impl Into<String>,
        generated_at: impl Into<String>,
        reports: &[Report],
    ) -> Self {
        let mut summary = Self {
            spec_version,
            dir: dir.into(),
            total: 0,
            pass: 0,
            fail_human: 0,
            fail_llm: 0,
            errors_by_code: BTreeMap::new(),
            generated_at: generated_at.into(),
        };
        for report in reports {
            summary.total += 1;
            match report.status {
                ReportStatus::Pass => summary.pass += 1,
                ReportStatus::FailLlm => summary.fail_llm += 1,
                ReportStatus::FailHuman => summary.fail_human += 1,
            }
            for code in report.error_codes() {
                *summary.errors_by_code.entry(code.to_string()).or_insert(0) += 1;
            }
        }
        summary
    }

    /// Status and error-code counts, ignoring directory and timestamp
    pub fn same_counts(&self, other: &Summary) -> bool {
        self.total == other.total
            && self.pass == other.pass
            && self.fail_human == other.fail_human
            && self.fail_llm == other.fail_llm
            && self.errors_by_code == other.errors_by_code
    }
}

//! Spec-driven validation of extracted financial documents
//!
//! A document is checked in a fixed order: shape, document type, extracted
//! text, schema lookup, required fields, optional fields, then the rule
//! bound to each field. The structural checks (the first three) finalize the
//! report as `FAIL_HUMAN` immediately; every later finding is repairable
//! and yields `FAIL_LLM`.

pub mod directory;
pub mod patterns;
pub mod repair;
pub mod rules;
pub mod spec;

pub use directory::{
    report_path_for, timestamp, write_failure_reports, write_summary, ValidationError, DOCUMENT_SUFFIX,
    REPORT_SUFFIX, SUMMARY_FILE,
};
pub use repair::{build_fix_prompt, ChatMessage, FixPrompt, DEFAULT_FIX_TEXT_LEN};
pub use spec::{FieldRule, RuleKind, Spec, SpecError};

use chrono::NaiveDate;
use serde_json::Value;
use shared_types::{
    Document, DocumentShapeError, Finding, Report, ReportContext, ReportStatus, Summary,
    EXTRACTED_TEXT_FIELD,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Codes the engine emits without consulting the spec
pub const SCHEMA_NOT_FOUND: &str = "SCHEMA_NOT_FOUND";
pub const REQUIRED_FIELD_MISSING: &str = "REQUIRED_FIELD_MISSING";
pub const REQUIRED_FIELD_EMPTY: &str = "REQUIRED_FIELD_EMPTY";

/// Default number of characters of `extracted_text` kept in a report
pub const DEFAULT_PREVIEW_LEN: usize = 1000;

/// Why a document file could not be turned into a `Document`
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] DocumentShapeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Reference date for relative date windows
    pub today: NaiveDate,
    pub preview_len: usize,
}

impl ValidationOptions {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            preview_len: DEFAULT_PREVIEW_LEN,
        }
    }

    pub fn with_preview_len(mut self, preview_len: usize) -> Self {
        self.preview_len = preview_len;
        self
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }
}

/// Validate a single document value with default options
pub fn validate(document: &Value, spec: &Spec, today: NaiveDate) -> Report {
    ValidationEngine::new(spec, ValidationOptions::new(today)).validate_value(document, "", None)
}

/// First `limit` characters of `text`
pub fn preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Validation entry point. Holds the spec by reference; validating never
/// mutates the spec or the inputs.
pub struct ValidationEngine<'a> {
    spec: &'a Spec,
    options: ValidationOptions,
}

impl<'a> ValidationEngine<'a> {
    pub fn new(spec: &'a Spec, options: ValidationOptions) -> Self {
        Self { spec, options }
    }

    pub fn spec(&self) -> &'a Spec {
        self.spec
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Read, parse and validate one document file. Unreadable or malformed
    /// files produce a structural `FAIL_HUMAN` report rather than an error.
    pub fn validate_file(&self, path: &Path, pdf_path: Option<&Path>) -> Report {
        let json_filename = file_name(path);
        let pdf_filename = pdf_path.map(file_name);
        let rules = &self.spec.global_rules;

        match read_document(path) {
            Ok(document) => {
                self.validate_document(&document, &json_filename, pdf_filename.as_deref())
            }
            Err(DocumentError::Shape(e)) => {
                debug!(file = %json_filename, "Document root is not an object: {}", e);
                self.structural(
                    &rules.unknown_document_type,
                    Finding::new(&rules.root_not_object_code, None, e.to_string())
                        .with_rule("root_must_be_object"),
                    &json_filename,
                    pdf_filename.as_deref(),
                )
            }
            Err(e) => {
                debug!(file = %json_filename, "Document could not be parsed: {}", e);
                self.structural(
                    &rules.unknown_document_type,
                    Finding::new(&rules.json_parse_code, None, e.to_string())
                        .with_rule("json_must_parse"),
                    &json_filename,
                    pdf_filename.as_deref(),
                )
            }
        }
    }

    /// Validate an already-parsed JSON value
    pub fn validate_value(
        &self,
        value: &Value,
        json_filename: &str,
        pdf_filename: Option<&str>,
    ) -> Report {
        match Document::from_value(value.clone()) {
            Ok(document) => self.validate_document(&document, json_filename, pdf_filename),
            Err(e) => {
                let rules = &self.spec.global_rules;
                self.structural(
                    &rules.unknown_document_type,
                    Finding::new(&rules.root_not_object_code, None, e.to_string())
                        .with_rule("root_must_be_object"),
                    json_filename,
                    pdf_filename,
                )
            }
        }
    }

    pub fn validate_document(
        &self,
        document: &Document,
        json_filename: &str,
        pdf_filename: Option<&str>,
    ) -> Report {
        let rules = &self.spec.global_rules;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // A missing or non-string type is treated as the "unknown" type
        let document_type = document
            .document_type()
            .unwrap_or(rules.unknown_document_type.as_str());

        if document_type == rules.unknown_document_type {
            return self.structural(
                document_type,
                Finding::new(
                    &rules.unknown_document_type_code,
                    Some("document_type"),
                    "document_type is unknown, needs manual review",
                )
                .with_rule("document_type_unknown_is_human"),
                json_filename,
                pdf_filename,
            );
        }

        if !rules.allows_document_type(document_type) {
            errors.push(
                Finding::new(
                    &rules.document_type_invalid_code,
                    Some("document_type"),
                    format!("document_type is not allowed: {document_type}"),
                )
                .with_rule("document_type_enum"),
            );
        }

        let text = match document.extracted_text() {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                return self.structural(
                    document_type,
                    Finding::new(
                        &rules.extracted_text_empty_code,
                        Some(EXTRACTED_TEXT_FIELD),
                        "extracted_text is missing or blank, needs manual review",
                    )
                    .with_rule("extracted_text_trim_nonempty"),
                    json_filename,
                    pdf_filename,
                );
            }
        };

        if let Some(short) = &rules.text_too_short {
            let len = text.chars().count();
            if len < short.threshold_len {
                warnings.push(
                    Finding::new(
                        &short.warning_code,
                        Some(short.field.as_str()),
                        format!("extracted_text is shorter than {}", short.threshold_len),
                    )
                    .with_rule("warnings.text_too_short"),
                );
            }
        }

        let context = ReportContext {
            pdf_filename: pdf_filename.map(str::to_string),
            json_filename: json_filename.to_string(),
            extracted_text_preview: preview(text, self.options.preview_len),
        };

        let Some(schema) = self.spec.schema(document_type) else {
            errors.push(
                Finding::new(
                    SCHEMA_NOT_FOUND,
                    Some("document_type"),
                    format!("no schema for document_type {document_type}"),
                )
                .with_rule("document_schemas"),
            );
            return self.finalize(document_type, errors, warnings, context);
        };

        for field in &schema.required_fields {
            if !document.contains(field) {
                errors.push(
                    Finding::new(
                        REQUIRED_FIELD_MISSING,
                        Some(field.as_str()),
                        format!("{document_type} is missing required field {field}"),
                    )
                    .with_rule("required_fields"),
                );
            } else if document.is_missing_or_blank(field) {
                errors.push(
                    Finding::new(
                        REQUIRED_FIELD_EMPTY,
                        Some(field.as_str()),
                        format!("{document_type} required field {field} is empty"),
                    )
                    .with_rule("required_fields"),
                );
            }
        }

        for optional in &schema.optional_fields {
            let Some(code) = &optional.warning_code else {
                continue;
            };
            if document.is_missing_or_blank(&optional.field) {
                warnings.push(
                    Finding::new(
                        code,
                        Some(optional.field.as_str()),
                        format!("{document_type} optional field {} is empty", optional.field),
                    )
                    .with_rule("optional_fields"),
                );
            }
        }

        for (field, binding) in &schema.field_bindings {
            if !document.contains(field) {
                continue;
            }
            let findings = rules::evaluate_binding(
                self.spec,
                document,
                document_type,
                field,
                binding,
                self.options.today,
            );
            errors.extend(findings.errors);
            warnings.extend(findings.warnings);
        }

        self.finalize(document_type, errors, warnings, context)
    }

    /// Display label from the spec's `status_model`. Serialized reports
    /// always carry the canonical status.
    pub fn status_label(&self, status: ReportStatus) -> &str {
        self.spec.status_model.label(status)
    }

    /// Validate every `*_extracted_revised.json` in `dir`, in file name order
    pub fn validate_directory(&self, dir: &Path) -> Result<(Summary, Vec<Report>), ValidationError> {
        let files = directory::document_files(dir)?;
        let reports: Vec<Report> = files
            .iter()
            .map(|path| {
                let report = self.validate_file(path, None);
                debug!(
                    file = %report.context.json_filename,
                    status = self.status_label(report.status),
                    errors = report.errors.len(),
                    "Validated document"
                );
                report
            })
            .collect();

        let summary = Summary::from_reports(
            self.spec.spec_version.clone(),
            dir.display().to_string(),
            directory::timestamp(),
            &reports,
        );
        info!(
            dir = %dir.display(),
            total = summary.total,
            pass = summary.pass,
            fail_llm = summary.fail_llm,
            fail_human = summary.fail_human,
            "Validated directory"
        );
        Ok((summary, reports))
    }

    fn finalize(
        &self,
        document_type: &str,
        errors: Vec<Finding>,
        warnings: Vec<Finding>,
        context: ReportContext,
    ) -> Report {
        let status = if errors.is_empty() {
            ReportStatus::Pass
        } else {
            ReportStatus::FailLlm
        };
        Report {
            status,
            document_type: document_type.to_string(),
            errors,
            warnings,
            context,
            spec_version: self.spec.spec_version.clone(),
        }
    }

    /// Terminal report carrying exactly one finding
    fn structural(
        &self,
        document_type: &str,
        finding: Finding,
        json_filename: &str,
        pdf_filename: Option<&str>,
    ) -> Report {
        Report {
            status: ReportStatus::FailHuman,
            document_type: document_type.to_string(),
            errors: vec![finding],
            warnings: Vec::new(),
            context: ReportContext {
                pdf_filename: pdf_filename.map(str::to_string),
                json_filename: json_filename.to_string(),
                extracted_text_preview: String::new(),
            },
            spec_version: self.spec.spec_version.clone(),
        }
    }
}

/// Read and parse a document file
pub fn read_document(path: &Path) -> Result<Document, DocumentError> {
    let content = fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content)?;
    Ok(Document::from_value(value)?)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

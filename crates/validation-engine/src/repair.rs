//! Chat input for repairing a `FAIL_LLM` document
//!
//! The builder only prepares the messages; sending them to a model and
//! re-validating the answer happens outside this crate.

use serde::{Deserialize, Serialize};
use shared_types::{Finding, Report, ReportStatus};
use std::path::Path;
use tracing::debug;

use crate::{preview, read_document, Spec};

/// Default number of `extracted_text` characters shown to the model
pub const DEFAULT_FIX_TEXT_LEN: usize = 8000;

const SYSTEM_PROMPT: &str =
    "You are a strict repair assistant for financial document JSON. Your output is validated again by a program.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPromptMeta {
    pub fix_text_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPrompt {
    pub spec_version: Option<String>,
    pub spec_path: Option<String>,
    pub json_filename: String,
    pub document_type: String,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub messages: Vec<ChatMessage>,
    pub meta: FixPromptMeta,
}

/// Build the (system, user) chat input for one report.
///
/// Returns `None` unless the report is `FAIL_LLM` and its document can be
/// read back from `json_dir`.
pub fn build_fix_prompt(
    report: &Report,
    json_dir: &Path,
    spec: &Spec,
    spec_path: Option<&Path>,
    fix_text_len: usize,
) -> Option<FixPrompt> {
    if report.status != ReportStatus::FailLlm || report.context.json_filename.is_empty() {
        return None;
    }
    let json_filename = &report.context.json_filename;
    let document = match read_document(&json_dir.join(json_filename)) {
        Ok(document) => document,
        Err(e) => {
            debug!(file = %json_filename, "Skipping fix prompt: {}", e);
            return None;
        }
    };

    let text = preview(document.extracted_text().unwrap_or(""), fix_text_len);
    let current_json = serde_json::to_string_pretty(&document.without_extracted_text()).ok()?;
    let errors_json = serde_json::to_string_pretty(&report.errors).ok()?;
    let warnings_json = serde_json::to_string_pretty(&report.warnings).ok()?;
    let spec_path = spec_path.map(|p| p.display().to_string());

    let user_prompt = [
        "Goal: using extracted_text as the only source of truth, correct current_json so that it passes the validation rules. Never invent values.".to_string(),
        "Output: only the corrected JSON object, no Markdown, no code fences, no explanation.".to_string(),
        "Constraints:".to_string(),
        "- Do not change document_type.".to_string(),
        "- Only fill or correct a field when extracted_text clearly contains the value; otherwise keep the current value even if it fails again.".to_string(),
        "- Required fields must be non-empty after trimming.".to_string(),
        "- Names may not contain whitespace outside brackets; whitespace inside brackets is fine.".to_string(),
        String::new(),
        format!("spec_version: {}", spec.spec_version.as_deref().unwrap_or("-")),
        format!("spec_path: {}", spec_path.as_deref().unwrap_or("-")),
        String::new(),
        "validation_errors:".to_string(),
        errors_json,
        String::new(),
        "validation_warnings:".to_string(),
        warnings_json,
        String::new(),
        "extracted_text_truncated:".to_string(),
        text,
        String::new(),
        "current_json (extracted_text removed):".to_string(),
        current_json,
    ]
    .join("\n");

    Some(FixPrompt {
        spec_version: spec.spec_version.clone(),
        spec_path,
        json_filename: json_filename.clone(),
        document_type: report.document_type.clone(),
        errors: report.errors.clone(),
        warnings: report.warnings.clone(),
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_prompt)],
        meta: FixPromptMeta { fix_text_len },
    })
}

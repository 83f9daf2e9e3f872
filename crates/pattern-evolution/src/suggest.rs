//! Mutation suggestions from a language model
//!
//! The model sees failing reports and answers with override rules. Its
//! reply is untrusted text: it is re-parsed here and every candidate still
//! goes through the mutation engine's checks.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::{Finding, Mutation, Report, APPEND_OVERRIDE_REGEX};
use std::collections::BTreeSet;
use tracing::debug;
use validation_engine::{preview, ChatMessage};

use crate::error::SuggestionError;

const SYSTEM_PROMPT: &str = "You are an assistant that corrects invoice field-extraction rules.";

#[async_trait]
pub trait MutationSuggester: Send + Sync {
    /// Send the chat messages and return the raw reply text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SuggestionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PromptCase<'a> {
    document_type: &'a str,
    errors: &'a [Finding],
    extracted_text_preview: String,
}

/// Build the (system, user) messages for up to `max_cases` repairable
/// reports. Returns `None` when there is nothing to ask about.
pub fn build_suggestion_messages(
    reports: &[Report],
    max_cases: usize,
    preview_len: usize,
) -> Option<Vec<ChatMessage>> {
    let cases: Vec<PromptCase<'_>> = reports
        .iter()
        .filter(|r| r.status.is_repairable())
        .take(max_cases)
        .map(|r| PromptCase {
            document_type: &r.document_type,
            errors: &r.errors,
            extracted_text_preview: preview(&r.context.extracted_text_preview, preview_len),
        })
        .collect();
    if cases.is_empty() {
        return None;
    }

    let payload = json!({
        "task": "Propose rules to append to field_patterns_overrides in patterns.json",
        "output_schema": [{
            "action": APPEND_OVERRIDE_REGEX,
            "doc_type": "common",
            "field": "payer",
            "id": "unique_id",
            "priority": 500,
            "regex": "regex_here"
        }],
        "notes": [
            "Output a JSON array only",
            "Each rule only adds a field-extraction regex",
            "No explanatory text",
            "Prefer common fields; use bank_receipt only when needed"
        ],
        "cases": cases,
    });
    let content = serde_json::to_string_pretty(&payload).ok()?;
    Some(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(content)])
}

/// Parse a reply as whole-text JSON, else the outermost `{...}` or `[...]`
/// span, trying the one that opens first.
pub fn parse_json_reply(text: &str) -> Option<Value> {
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }
    let mut spans: Vec<(usize, usize)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| Some((raw.find(open)?, raw.rfind(close)?)))
        .filter(|(start, end)| end > start)
        .collect();
    // The span opening first encloses the other one
    spans.sort();
    spans
        .into_iter()
        .find_map(|(start, end)| serde_json::from_str(&raw[start..=end]).ok())
}

/// Mutation candidates in a reply: a bare array, or an object's
/// `mutations` array. Non-object items and items that do not deserialize
/// are dropped.
pub fn mutations_from_reply(text: &str) -> Result<Vec<Mutation>, SuggestionError> {
    let items = match parse_json_reply(text).ok_or(SuggestionError::Unparseable)? {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("mutations") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| match serde_json::from_value::<Mutation>(item) {
            Ok(m) => Some(m),
            Err(e) => {
                debug!("Dropping malformed suggestion: {}", e);
                None
            }
        })
        .collect())
}

/// Keep the first candidate per id, drop id-less ones, cap the total
pub fn dedup_by_id(candidates: Vec<Mutation>, max: usize) -> Vec<Mutation> {
    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|m| !m.id.is_empty() && seen.insert(m.id.clone()))
        .take(max)
        .collect()
}

/// Ask the suggester and return parsed, de-duplicated candidates
pub async fn suggest_mutations<S>(
    suggester: &S,
    reports: &[Report],
    max_cases: usize,
    max_mutations: usize,
    preview_len: usize,
) -> Result<Vec<Mutation>, SuggestionError>
where
    S: MutationSuggester + ?Sized,
{
    let Some(messages) = build_suggestion_messages(reports, max_cases, preview_len) else {
        return Ok(Vec::new());
    };
    let reply = suggester.complete(&messages).await?;
    let candidates = mutations_from_reply(&reply)?;
    debug!(received = candidates.len(), "Parsed suggestion reply");
    Ok(dedup_by_id(candidates, max_mutations))
}

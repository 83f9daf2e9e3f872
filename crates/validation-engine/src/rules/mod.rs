//! Field rule evaluators
//!
//! Every evaluator receives the trimmed, non-blank string value of one bound
//! field and returns the findings it produces. Evaluators never see or
//! modify the document itself, and a rule whose configuration is missing a
//! piece simply skips that piece.

pub mod allow_list;
pub mod date;
pub mod format;
pub mod name;
pub mod tax_id;

use chrono::NaiveDate;
use serde_json::Value;
use shared_types::{Document, Finding};

use crate::spec::{FieldBinding, FieldRule, Spec};

/// Document type whose uids may carry trailing receipt symbols
pub const BANK_RECEIPT: &str = "bank_receipt";

/// Errors and warnings produced by one or more checks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Findings {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl Findings {
    pub fn error(finding: Finding) -> Self {
        Self {
            errors: vec![finding],
            warnings: Vec::new(),
        }
    }

    pub fn extend(&mut self, other: Findings) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Run the rule bound to `field`. Non-string and blank values are skipped;
/// presence is the schema's job, not the rule's.
pub fn evaluate_binding(
    spec: &Spec,
    document: &Document,
    document_type: &str,
    field: &str,
    binding: &FieldBinding,
    today: NaiveDate,
) -> Findings {
    let Some(rule) = spec.rule(binding.kind) else {
        return Findings::default();
    };
    let Some(value) = document.get(field).and_then(Value::as_str) else {
        return Findings::default();
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Findings::default();
    }

    match rule {
        FieldRule::Date(rule) => date::check_date(field, trimmed, rule, today),
        FieldRule::AmountLike(rule) => format::check_format(field, trimmed, rule, "amount_like"),
        FieldRule::Uid(rule) => {
            let value = if document_type == BANK_RECEIPT && rule.bank_receipt_trim_trailing_symbols
            {
                format::trim_trailing_symbols(trimmed)
            } else {
                trimmed
            };
            if value.is_empty() {
                return Findings::default();
            }
            format::check_format(field, value, &rule.format, "uid")
        }
        FieldRule::Currency(rule) => allow_list::check_allowed(field, trimmed, rule, "currency"),
        FieldRule::Direction(rule) => allow_list::check_allowed(field, trimmed, rule, "direction"),
        FieldRule::NameLike(rule) => name::check_name(field, trimmed, rule),
        FieldRule::TaxId(rule) => {
            let related_name = binding
                .related_name_field
                .as_deref()
                .and_then(|f| document.str_field(f))
                .unwrap_or("");
            tax_id::check_tax_id(field, trimmed, rule, related_name)
        }
    }
}

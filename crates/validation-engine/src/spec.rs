//! Versioned validation spec
//!
//! The spec file is JSON with five sections: `spec_version`, `global_rules`,
//! `status_model`, `document_schemas` and `field_rules`. It is parsed once
//! into immutable typed values and threaded by reference through every
//! validation call.
//!
//! Rule configuration is parsed leniently: a malformed rule or schema entry
//! is logged and dropped, which makes the corresponding check a no-op rather
//! than failing the whole spec. Only an unreadable file or a non-object root
//! is a hard error.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use shared_types::ReportStatus;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("failed to read spec {}: {source}", .path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("spec is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("spec root must be a JSON object")]
    NotAnObject,
}

/// A regex that must match the whole (trimmed) value
#[derive(Debug, Clone)]
pub struct FullMatch {
    source: String,
    regex: Regex,
}

impl FullMatch {
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!(r"\A(?:{source})\z"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Compile an optional pattern; an invalid one disables the check
fn compile_optional(source: Option<&str>, rule: &str) -> Option<FullMatch> {
    let source = source?;
    match FullMatch::compile(source) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!(rule, pattern = source, "Unusable regex in spec, check disabled: {}", e);
            None
        }
    }
}

// ============================================================================
// Spec
// ============================================================================

#[derive(Debug, Clone)]
pub struct Spec {
    pub spec_version: Option<String>,
    pub global_rules: GlobalRules,
    pub status_model: StatusModel,
    pub document_schemas: BTreeMap<String, DocumentSchema>,
    pub field_rules: BTreeMap<RuleKind, FieldRule>,
}

impl Spec {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = Self::from_str(&content)?;
        info!(
            path = %path.display(),
            version = spec.spec_version.as_deref().unwrap_or("-"),
            schemas = spec.document_schemas.len(),
            rules = spec.field_rules.len(),
            "Loaded validation spec"
        );
        Ok(spec)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, SpecError> {
        Self::from_value(serde_json::from_str(s)?)
    }

    pub fn from_value(value: Value) -> Result<Self, SpecError> {
        if !value.is_object() {
            return Err(SpecError::NotAnObject);
        }
        let raw: RawSpec = serde_json::from_value(value)?;

        let spec_version = match raw.spec_version {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        let mut document_schemas = BTreeMap::new();
        for (doc_type, raw_schema) in raw.document_schemas {
            match serde_json::from_value::<RawSchema>(raw_schema) {
                Ok(schema) => {
                    document_schemas.insert(doc_type, DocumentSchema::from_raw(schema));
                }
                Err(e) => warn!(doc_type = %doc_type, "Skipping malformed document schema: {}", e),
            }
        }

        let mut field_rules = BTreeMap::new();
        for (name, raw_rule) in raw.field_rules {
            let Some(kind) = RuleKind::from_name(&name) else {
                debug!(rule = %name, "Ignoring unknown field rule");
                continue;
            };
            match FieldRule::parse(kind, raw_rule) {
                Ok(rule) => {
                    field_rules.insert(kind, rule);
                }
                Err(e) => warn!(rule = %name, "Skipping malformed field rule: {}", e),
            }
        }

        Ok(Self {
            spec_version,
            global_rules: GlobalRules::from_raw(raw.global_rules),
            status_model: raw.status_model,
            document_schemas,
            field_rules,
        })
    }

    pub fn schema(&self, document_type: &str) -> Option<&DocumentSchema> {
        self.document_schemas.get(document_type)
    }

    pub fn rule(&self, kind: RuleKind) -> Option<&FieldRule> {
        self.field_rules.get(&kind)
    }
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(default)]
    spec_version: Option<Value>,
    #[serde(default)]
    global_rules: RawGlobalRules,
    #[serde(default)]
    status_model: StatusModel,
    #[serde(default)]
    document_schemas: Map<String, Value>,
    #[serde(default)]
    field_rules: Map<String, Value>,
}

// ============================================================================
// Global rules and status model
// ============================================================================

/// Structural checks, run before any schema lookup
#[derive(Debug, Clone)]
pub struct GlobalRules {
    pub json_parse_code: String,
    pub root_not_object_code: String,
    /// `None` when the spec has no `document_type_enum`. Every document
    /// type is then accepted and only the unknown-type check applies.
    pub allowed_document_types: Option<BTreeSet<String>>,
    pub document_type_invalid_code: String,
    pub unknown_document_type: String,
    pub unknown_document_type_code: String,
    pub extracted_text_empty_code: String,
    pub text_too_short: Option<TextTooShort>,
}

#[derive(Debug, Clone)]
pub struct TextTooShort {
    pub threshold_len: usize,
    pub warning_code: String,
    pub field: String,
}

impl GlobalRules {
    fn from_raw(raw: RawGlobalRules) -> Self {
        let (allowed_document_types, document_type_invalid_code) = match raw.document_type_enum {
            Some(e) => (Some(e.allowed.into_iter().collect()), e.error_code),
            None => (None, None),
        };
        Self {
            json_parse_code: raw
                .json_must_parse
                .error_code
                .unwrap_or_else(|| "JSON_PARSE_ERROR".to_string()),
            root_not_object_code: raw
                .root_must_be_object
                .error_code
                .unwrap_or_else(|| "ROOT_NOT_OBJECT".to_string()),
            allowed_document_types,
            document_type_invalid_code: document_type_invalid_code
                .unwrap_or_else(|| "DOC_TYPE_INVALID".to_string()),
            unknown_document_type: raw
                .document_type_unknown_is_human
                .value
                .unwrap_or_else(|| "unknown".to_string()),
            unknown_document_type_code: raw
                .document_type_unknown_is_human
                .error_code
                .unwrap_or_else(|| "DOC_TYPE_UNKNOWN".to_string()),
            extracted_text_empty_code: raw
                .extracted_text_trim_nonempty
                .error_code
                .unwrap_or_else(|| "EXTRACTED_TEXT_EMPTY".to_string()),
            text_too_short: raw.warnings.text_too_short.and_then(|w| {
                Some(TextTooShort {
                    threshold_len: w.threshold_len?,
                    warning_code: w.warning_code.unwrap_or_else(|| "TEXT_TOO_SHORT".to_string()),
                    field: w.field.unwrap_or_else(|| "extracted_text".to_string()),
                })
            }),
        }
    }

    /// Always `true` without a `document_type_enum`
    pub fn allows_document_type(&self, document_type: &str) -> bool {
        self.allowed_document_types
            .as_ref()
            .map_or(true, |allowed| allowed.contains(document_type))
    }
}

impl Default for GlobalRules {
    fn default() -> Self {
        Self::from_raw(RawGlobalRules::default())
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawGlobalRules {
    json_must_parse: RawCode,
    root_must_be_object: RawCode,
    document_type_enum: Option<RawDocTypeEnum>,
    document_type_unknown_is_human: RawUnknownType,
    extracted_text_trim_nonempty: RawCode,
    warnings: RawGlobalWarnings,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCode {
    error_code: Option<String>,
}

#[derive(Deserialize)]
struct RawDocTypeEnum {
    #[serde(default)]
    allowed: Vec<String>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawUnknownType {
    value: Option<String>,
    error_code: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawGlobalWarnings {
    text_too_short: Option<RawTextTooShort>,
}

#[derive(Deserialize)]
struct RawTextTooShort {
    #[serde(default)]
    threshold_len: Option<usize>,
    #[serde(default)]
    warning_code: Option<String>,
    #[serde(default)]
    field: Option<String>,
}

/// Display labels for the three report statuses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatusModel {
    pub pass: String,
    pub fail_llm: String,
    pub fail_human: String,
}

impl Default for StatusModel {
    fn default() -> Self {
        Self {
            pass: ReportStatus::Pass.as_str().to_string(),
            fail_llm: ReportStatus::FailLlm.as_str().to_string(),
            fail_human: ReportStatus::FailHuman.as_str().to_string(),
        }
    }
}

impl StatusModel {
    pub fn label(&self, status: ReportStatus) -> &str {
        match status {
            ReportStatus::Pass => &self.pass,
            ReportStatus::FailLlm => &self.fail_llm,
            ReportStatus::FailHuman => &self.fail_human,
        }
    }
}

// ============================================================================
// Document schemas
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DocumentSchema {
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<OptionalField>,
    pub field_bindings: Vec<(String, FieldBinding)>,
}

/// An optional field; `warning_code` is set only when the schema asks for a
/// warning on absence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalField {
    pub field: String,
    pub warning_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub kind: RuleKind,
    pub related_name_field: Option<String>,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    required_fields: Vec<Value>,
    #[serde(default)]
    optional_fields: Vec<Value>,
    #[serde(default)]
    field_bindings: Map<String, Value>,
}

impl DocumentSchema {
    fn from_raw(raw: RawSchema) -> Self {
        let required_fields = raw
            .required_fields
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let optional_fields = raw
            .optional_fields
            .iter()
            .filter_map(|opt| {
                let field = opt.get("field")?.as_str()?.to_string();
                let when_missing = opt.get("when_missing");
                let warning_code = when_missing
                    .filter(|w| w.get("severity").and_then(Value::as_str) == Some("warning"))
                    .map(|w| match w.get("code") {
                        Some(Value::String(code)) => code.clone(),
                        Some(Value::Null) | None => "MISSING_OPTIONAL".to_string(),
                        Some(other) => other.to_string(),
                    });
                Some(OptionalField {
                    field,
                    warning_code,
                })
            })
            .collect();

        let field_bindings = raw
            .field_bindings
            .into_iter()
            .filter_map(|(field, binding)| {
                let parsed = FieldBinding::from_value(&binding);
                if parsed.is_none() {
                    debug!(field = %field, "Ignoring binding to unknown rule");
                }
                parsed.map(|b| (field, b))
            })
            .collect();

        Self {
            required_fields,
            optional_fields,
            field_bindings,
        }
    }
}

impl FieldBinding {
    /// A binding is either a rule name or `{rule, related_name_field}`
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Self {
                kind: RuleKind::from_name(name)?,
                related_name_field: None,
            }),
            Value::Object(obj) => Some(Self {
                kind: RuleKind::from_name(obj.get("rule")?.as_str()?)?,
                related_name_field: obj
                    .get("related_name_field")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Field rules
// ============================================================================

/// The closed set of field rule kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleKind {
    Date,
    AmountLike,
    Uid,
    Currency,
    Direction,
    NameLike,
    TaxId,
}

impl RuleKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "date" => Some(Self::Date),
            "amount_like" => Some(Self::AmountLike),
            "uid" => Some(Self::Uid),
            "currency" => Some(Self::Currency),
            "direction" => Some(Self::Direction),
            "name_like" => Some(Self::NameLike),
            "tax_id" => Some(Self::TaxId),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::AmountLike => "amount_like",
            Self::Uid => "uid",
            Self::Currency => "currency",
            Self::Direction => "direction",
            Self::NameLike => "name_like",
            Self::TaxId => "tax_id",
        }
    }
}

/// A field rule with its typed configuration
#[derive(Debug, Clone)]
pub enum FieldRule {
    Date(DateRule),
    AmountLike(FormatRule),
    Uid(UidRule),
    Currency(AllowListRule),
    Direction(AllowListRule),
    NameLike(NameRule),
    TaxId(TaxIdRule),
}

impl FieldRule {
    fn parse(kind: RuleKind, value: Value) -> Result<Self, serde_json::Error> {
        let name = kind.name();
        Ok(match kind {
            RuleKind::Date => Self::Date(DateRule::from_raw(serde_json::from_value(value)?)),
            RuleKind::AmountLike => {
                Self::AmountLike(FormatRule::from_raw(serde_json::from_value(value)?, name))
            }
            RuleKind::Uid => Self::Uid(UidRule::from_raw(serde_json::from_value(value)?)),
            RuleKind::Currency => Self::Currency(AllowListRule::from_raw(
                serde_json::from_value(value)?,
                "CURRENCY_INVALID",
            )),
            RuleKind::Direction => Self::Direction(AllowListRule::from_raw(
                serde_json::from_value(value)?,
                "DIRECTION_INVALID",
            )),
            RuleKind::NameLike => Self::NameLike(NameRule::from_raw(serde_json::from_value(value)?)),
            RuleKind::TaxId => Self::TaxId(TaxIdRule::from_raw(serde_json::from_value(value)?)),
        })
    }
}

fn code_or(codes: &BTreeMap<String, String>, key: &str, default: &str) -> String {
    codes
        .get(key)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone)]
pub struct DateRule {
    pub pattern: Option<FullMatch>,
    pub range: Option<DayRange>,
    pub format_code: String,
    pub out_of_range_code: String,
}

/// Inclusive window `[today - past_days, today + future_days]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub past_days: i64,
    pub future_days: i64,
}

#[derive(Deserialize)]
struct RawDateRule {
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    range_days_relative_to_today: Option<RawDayRange>,
    #[serde(default)]
    error_codes: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawDayRange {
    #[serde(default)]
    past_days: Option<i64>,
    #[serde(default)]
    future_days: Option<i64>,
}

impl DateRule {
    fn from_raw(raw: RawDateRule) -> Self {
        Self {
            pattern: compile_optional(raw.regex.as_deref(), "date"),
            range: raw
                .range_days_relative_to_today
                .and_then(|r| match (r.past_days, r.future_days) {
                    (Some(past_days), Some(future_days)) => Some(DayRange {
                        past_days,
                        future_days,
                    }),
                    _ => None,
                }),
            format_code: code_or(&raw.error_codes, "format", "DATE_FORMAT_INVALID"),
            out_of_range_code: code_or(&raw.error_codes, "out_of_range", "DATE_OUT_OF_RANGE"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatRule {
    pub pattern: Option<FullMatch>,
    pub format_code: String,
}

#[derive(Deserialize)]
struct RawFormatRule {
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    error_codes: BTreeMap<String, String>,
}

impl FormatRule {
    fn from_raw(raw: RawFormatRule, rule: &str) -> Self {
        Self {
            pattern: compile_optional(raw.regex.as_deref(), rule),
            format_code: code_or(&raw.error_codes, "format", "FORMAT_INVALID"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UidRule {
    pub format: FormatRule,
    /// Strip trailing non-alphanumerics before matching on bank receipts
    pub bank_receipt_trim_trailing_symbols: bool,
}

#[derive(Deserialize)]
struct RawUidRule {
    #[serde(flatten)]
    format: RawFormatRule,
    #[serde(default)]
    bank_receipt_trim_trailing_symbols: bool,
}

impl UidRule {
    fn from_raw(raw: RawUidRule) -> Self {
        Self {
            format: FormatRule::from_raw(raw.format, "uid"),
            bank_receipt_trim_trailing_symbols: raw.bank_receipt_trim_trailing_symbols,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllowListRule {
    /// `None` disables the check
    pub allowed: Option<BTreeSet<String>>,
    pub invalid_code: String,
}

#[derive(Deserialize)]
struct RawAllowListRule {
    #[serde(default)]
    allowed: Option<Vec<Value>>,
    #[serde(default)]
    error_codes: BTreeMap<String, String>,
}

impl AllowListRule {
    fn from_raw(raw: RawAllowListRule, default_code: &str) -> Self {
        Self {
            allowed: raw.allowed.map(|values| {
                values
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            }),
            invalid_code: code_or(&raw.error_codes, "invalid", default_code),
        }
    }
}

/// Switches for the name character-policy scan
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CharPolicy {
    pub disallow_quotes_anywhere: bool,
    pub disallow_parentheses_nesting: bool,
    pub disallow_whitespace_outside_parentheses: bool,
    pub require_parentheses_balanced: bool,
}

impl Default for CharPolicy {
    fn default() -> Self {
        Self {
            disallow_quotes_anywhere: false,
            disallow_parentheses_nesting: true,
            disallow_whitespace_outside_parentheses: true,
            require_parentheses_balanced: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NameRule {
    pub policy: CharPolicy,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub has_quote_code: String,
    pub ws_outside_parentheses_code: String,
    pub parentheses_unbalanced_code: String,
    pub has_punctuation_code: String,
    pub length_code: String,
    pub noise_code: String,
    pub mostly_numeric_code: String,
}

#[derive(Deserialize)]
struct RawNameRule {
    #[serde(default)]
    char_policy: CharPolicy,
    #[serde(default)]
    length: RawLength,
    #[serde(default)]
    error_codes: BTreeMap<String, String>,
    #[serde(default)]
    warning_codes: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawLength {
    min: Option<usize>,
    max: Option<usize>,
}

impl NameRule {
    fn from_raw(raw: RawNameRule) -> Self {
        let e = &raw.error_codes;
        let w = &raw.warning_codes;
        Self {
            policy: raw.char_policy,
            min_len: raw.length.min,
            max_len: raw.length.max,
            has_quote_code: code_or(e, "has_quote", "NAME_HAS_QUOTE"),
            ws_outside_parentheses_code: code_or(
                e,
                "ws_outside_parentheses",
                "NAME_HAS_WHITESPACE_OUTSIDE_BRACKETS",
            ),
            parentheses_unbalanced_code: code_or(
                e,
                "parentheses_unbalanced",
                "NAME_BRACKETS_UNBALANCED",
            ),
            has_punctuation_code: code_or(e, "has_punctuation", "NAME_HAS_PUNCTUATION"),
            length_code: code_or(w, "length_suspicious", "NAME_LENGTH_SUSPICIOUS"),
            noise_code: code_or(w, "noise_keywords", "NAME_NOISE_KEYWORDS"),
            mostly_numeric_code: code_or(w, "mostly_numeric", "NAME_MOSTLY_NUMERIC"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaxIdRule {
    pub pattern: Option<FullMatch>,
    pub format_code: String,
    pub conditionals: Vec<TaxIdConditional>,
}

/// Stricter format that applies when the related name has a given script
#[derive(Debug, Clone)]
pub struct TaxIdConditional {
    pub when: NameScript,
    pub pattern: Option<FullMatch>,
    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScript {
    /// At least one CJK ideograph and no Latin letters
    CjkOnly,
}

#[derive(Deserialize)]
struct RawTaxIdRule {
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    error_codes: BTreeMap<String, String>,
    #[serde(default)]
    conditional_rules: Vec<Value>,
}

impl TaxIdRule {
    fn from_raw(raw: RawTaxIdRule) -> Self {
        let conditionals = raw
            .conditional_rules
            .iter()
            .filter_map(|cond| {
                let when = match cond.get("when")?.get("related_name_script")?.as_str()? {
                    "cjk_only" => NameScript::CjkOnly,
                    other => {
                        debug!(trigger = other, "Ignoring unknown tax_id condition");
                        return None;
                    }
                };
                let then = cond.get("then")?.as_object()?;
                Some(TaxIdConditional {
                    when,
                    pattern: compile_optional(
                        then.get("regex").and_then(Value::as_str),
                        "tax_id.conditional_rules",
                    ),
                    error_code: match then.get("error_code") {
                        Some(Value::String(code)) => code.clone(),
                        Some(Value::Null) | None => "TAX_ID_CJK_NAME_MUST_BE_18".to_string(),
                        Some(other) => other.to_string(),
                    },
                })
            })
            .collect();

        Self {
            pattern: compile_optional(raw.regex.as_deref(), "tax_id"),
            format_code: code_or(&raw.error_codes, "format", "TAX_ID_FORMAT_INVALID"),
            conditionals,
        }
    }
}

//! Field-extraction pattern configuration and the mutations applied to it

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The only mutation kind the evolution loop knows how to apply
pub const APPEND_OVERRIDE_REGEX: &str = "append_override_regex";

/// doc_type -> field -> ordered override rules
pub type OverrideTree = BTreeMap<String, BTreeMap<String, Vec<OverrideRule>>>;

/// Pattern configuration consumed by the extractor.
///
/// `doc_patterns` and `field_patterns` are opaque to this workspace; only the
/// override tree is edited. Unknown top-level keys survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default)]
    pub doc_patterns: Map<String, Value>,
    #[serde(default)]
    pub field_patterns: Map<String, Value>,
    #[serde(default)]
    pub field_patterns_overrides: OverrideTree,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PatternConfig {
    /// Every override id, in tree order
    pub fn override_ids(&self) -> impl Iterator<Item = &str> {
        self.field_patterns_overrides
            .values()
            .flat_map(|fields| fields.values())
            .flatten()
            .map(|rule| rule.id.as_str())
    }

    pub fn has_override_id(&self, id: &str) -> bool {
        self.override_ids().any(|existing| existing == id)
    }

    pub fn overrides_for(&self, doc_type: &str, field: &str) -> &[OverrideRule] {
        self.field_patterns_overrides
            .get(doc_type)
            .and_then(|fields| fields.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One override entry. Items written by hand may lack fields or carry
/// extra ones (`flags`, comments); both are kept as found.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverrideRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub regex: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OverrideRule {
    pub fn new(id: &str, regex: &str, priority: i64) -> Self {
        Self {
            id: id.to_string(),
            regex: regex.to_string(),
            priority,
            extra: Map::new(),
        }
    }
}

/// A proposed edit to the pattern configuration.
///
/// Every field defaults to empty so that partially-formed suggestions still
/// deserialize; the mutation engine rejects them loudly instead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub regex: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: i64,
}

impl Mutation {
    pub fn append_override(
        doc_type: &str,
        field: &str,
        regex: &str,
        id: &str,
        priority: i64,
    ) -> Self {
        Self {
            action: APPEND_OVERRIDE_REGEX.to_string(),
            doc_type: doc_type.to_string(),
            field: field.to_string(),
            regex: regex.to_string(),
            id: id.to_string(),
            priority,
        }
    }
}

/// Accepts integers, integral floats and numeric strings ("500")
fn lenient_priority<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("priority is not an integer: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("priority is not an integer: {s:?}"))),
        other => Err(D::Error::custom(format!(
            "priority must be a number, got {other}"
        ))),
    }
}

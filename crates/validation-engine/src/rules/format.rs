// Full-match format rules (amount_like, uid)
use shared_types::Finding;

use super::Findings;
use crate::spec::FormatRule;

pub fn check_format(field: &str, value: &str, rule: &FormatRule, rule_name: &str) -> Findings {
    let Some(pattern) = &rule.pattern else {
        return Findings::default();
    };
    if pattern.is_match(value) {
        return Findings::default();
    }
    Findings::error(
        Finding::new(
            &rule.format_code,
            Some(field),
            format!("{field} does not match {}", pattern.as_str()),
        )
        .with_rule(format!("{rule_name}.regex")),
    )
}

/// Bank receipts often print the serial number followed by a stray mark
/// ("A1B2C3#", "123456。"); drop trailing non-alphanumerics.
pub fn trim_trailing_symbols(value: &str) -> &str {
    value
        .trim()
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
}

// Tax id: base format, then script-conditional formats keyed on the name
use shared_types::Finding;

use super::Findings;
use crate::patterns::is_cjk_only;
use crate::spec::{NameScript, TaxIdRule};

pub fn check_tax_id(field: &str, value: &str, rule: &TaxIdRule, related_name: &str) -> Findings {
    if let Some(pattern) = &rule.pattern {
        if !pattern.is_match(value) {
            return Findings::error(
                Finding::new(
                    &rule.format_code,
                    Some(field),
                    format!("{field} does not match {}", pattern.as_str()),
                )
                .with_rule("tax_id.regex"),
            );
        }
    }

    let mut findings = Findings::default();
    for conditional in &rule.conditionals {
        let triggered = match conditional.when {
            NameScript::CjkOnly => is_cjk_only(related_name.trim()),
        };
        if !triggered {
            continue;
        }
        let Some(pattern) = &conditional.pattern else {
            continue;
        };
        if !pattern.is_match(value) {
            findings.errors.push(
                Finding::new(
                    &conditional.error_code,
                    Some(field),
                    format!("{field} must match {} for a Chinese company name", pattern.as_str()),
                )
                .with_rule("tax_id.conditional_rules.cjk_only"),
            );
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FullMatch, TaxIdConditional};

    fn rule() -> TaxIdRule {
        TaxIdRule {
            pattern: Some(FullMatch::compile("[0-9A-Z]{8,20}").unwrap()),
            format_code: "TAX_ID_FORMAT_INVALID".to_string(),
            conditionals: vec![TaxIdConditional {
                when: NameScript::CjkOnly,
                pattern: Some(FullMatch::compile("[0-9A-Z]{18}").unwrap()),
                error_code: "TAX_ID_CJK_NAME_MUST_BE_18".to_string(),
            }],
        }
    }

    fn codes(value: &str, name: &str) -> Vec<String> {
        check_tax_id("buyer_tax_id", value, &rule(), name)
            .errors
            .into_iter()
            .map(|f| f.code)
            .collect()
    }

    #[test]
    fn test_cjk_name_with_18_char_id_passes() {
        assert!(codes("91110108MA01TE5L85", "北京磐沄科技有限公司").is_empty());
    }

    #[test]
    fn test_cjk_name_requires_18_chars() {
        assert_eq!(
            codes("91110108MA01", "北京磐沄科技有限公司"),
            vec!["TAX_ID_CJK_NAME_MUST_BE_18"]
        );
    }

    #[test]
    fn test_latin_name_accepts_short_id() {
        assert!(codes("91110108MA01", "ACME Trading Ltd").is_empty());
        assert!(codes("91110108MA01", "").is_empty());
    }

    #[test]
    fn test_base_format_failure_skips_conditionals() {
        assert_eq!(
            codes("9111-0108", "北京磐沄科技有限公司"),
            vec!["TAX_ID_FORMAT_INVALID"]
        );
    }
}

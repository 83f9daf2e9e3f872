// Allow-list rules (currency, direction)
use shared_types::Finding;

use super::Findings;
use crate::spec::AllowListRule;

pub fn check_allowed(field: &str, value: &str, rule: &AllowListRule, rule_name: &str) -> Findings {
    let Some(allowed) = &rule.allowed else {
        return Findings::default();
    };
    if allowed.contains(value) {
        return Findings::default();
    }
    Findings::error(
        Finding::new(
            &rule.invalid_code,
            Some(field),
            format!("{field} value {value:?} is not in the allowed list"),
        )
        .with_rule(format!("{rule_name}.allowed")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency() -> AllowListRule {
        AllowListRule {
            allowed: Some(["CNY", "USD"].iter().map(|s| s.to_string()).collect()),
            invalid_code: "CURRENCY_INVALID".to_string(),
        }
    }

    #[test]
    fn test_member_passes() {
        assert!(check_allowed("currency", "CNY", &currency(), "currency").is_empty());
    }

    #[test]
    fn test_non_member_uses_configured_code() {
        let findings = check_allowed("currency", "RMB", &currency(), "currency");
        assert_eq!(findings.errors[0].code, "CURRENCY_INVALID");
        assert_eq!(findings.errors[0].rule.as_deref(), Some("currency.allowed"));
    }

    #[test]
    fn test_membership_is_case_sensitive() {
        assert!(!check_allowed("currency", "cny", &currency(), "currency").is_empty());
    }

    #[test]
    fn test_missing_list_skips_check() {
        let rule = AllowListRule {
            allowed: None,
            invalid_code: "DIRECTION_INVALID".to_string(),
        };
        assert!(check_allowed("direction", "sideways", &rule, "direction").is_empty());
    }
}

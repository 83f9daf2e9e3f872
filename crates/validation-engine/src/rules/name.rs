//! Name character policy
//!
//! Party names (payer, payee, seller...) are checked with a single
//! left-to-right scan that tracks whether the cursor is inside a bracket
//! pair. At most one policy error is reported per field; the advisory
//! warnings (length, noise keywords, mostly numeric) are evaluated
//! regardless, except when the name contains a quote.

use shared_types::Finding;

use super::Findings;
use crate::patterns::{
    closing_bracket, find_noise_keyword, is_cjk_ideograph, is_digit, is_latin_letter,
    is_latin_only, is_mostly_numeric, is_quote, BRACKET_PAIRS, LATIN_NAME_SEPARATORS,
};
use crate::spec::{CharPolicy, NameRule};

const POLICY_RULE: &str = "name_like.char_policy";

/// Which policy was violated by the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    WhitespaceOutsideBrackets,
    BracketsUnbalanced,
    Punctuation,
}

/// Scanner position relative to bracket pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Outside,
    Inside { closer: char },
}

pub fn check_name(field: &str, value: &str, rule: &NameRule) -> Findings {
    if rule.policy.disallow_quotes_anywhere && value.chars().any(is_quote) {
        return Findings::error(
            Finding::new(
                &rule.has_quote_code,
                Some(field),
                format!("{field} contains a quote character"),
            )
            .with_rule(POLICY_RULE),
        );
    }

    let mut findings = Findings::default();

    if let Some((violation, message)) = scan_policy(value, &rule.policy) {
        let code = match violation {
            PolicyViolation::WhitespaceOutsideBrackets => &rule.ws_outside_parentheses_code,
            PolicyViolation::BracketsUnbalanced => &rule.parentheses_unbalanced_code,
            PolicyViolation::Punctuation => &rule.has_punctuation_code,
        };
        findings.errors.push(
            Finding::new(code, Some(field), format!("{field}: {message}")).with_rule(POLICY_RULE),
        );
    }

    let len = value.chars().count();
    if rule.min_len.is_some_and(|min| len < min) {
        findings.warnings.push(
            Finding::new(
                &rule.length_code,
                Some(field),
                format!("{field} is suspiciously short ({len} chars)"),
            )
            .with_rule("name_like.length"),
        );
    }
    if rule.max_len.is_some_and(|max| len > max) {
        findings.warnings.push(
            Finding::new(
                &rule.length_code,
                Some(field),
                format!("{field} is suspiciously long ({len} chars)"),
            )
            .with_rule("name_like.length"),
        );
    }

    if let Some(keyword) = find_noise_keyword(value) {
        findings.warnings.push(
            Finding::new(
                &rule.noise_code,
                Some(field),
                format!("{field} contains the label {keyword:?}"),
            )
            .with_rule("name_like.warning.noise_keywords"),
        );
    }

    if is_mostly_numeric(value) {
        findings.warnings.push(
            Finding::new(
                &rule.mostly_numeric_code,
                Some(field),
                format!("{field} is mostly digits"),
            )
            .with_rule("name_like.warning.mostly_numeric"),
        );
    }

    findings
}

/// Run the bracket/whitespace/punctuation scan, returning the first
/// violation found
pub fn scan_policy(text: &str, policy: &CharPolicy) -> Option<(PolicyViolation, &'static str)> {
    let chars: Vec<char> = text.chars().collect();
    let latin_only = is_latin_only(text);
    let mut depth = Depth::Outside;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(closer) = closing_bracket(c) {
            if matches!(depth, Depth::Inside { .. }) && policy.disallow_parentheses_nesting {
                return Some((PolicyViolation::BracketsUnbalanced, "nested brackets"));
            }
            depth = Depth::Inside { closer };
            continue;
        }
        if BRACKET_PAIRS.iter().any(|&(_, close)| close == c) {
            match depth {
                Depth::Inside { closer } if closer == c => depth = Depth::Outside,
                _ => {
                    return Some((
                        PolicyViolation::BracketsUnbalanced,
                        "unmatched or mismatched closing bracket",
                    ))
                }
            }
            continue;
        }

        if c.is_whitespace() {
            if depth == Depth::Outside
                && policy.disallow_whitespace_outside_parentheses
                && !(latin_only && whitespace_is_flanked(&chars, i))
            {
                return Some((
                    PolicyViolation::WhitespaceOutsideBrackets,
                    "whitespace outside brackets",
                ));
            }
            continue;
        }

        if is_digit(c) || is_latin_letter(c) || is_cjk_ideograph(c) {
            continue;
        }
        if latin_only && LATIN_NAME_SEPARATORS.contains(&c) {
            continue;
        }
        return Some((PolicyViolation::Punctuation, "disallowed punctuation or symbol"));
    }

    if depth != Depth::Outside && policy.require_parentheses_balanced {
        return Some((PolicyViolation::BracketsUnbalanced, "unclosed bracket"));
    }
    None
}

/// A whitespace run inside a Latin name must sit between two word
/// characters, never at either end
fn whitespace_is_flanked(chars: &[char], i: usize) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || LATIN_NAME_SEPARATORS.contains(&c);

    let before = chars[..i].iter().rev().find(|c| !c.is_whitespace());
    let after = chars[i + 1..].iter().find(|c| !c.is_whitespace());
    match (before, after) {
        (Some(&b), Some(&a)) => is_word(b) && is_word(a),
        _ => false,
    }
}

//! Character classes and keyword lists used by the name and tax-id rules

/// Field labels that leak into extracted names when the extractor grabs too
/// much of a line
pub const NOISE_KEYWORDS: &[&str] = &[
    "发票号码",
    "开票日期",
    "合计",
    "价税合计",
    "纳税人识别号",
    "统一社会信用代码",
    "金额",
    "税额",
];

/// ASCII and CJK curly quotes
pub const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '‘', '’'];

/// Opening brackets and the closer each one expects
pub const BRACKET_PAIRS: &[(char, char)] = &[('(', ')'), ('（', '）')];

/// Separators tolerated inside Latin-only names ("ACME Co., Ltd.")
pub const LATIN_NAME_SEPARATORS: &[char] = &['.', ','];

/// Minimum share of digits for a name to be flagged as mostly numeric
pub const MOSTLY_NUMERIC_RATIO: f64 = 0.8;

pub fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

pub fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// ASCII and fullwidth decimal digits. Fractions and roman numerals are
/// not digits.
pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || ('０'..='９').contains(&c)
}

pub fn is_quote(c: char) -> bool {
    QUOTE_CHARS.contains(&c)
}

pub fn is_bracket(c: char) -> bool {
    BRACKET_PAIRS.iter().any(|&(open, close)| c == open || c == close)
}

/// The closer expected for an opening bracket
pub fn closing_bracket(open: char) -> Option<char> {
    BRACKET_PAIRS
        .iter()
        .find(|&&(o, _)| o == open)
        .map(|&(_, close)| close)
}

pub fn contains_latin_letter(text: &str) -> bool {
    text.chars().any(is_latin_letter)
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_ideograph)
}

/// At least one CJK ideograph and no Latin letters
pub fn is_cjk_only(text: &str) -> bool {
    contains_cjk(text) && !contains_latin_letter(text)
}

/// At least one Latin letter and no CJK ideographs
pub fn is_latin_only(text: &str) -> bool {
    contains_latin_letter(text) && !contains_cjk(text)
}

/// First noise keyword found in the text, if any
pub fn find_noise_keyword(text: &str) -> Option<&'static str> {
    NOISE_KEYWORDS.iter().copied().find(|k| text.contains(k))
}

/// True when digits make up at least [`MOSTLY_NUMERIC_RATIO`] of the
/// characters that are neither whitespace nor brackets
pub fn is_mostly_numeric(text: &str) -> bool {
    let mut payload = 0usize;
    let mut digits = 0usize;
    for c in text.chars() {
        if c.is_whitespace() || is_bracket(c) {
            continue;
        }
        payload += 1;
        if is_digit(c) {
            digits += 1;
        }
    }
    payload > 0 && digits as f64 / payload as f64 >= MOSTLY_NUMERIC_RATIO
}

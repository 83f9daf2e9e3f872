// Date rule: format, calendar validity and a window relative to today
use chrono::{Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use shared_types::Finding;

use super::Findings;
use crate::spec::DateRule;

lazy_static! {
    /// Zero-padded ISO calendar date
    static ref ISO_DATE: Regex = Regex::new(r"\A[0-9]{4}-[0-9]{2}-[0-9]{2}\z").unwrap();
}

pub fn check_date(field: &str, value: &str, rule: &DateRule, today: NaiveDate) -> Findings {
    if let Some(pattern) = &rule.pattern {
        if !pattern.is_match(value) {
            return Findings::error(
                Finding::new(
                    &rule.format_code,
                    Some(field),
                    format!("{field} does not match the date format"),
                )
                .with_rule("date.regex"),
            );
        }
    }

    let Some(date) = parse_iso_date(value) else {
        return Findings::error(
            Finding::new(
                &rule.format_code,
                Some(field),
                format!("{field} is not a valid calendar date: {value}"),
            )
            .with_rule("date.format"),
        );
    };

    if let Some(range) = rule.range {
        // Windows too wide for the calendar skip the check
        let earliest = Duration::try_days(range.past_days).and_then(|d| today.checked_sub_signed(d));
        let latest = Duration::try_days(range.future_days).and_then(|d| today.checked_add_signed(d));
        if let (Some(earliest), Some(latest)) = (earliest, latest) {
            if date < earliest || date > latest {
                return Findings::error(
                    Finding::new(
                        &rule.out_of_range_code,
                        Some(field),
                        format!("{field} {date} is outside {earliest}..={latest}"),
                    )
                    .with_rule("date.range_days_relative_to_today"),
                );
            }
        }
    }

    Findings::default()
}

/// `YYYY-MM-DD` with zero-padded month and day, rejecting impossible dates
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    if !ISO_DATE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

//! Cron-like expression parsing into a [`RecurrenceRule`].
//!
//! Supported forms:
//!
//! | Fields | Layout                                   |
//! |--------|------------------------------------------|
//! | 5      | `minute hour day-of-month month weekday` |
//! | 6      | `second minute hour day-of-month month weekday` |
//!
//! Each field accepts `*`, `?`, `N`, `A-B`, `*/S`, `A-B/S`, `A/S` and comma
//! lists of those. Months accept `JAN`..`DEC`, weekdays `SUN`..`SAT`, and
//! weekday `7` is Sunday. A five-field expression fires at second 0.
//!
//! Shortcuts: `@yearly`/`@annually`, `@monthly`, `@weekly`, `@daily`/`@midnight`,
//! `@hourly`.
//!
//! Day-of-month and weekday are combined like every other rule field: both
//! must match. This differs from Vixie cron, which fires when either one
//! matches if both are restricted. Here `0 0 1 * MON` means "the 1st, when it
//! is a Monday", not "the 1st and every Monday".

use crate::error::{Result, SchedulerError};
use crate::range::Range;
use crate::rule::{FieldSpec, Matcher, RecurrenceRule};

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, Copy)]
enum Field {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Second => "second",
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    /// Inclusive bounds accepted in the text. Weekday 7 is folded into 0 later.
    fn bounds(self) -> (u32, u32) {
        match self {
            Field::Second | Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 7),
        }
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            Field::Month => &MONTHS,
            Field::DayOfWeek => &WEEKDAYS,
            _ => &[],
        }
    }

    /// Value of the first entry in `names()`.
    fn names_base(self) -> u32 {
        match self {
            Field::Month => 1,
            _ => 0,
        }
    }
}

/// Parse a cron-like expression.
pub fn parse(expression: &str) -> Result<RecurrenceRule> {
    let trimmed = expression.trim();
    if let Some(shortcut) = trimmed.strip_prefix('@') {
        return parse_shortcut(expression, shortcut);
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    let (second, rest) = match parts.len() {
        5 => (None, &parts[..]),
        6 => (Some(parts[0]), &parts[1..]),
        n => {
            return Err(invalid(
                expression,
                format!("expected 5 or 6 fields, found {n}"),
            ))
        }
    };

    let second = match second {
        Some(text) => parse_field(expression, text, Field::Second)?,
        None => Some(FieldSpec::from(0)),
    };

    Ok(RecurrenceRule {
        year: None,
        second,
        minute: parse_field(expression, rest[0], Field::Minute)?,
        hour: parse_field(expression, rest[1], Field::Hour)?,
        date: parse_field(expression, rest[2], Field::DayOfMonth)?,
        month: parse_field(expression, rest[3], Field::Month)?,
        day_of_week: parse_field(expression, rest[4], Field::DayOfWeek)?,
    })
}

fn parse_shortcut(expression: &str, shortcut: &str) -> Result<RecurrenceRule> {
    let midnight = RecurrenceRule::new().hour(0).minute(0).second(0);
    let rule = match shortcut.to_ascii_lowercase().as_str() {
        "yearly" | "annually" => midnight.month(1).date(1),
        "monthly" => midnight.date(1),
        "weekly" => midnight.day_of_week(0),
        "daily" | "midnight" => midnight,
        "hourly" => RecurrenceRule::new().minute(0).second(0),
        other => return Err(invalid(expression, format!("unknown shortcut `@{other}`"))),
    };
    Ok(rule)
}

/// `None` means wildcard.
fn parse_field(expression: &str, text: &str, field: Field) -> Result<Option<FieldSpec>> {
    if text == "*" || text == "?" {
        return Ok(None);
    }

    let mut matchers = Vec::new();
    for item in text.split(',') {
        if item.is_empty() {
            return Err(invalid(
                expression,
                format!("empty list item in {} field", field.name()),
            ));
        }
        let range = parse_item(expression, item, field)?;
        push_matchers(&mut matchers, range, field);
    }
    Ok(Some(FieldSpec::any_of(matchers)))
}

/// Parse one list item into a range (a single value is a one-element range).
fn parse_item(expression: &str, item: &str, field: Field) -> Result<Range> {
    let (lo, hi) = field.bounds();
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => {
            let step: u32 = step.parse().map_err(|_| {
                invalid(expression, format!("bad step `{step}` in {} field", field.name()))
            })?;
            if step == 0 {
                return Err(invalid(
                    expression,
                    format!("zero step in {} field", field.name()),
                ));
            }
            (base, Some(step))
        }
        None => (item, None),
    };

    let (start, end) = if base == "*" || base == "?" {
        (lo, if matches!(field, Field::DayOfWeek) { 6 } else { hi })
    } else if let Some((a, b)) = base.split_once('-') {
        (
            parse_value(expression, a, field)?,
            parse_value(expression, b, field)?,
        )
    } else {
        let v = parse_value(expression, base, field)?;
        // `A/S` runs from A to the top of the field.
        (v, if step.is_some() { hi } else { v })
    };

    if start > end {
        return Err(invalid(
            expression,
            format!("range {start}-{end} is reversed in {} field", field.name()),
        ));
    }
    Ok(Range::new(start, end, step.unwrap_or(1)))
}

fn parse_value(expression: &str, text: &str, field: Field) -> Result<u32> {
    let (lo, hi) = field.bounds();
    let upper = text.to_ascii_uppercase();
    let value = match field.names().iter().position(|n| *n == upper) {
        Some(idx) => idx as u32 + field.names_base(),
        None => text.parse().map_err(|_| {
            invalid(expression, format!("bad value `{text}` in {} field", field.name()))
        })?,
    };
    if value < lo || value > hi {
        return Err(invalid(
            expression,
            format!("{value} out of range {lo}-{hi} in {} field", field.name()),
        ));
    }
    Ok(value)
}

/// Push `range` as matchers, folding weekday 7 onto Sunday.
fn push_matchers(out: &mut Vec<Matcher>, range: Range, field: Field) {
    if matches!(field, Field::DayOfWeek) && range.end == 7 {
        if range.contains(7) {
            out.push(Matcher::Value(0));
        }
        if range.start <= 6 {
            out.push(Matcher::Range(Range::new(range.start, 6, range.step)));
        }
        return;
    }
    if range.start == range.end {
        out.push(Matcher::Value(range.start));
    } else {
        out.push(Matcher::Range(range));
    }
}

fn invalid(expression: &str, reason: String) -> SchedulerError {
    SchedulerError::InvalidCron {
        expression: expression.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn five_fields_fire_at_second_zero() {
        let rule = parse("*/15 * * * *").unwrap();
        assert_eq!(rule.second, Some(FieldSpec::from(0)));
        let next = rule.next_after(at(2026, 1, 1, 10, 7, 30), 5).unwrap();
        assert_eq!(next, at(2026, 1, 1, 10, 15, 0));
    }

    #[test]
    fn six_fields_include_seconds() {
        let rule = parse("30 0 12 * * *").unwrap();
        let next = rule.next_after(at(2026, 1, 1, 12, 0, 30), 5).unwrap();
        assert_eq!(next, at(2026, 1, 2, 12, 0, 30));
    }

    #[test]
    fn names_lists_and_ranges() {
        let rule = parse("0 9 * JAN,jul MON-FRI").unwrap();
        assert_eq!(
            rule.month,
            Some(FieldSpec::any_of([Matcher::Value(1), Matcher::Value(7)]))
        );
        assert_eq!(rule.day_of_week, Some(FieldSpec::from(Range::new(1, 5, 1))));
    }

    #[test]
    fn weekday_seven_is_sunday() {
        let rule = parse("0 0 * * 7").unwrap();
        assert_eq!(rule.day_of_week, Some(FieldSpec::from(0)));

        let rule = parse("0 0 * * 5-7").unwrap();
        let dow = rule.day_of_week.unwrap();
        assert!(dow.matches(0));
        assert!(dow.matches(5));
        assert!(dow.matches(6));
        assert!(!dow.matches(1));
    }

    #[test]
    fn value_with_step_runs_to_field_max() {
        let rule = parse("5/20 * * * *").unwrap();
        let minute = rule.minute.unwrap();
        assert!(minute.matches(5));
        assert!(minute.matches(25));
        assert!(minute.matches(45));
        assert!(!minute.matches(50));
    }

    #[test]
    fn shortcuts() {
        let daily = parse("@daily").unwrap();
        assert_eq!(
            daily.next_after(at(2026, 1, 1, 10, 0, 0), 5).unwrap(),
            at(2026, 1, 2, 0, 0, 0)
        );
        let hourly = parse("@HOURLY").unwrap();
        assert_eq!(
            hourly.next_after(at(2026, 1, 1, 10, 0, 0), 5).unwrap(),
            at(2026, 1, 1, 11, 0, 0)
        );
        assert!(parse("@fortnightly").is_err());
    }

    #[test]
    fn wildcards_are_none() {
        let rule = parse("* * * * * ?").unwrap();
        assert!(rule.second.is_none());
        assert!(rule.day_of_week.is_none());
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in [
            "",
            "* * * *",
            "* * * * * * *",
            "61 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "10-5 * * * *",
            "a * * * *",
            "1,,2 * * * *",
            "* * * FOO *",
        ] {
            let err = parse(bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_CRON", "expected rejection of `{bad}`");
        }
    }

    #[test]
    fn april_31st_parses_but_never_fires() {
        let rule = parse("0 0 31 4 *").unwrap();
        assert!(rule.next_after(at(2026, 1, 1, 0, 0, 0), 5).is_err());
    }

    #[test]
    fn day_of_month_and_weekday_must_both_match() {
        // First Monday-the-1st after 2026-01-01 is 2026-06-01.
        let rule = parse("0 0 1 * MON").unwrap();
        let first = rule.next_after(at(2026, 1, 1, 0, 0, 0), 5).unwrap();
        assert_eq!(first, at(2026, 6, 1, 0, 0, 0));
        let second = rule.next_after(first, 5).unwrap();
        assert_eq!(second, at(2027, 2, 1, 0, 0, 0));
    }
}

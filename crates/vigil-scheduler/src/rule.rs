//! Recurrence rules and next-fire-date evaluation.
//!
//! All calendar fields are evaluated in UTC. Months are 1..=12 and
//! `day_of_week` is 0 = Sunday .. 6 = Saturday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::range::Range;

/// One accepted value or range of values inside a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matcher {
    Value(u32),
    Range(Range),
}

impl Matcher {
    pub fn matches(&self, value: u32) -> bool {
        match self {
            Matcher::Value(v) => *v == value,
            Matcher::Range(r) => r.contains(value),
        }
    }
}

/// The constraint on one calendar field: matches when any matcher does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSpec(Vec<Matcher>);

impl FieldSpec {
    pub fn any_of(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Self(matchers.into_iter().collect())
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.0
    }

    pub fn matches(&self, value: u32) -> bool {
        self.0.iter().any(|m| m.matches(value))
    }

    /// Whether any value in `lo..=hi` is accepted.
    fn admits_any(&self, lo: u32, hi: u32) -> bool {
        self.matchers().iter().any(|m| match m {
            Matcher::Value(v) => (lo..=hi).contains(v),
            Matcher::Range(r) => r.values().find(|v| *v >= lo).is_some_and(|v| v <= hi),
        })
    }
}

impl From<u32> for FieldSpec {
    fn from(value: u32) -> Self {
        Self(vec![Matcher::Value(value)])
    }
}

impl From<Range> for FieldSpec {
    fn from(range: Range) -> Self {
        Self(vec![Matcher::Range(range)])
    }
}

impl From<Vec<Matcher>> for FieldSpec {
    fn from(matchers: Vec<Matcher>) -> Self {
        Self(matchers)
    }
}

impl From<Vec<u32>> for FieldSpec {
    fn from(values: Vec<u32>) -> Self {
        Self(values.into_iter().map(Matcher::Value).collect())
    }
}

/// Sparse calendar pattern. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<FieldSpec>,
}

impl RecurrenceRule {
    /// An all-wildcard rule (fires every second). Narrow it with the setters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional constructor: year, month, date, day of week, hour, minute, second.
    pub fn from_fields(
        year: Option<u32>,
        month: Option<u32>,
        date: Option<u32>,
        day_of_week: Option<u32>,
        hour: Option<u32>,
        minute: Option<u32>,
        second: Option<u32>,
    ) -> Self {
        Self {
            year: year.map(FieldSpec::from),
            month: month.map(FieldSpec::from),
            date: date.map(FieldSpec::from),
            day_of_week: day_of_week.map(FieldSpec::from),
            hour: hour.map(FieldSpec::from),
            minute: minute.map(FieldSpec::from),
            second: second.map(FieldSpec::from),
        }
    }

    pub fn year(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.year = Some(spec.into());
        self
    }

    pub fn month(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.month = Some(spec.into());
        self
    }

    pub fn date(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.date = Some(spec.into());
        self
    }

    pub fn day_of_week(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.day_of_week = Some(spec.into());
        self
    }

    pub fn hour(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.hour = Some(spec.into());
        self
    }

    pub fn minute(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.minute = Some(spec.into());
        self
    }

    pub fn second(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.second = Some(spec.into());
        self
    }

    /// Whether `at` satisfies every field of the rule.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let year = u32::try_from(at.year()).unwrap_or(0);
        field_ok(&self.year, year)
            && field_ok(&self.month, at.month())
            && field_ok(&self.date, at.day())
            && field_ok(&self.day_of_week, at.weekday().num_days_from_sunday())
            && field_ok(&self.hour, at.hour())
            && field_ok(&self.minute, at.minute())
            && field_ok(&self.second, at.second())
    }

    /// Compute the first whole second strictly after `after` that matches.
    ///
    /// Fields are tested from year down to second; on the first mismatch the
    /// candidate jumps to the start of the next unit of that field, which
    /// carries overflow upward through the calendar. Fails with
    /// `NoMatchingDate` once the candidate passes `after + horizon_years`.
    pub fn next_after(&self, after: DateTime<Utc>, horizon_years: u32) -> Result<DateTime<Utc>> {
        let no_match = || SchedulerError::NoMatchingDate { horizon_years };
        self.check_satisfiable(after.year(), horizon_years)?;

        let start = after.naive_utc();
        let limit = add_years(start, horizon_years).ok_or_else(no_match)?;
        let mut t = truncate_to_second(start) + Duration::seconds(1);
        let mut steps: u64 = 0;

        loop {
            if t > limit {
                debug!(steps, "recurrence search exceeded horizon");
                return Err(no_match());
            }
            steps += 1;

            let year = u32::try_from(t.year()).map_err(|_| no_match())?;
            if !field_ok(&self.year, year) {
                t = start_of_year(t.year() + 1).ok_or_else(no_match)?;
                continue;
            }
            if !field_ok(&self.month, t.month()) {
                t = start_of_next_month(t).ok_or_else(no_match)?;
                continue;
            }
            if !field_ok(&self.date, t.day())
                || !field_ok(&self.day_of_week, t.weekday().num_days_from_sunday())
            {
                t = start_of_next_day(t).ok_or_else(no_match)?;
                continue;
            }
            if !field_ok(&self.hour, t.hour()) {
                t = truncate(t, t.hour(), 0, 0) + Duration::hours(1);
                continue;
            }
            if !field_ok(&self.minute, t.minute()) {
                t = truncate(t, t.hour(), t.minute(), 0) + Duration::minutes(1);
                continue;
            }
            if !field_ok(&self.second, t.second()) {
                t += Duration::seconds(1);
                continue;
            }

            return Ok(Utc.from_utc_datetime(&t));
        }
    }

    /// Reject rules with a field that can never match, without searching.
    fn check_satisfiable(&self, from_year: i32, horizon_years: u32) -> Result<()> {
        let from_year = u32::try_from(from_year).unwrap_or(0);
        let bounds: [(&Option<FieldSpec>, u32, u32); 7] = [
            (&self.year, from_year, from_year.saturating_add(horizon_years)),
            (&self.month, 1, 12),
            (&self.date, 1, 31),
            (&self.day_of_week, 0, 6),
            (&self.hour, 0, 23),
            (&self.minute, 0, 59),
            (&self.second, 0, 59),
        ];
        for (spec, lo, hi) in bounds {
            if let Some(spec) = spec {
                if !spec.admits_any(lo, hi) {
                    return Err(SchedulerError::NoMatchingDate { horizon_years });
                }
            }
        }
        Ok(())
    }
}

fn field_ok(spec: &Option<FieldSpec>, value: u32) -> bool {
    spec.as_ref().map_or(true, |s| s.matches(value))
}

fn truncate_to_second(t: NaiveDateTime) -> NaiveDateTime {
    truncate(t, t.hour(), t.minute(), t.second())
}

fn truncate(t: NaiveDateTime, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    // Inputs come from a valid NaiveDateTime, so the time is always valid.
    t.date()
        .and_hms_opt(hour, minute, second)
        .unwrap_or(t)
}

fn start_of_year(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn start_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn start_of_next_day(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().succ_opt()?.and_hms_opt(0, 0, 0)
}

fn add_years(t: NaiveDateTime, years: u32) -> Option<NaiveDateTime> {
    let year = t.year().checked_add(i32::try_from(years).ok()?)?;
    // Feb 29 rolls to Mar 1 in a non-leap target year.
    t.with_year(year)
        .or_else(|| t.with_day(1)?.with_month(3)?.with_year(year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn wildcard_rule_fires_next_second() {
        let now = at(2026, 3, 1, 12, 0, 0) + Duration::milliseconds(400);
        let next = RecurrenceRule::new().next_after(now, 5).unwrap();
        assert_eq!(next, at(2026, 3, 1, 12, 0, 1));
    }

    #[test]
    fn result_is_strictly_after() {
        let rule = RecurrenceRule::new().second(0);
        let now = at(2026, 3, 1, 12, 0, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 3, 1, 12, 1, 0));
    }

    #[test]
    fn minute_overflow_carries_to_hour() {
        let rule = RecurrenceRule::new().minute(0).second(0);
        let now = at(2026, 3, 1, 23, 59, 30);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 3, 2, 0, 0, 0));
    }

    #[test]
    fn year_end_rollover() {
        let rule = RecurrenceRule::new().hour(9).minute(30).second(0);
        let now = at(2026, 12, 31, 10, 0, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2027, 1, 1, 9, 30, 0));
    }

    #[test]
    fn weekday_range() {
        // Weekdays Monday..Friday at 08:00:00; 2026-03-07 is a Saturday.
        let rule = RecurrenceRule::new()
            .day_of_week(Range::inclusive(1, 5))
            .hour(8)
            .minute(0)
            .second(0);
        let now = at(2026, 3, 7, 12, 0, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 3, 9, 8, 0, 0));
    }

    #[test]
    fn every_other_weekday_via_step() {
        // Monday, Wednesday, Friday.
        let rule = RecurrenceRule::new()
            .day_of_week(Range::new(1, 5, 2))
            .hour(0)
            .minute(0)
            .second(0);
        // 2026-03-10 is a Tuesday.
        let now = at(2026, 3, 10, 1, 0, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 3, 11, 0, 0, 0));
    }

    #[test]
    fn leap_day_found_within_horizon() {
        let rule = RecurrenceRule::new().month(2).date(29).hour(0).minute(0).second(0);
        let now = at(2026, 3, 1, 0, 0, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2028, 2, 29, 0, 0, 0));
    }

    #[test]
    fn leap_day_beyond_short_horizon_fails() {
        let rule = RecurrenceRule::new().month(2).date(29);
        let now = at(2026, 3, 1, 0, 0, 0);
        assert!(matches!(
            rule.next_after(now, 1),
            Err(SchedulerError::NoMatchingDate { horizon_years: 1 })
        ));
    }

    #[test]
    fn april_31st_never_matches() {
        let rule = RecurrenceRule::new().month(4).date(31);
        let now = at(2026, 1, 1, 0, 0, 0);
        assert!(matches!(
            rule.next_after(now, 5),
            Err(SchedulerError::NoMatchingDate { .. })
        ));
    }

    #[test]
    fn out_of_domain_field_fails_fast() {
        let rule = RecurrenceRule::new().minute(Range::inclusive(70, 80));
        let now = at(2026, 1, 1, 0, 0, 0);
        assert!(rule.next_after(now, 5).is_err());

        let rule = RecurrenceRule::new().second(Range::new(10, 5, 1));
        assert!(rule.next_after(now, 5).is_err());
    }

    #[test]
    fn wide_ranges_checked_by_their_values() {
        let now = at(2026, 1, 1, 0, 0, 0);

        // Starts past the minute domain and runs to u32::MAX.
        let rule = RecurrenceRule::new().minute(Range::new(100, u32::MAX, 1));
        assert!(matches!(
            rule.next_after(now, 5),
            Err(SchedulerError::NoMatchingDate { horizon_years: 5 })
        ));

        // Only 0 lands inside 0..=59; 70 is past it.
        let rule = RecurrenceRule::new().minute(Range::new(0, 100, 70)).second(0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 1, 1, 1, 0, 0));

        // 35 steps over every legal hour.
        let rule = RecurrenceRule::new().hour(Range::new(1, 200, 35));
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 1, 1, 1, 0, 0));
        let rule = RecurrenceRule::new().hour(Range::new(24, 200, 35));
        assert!(rule.next_after(now, 5).is_err());
    }

    #[test]
    fn past_year_fails() {
        let rule = RecurrenceRule::new().year(2020);
        let now = at(2026, 1, 1, 0, 0, 0);
        assert!(rule.next_after(now, 5).is_err());
    }

    #[test]
    fn fixed_future_year() {
        let rule = RecurrenceRule::from_fields(Some(2027), Some(6), Some(15), None, Some(12), Some(0), Some(0));
        let now = at(2026, 1, 1, 0, 0, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2027, 6, 15, 12, 0, 0));
    }

    #[test]
    fn list_of_values() {
        let rule = RecurrenceRule::new().minute(vec![15, 45]).second(0);
        let now = at(2026, 1, 1, 0, 20, 0);
        assert_eq!(rule.next_after(now, 5).unwrap(), at(2026, 1, 1, 0, 45, 0));
    }

    #[test]
    fn matches_checks_every_field() {
        let rule = RecurrenceRule::new().hour(12).minute(0).second(0);
        assert!(rule.matches(at(2026, 5, 5, 12, 0, 0)));
        assert!(!rule.matches(at(2026, 5, 5, 12, 0, 1)));
    }

    #[test]
    fn rule_serializes_sparsely() {
        let rule = RecurrenceRule::new()
            .minute(vec![Matcher::Value(0), Matcher::Range(Range::new(30, 40, 5))])
            .second(0);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "minute": [0, {"start": 30, "end": 40, "step": 5}],
                "second": [0]
            })
        );
        let back: RecurrenceRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}

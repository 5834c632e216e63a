use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_events::Event;

use crate::rule::RecurrenceRule;

/// Defines when a job should fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire at every instant matching the rule.
    Rule { rule: RecurrenceRule },

    /// Fire exactly once at the given UTC instant. Past instants fire on the
    /// next check.
    At { at: DateTime<Utc> },

    /// Cron-like expression, parsed into a rule when scheduled.
    Cron { expression: String },
}

impl From<RecurrenceRule> for Trigger {
    fn from(rule: RecurrenceRule) -> Self {
        Trigger::Rule { rule }
    }
}

impl From<DateTime<Utc>> for Trigger {
    fn from(at: DateTime<Utc>) -> Self {
        Trigger::At { at }
    }
}

impl From<&str> for Trigger {
    fn from(expression: &str) -> Self {
        Trigger::Cron {
            expression: expression.to_string(),
        }
    }
}

impl From<String> for Trigger {
    fn from(expression: String) -> Self {
        Trigger::Cron { expression }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but never given a trigger.
    Unscheduled,
    /// Has a pending invocation.
    Scheduled,
    /// Its callback is running right now.
    Firing,
    /// A one-shot job that has fired, or a rule with no further dates.
    Completed,
    /// Canceled by the caller.
    Canceled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Unscheduled => "unscheduled",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Firing => "firing",
            JobStatus::Completed => "completed",
            JobStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unscheduled" => Ok(JobStatus::Unscheduled),
            "scheduled" => Ok(JobStatus::Scheduled),
            "firing" => Ok(JobStatus::Firing),
            "completed" => Ok(JobStatus::Completed),
            "canceled" => Ok(JobStatus::Canceled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A pending firing of a job at a concrete instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// UUID v4 string of the owning job.
    pub job_id: String,
    pub job_name: String,
    pub fire_date: DateTime<Utc>,
    /// Present for recurring jobs; used to compute the following date.
    pub recurrence_rule: Option<RecurrenceRule>,
    /// Monotonic id assigned when the invocation was armed.
    pub timer_id: u64,
}

/// Lifecycle events emitted by every [`Job`](crate::Job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new invocation was armed.
    Scheduled { fire_date: DateTime<Utc> },
    /// Emitted right before the callback runs.
    Run { fire_date: DateTime<Utc> },
    /// The pending invocation was torn down. `fire_date` is the date that
    /// will no longer fire, if one was armed.
    Canceled { fire_date: Option<DateTime<Utc>> },
}

/// Subscription key for [`JobEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Scheduled,
    Run,
    Canceled,
}

impl Event for JobEvent {
    type Kind = JobEventKind;

    fn kind(&self) -> JobEventKind {
        match self {
            JobEvent::Scheduled { .. } => JobEventKind::Scheduled,
            JobEvent::Run { .. } => JobEventKind::Run,
            JobEvent::Canceled { .. } => JobEventKind::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Unscheduled,
            JobStatus::Scheduled,
            JobStatus::Firing,
            JobStatus::Completed,
            JobStatus::Canceled,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn trigger_from_conversions() {
        assert!(matches!(Trigger::from("* * * * *"), Trigger::Cron { .. }));
        assert!(matches!(Trigger::from(Utc::now()), Trigger::At { .. }));
        assert!(matches!(
            Trigger::from(RecurrenceRule::new()),
            Trigger::Rule { .. }
        ));
    }

    #[test]
    fn trigger_serializes_tagged() {
        let trigger = Trigger::from("@hourly");
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "cron", "expression": "@hourly"})
        );
    }

    #[test]
    fn event_kinds() {
        let now = Utc::now();
        assert_eq!(JobEvent::Run { fire_date: now }.kind(), JobEventKind::Run);
        assert_eq!(
            JobEvent::Canceled { fire_date: None }.kind(),
            JobEventKind::Canceled
        );
    }
}

//! `vigil-scheduler`: in-process calendar job scheduler.
//!
//! # Overview
//!
//! A [`Scheduler`] keeps a registry of named [`Job`]s. Each scheduled job has
//! one pending [`Invocation`]; the check loop ([`Scheduler::run`], or
//! [`Scheduler::tick`] when driven by hand) fires every job whose date has
//! arrived, then re-arms recurring jobs with the next matching date.
//!
//! # Triggers
//!
//! | Variant | Behaviour                                               |
//! |---------|---------------------------------------------------------|
//! | `Rule`  | Every instant matching a sparse [`RecurrenceRule`] (UTC) |
//! | `At`    | Single fire at an absolute UTC instant                  |
//! | `Cron`  | 5- or 6-field cron text, parsed into a rule             |
//!
//! Rules that can never match fail with `NoMatchingDate` instead of searching
//! forever; the search stops after `horizon_years`.
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use vigil_scheduler::{JobStatus, RecurrenceRule, Scheduler};
//!
//! let scheduler = Scheduler::default();
//! let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
//! let rule = RecurrenceRule::new().second(0);
//! let job = scheduler
//!     .schedule_job_at(Some("every-minute"), rule, |_| Ok(()), now)
//!     .unwrap();
//! assert_eq!(job.next_invocation(), Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap()));
//! assert!(job.cancel());
//! assert_eq!(job.status(), JobStatus::Canceled);
//! ```

pub mod cron;
pub mod engine;
pub mod error;
pub mod job;
pub mod range;
pub mod rule;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use job::{Job, JobCallback};
pub use range::Range;
pub use rule::{FieldSpec, Matcher, RecurrenceRule};
pub use types::{Invocation, JobEvent, JobEventKind, JobStatus, Trigger};

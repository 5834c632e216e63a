use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;
use vigil_core::config::SchedulerConfig;

use crate::{
    error::{Result, SchedulerError},
    job::{Job, JobCallback},
    types::Trigger,
};

/// State shared between the scheduler handle and its jobs.
pub(crate) struct Shared {
    /// Jobs with a pending invocation (or mid-firing), keyed by name.
    jobs: DashMap<String, Job>,
    pub(crate) horizon_years: u32,
    max_listeners: usize,
    anonymous: AtomicU64,
}

impl Shared {
    /// Add `job` to the registry. Fails if another job already owns the name.
    pub(crate) fn register(&self, job: &Job) -> Result<()> {
        match self.jobs.entry(job.name().to_string()) {
            Entry::Occupied(e) if e.get().id() != job.id() => Err(SchedulerError::DuplicateJob {
                name: job.name().to_string(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(e) => {
                e.insert(job.clone());
                Ok(())
            }
        }
    }

    /// Remove `job` from the registry if the name still points at it.
    pub(crate) fn unregister(&self, job: &Job) {
        self.jobs.remove_if(job.name(), |_, registered| registered.id() == job.id());
    }
}

/// In-process job scheduler.
///
/// Cheap to clone; clones drive the same registry. Jobs fire from
/// [`tick`](Self::tick), which [`run`](Self::run) calls on a fixed interval.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                jobs: DashMap::new(),
                horizon_years: config.horizon_years,
                max_listeners: config.max_listeners,
                anonymous: AtomicU64::new(0),
            }),
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
        }
    }

    pub fn horizon_years(&self) -> u32 {
        self.shared.horizon_years
    }

    /// Create a job without scheduling it. Attach a trigger with
    /// [`Job::schedule`].
    ///
    /// Unnamed jobs are called `<Anonymous Job N>`.
    pub fn create_job<F>(&self, name: Option<&str>, callback: F) -> Job
    where
        F: Fn(DateTime<Utc>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let n = self.shared.anonymous.fetch_add(1, Ordering::Relaxed) + 1;
                format!("<Anonymous Job {n}>")
            }
        };
        let callback: JobCallback = Arc::new(callback);
        Job::new(
            Uuid::new_v4().to_string(),
            name,
            callback,
            self.shared.max_listeners,
            Arc::downgrade(&self.shared),
        )
    }

    /// Create a job and schedule it in one step.
    ///
    /// Fails with `NoMatchingDate` for a rule that never fires, `InvalidCron`
    /// for bad cron text and `DuplicateJob` when the name is taken. Nothing is
    /// registered on failure.
    pub fn schedule_job<F>(
        &self,
        name: Option<&str>,
        trigger: impl Into<Trigger>,
        callback: F,
    ) -> Result<Job>
    where
        F: Fn(DateTime<Utc>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.schedule_job_at(name, trigger, callback, Utc::now())
    }

    /// [`schedule_job`](Self::schedule_job) evaluated as if the current time
    /// were `now`.
    pub fn schedule_job_at<F>(
        &self,
        name: Option<&str>,
        trigger: impl Into<Trigger>,
        callback: F,
        now: DateTime<Utc>,
    ) -> Result<Job>
    where
        F: Fn(DateTime<Utc>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let job = self.create_job(name, callback);
        job.schedule_at(trigger, now)?;
        Ok(job)
    }

    /// Same as [`Job::cancel`].
    pub fn cancel_job(&self, job: &Job) -> bool {
        job.cancel()
    }

    /// Cancel the registered job called `name`.
    pub fn cancel_job_by_name(&self, name: &str) -> Result<bool> {
        let job = self.job(name).ok_or_else(|| SchedulerError::JobNotFound {
            name: name.to_string(),
        })?;
        Ok(job.cancel())
    }

    /// Replace the trigger of the registered job called `name`.
    ///
    /// If the new trigger fails, the old invocation stays armed.
    pub fn reschedule_job(&self, name: &str, trigger: impl Into<Trigger>) -> Result<Job> {
        let job = self.job(name).ok_or_else(|| SchedulerError::JobNotFound {
            name: name.to_string(),
        })?;
        job.schedule(trigger)?;
        Ok(job)
    }

    /// Registered job by name.
    pub fn job(&self, name: &str) -> Option<Job> {
        self.shared.jobs.get(name).map(|entry| entry.value().clone())
    }

    /// Snapshot of every registered job, ordered by name.
    pub fn scheduled_jobs(&self) -> BTreeMap<String, Job> {
        self.shared
            .jobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Fire every due job once. Returns how many fired.
    pub fn tick(&self) -> usize {
        self.tick_at(Utc::now())
    }

    /// [`tick`](Self::tick) as if the current time were `now`.
    ///
    /// A job that missed several occurrences fires once; its next date is
    /// computed after `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) -> usize {
        // Collect first so no registry lock is held while callbacks run.
        let mut due: Vec<(DateTime<Utc>, Job)> = self
            .shared
            .jobs
            .iter()
            .filter_map(|entry| {
                let job = entry.value();
                job.due_at(now).map(|date| (date, job.clone()))
            })
            .collect();
        due.sort_by_key(|(date, _)| *date);

        let mut fired = 0;
        for (_, job) in due {
            if job.fire(now, self.shared.horizon_years) {
                fired += 1;
            }
        }
        if fired > 0 {
            debug!(fired, "scheduler tick");
        }
        fired
    }

    /// Cancel every registered job. Returns how many were canceled.
    pub fn shutdown_all(&self) -> usize {
        let jobs: Vec<Job> = self
            .shared
            .jobs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let canceled = jobs.iter().filter(|job| job.cancel()).count();
        info!(canceled, "all jobs canceled");
        canceled
    }

    /// Main check loop. Ticks every `tick_interval_ms` until `shutdown`
    /// broadcasts `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.tick_interval.as_millis() as u64, "scheduler started");

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(&SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.shared.jobs.len())
            .field("horizon_years", &self.shared.horizon_years)
            .field("tick_interval", &self.tick_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RecurrenceRule;
    use crate::types::JobStatus;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    fn noop(_: DateTime<Utc>) -> std::result::Result<(), String> {
        Ok(())
    }

    #[test]
    fn anonymous_names_are_numbered() {
        let scheduler = Scheduler::default();
        let a = scheduler.create_job(None, noop);
        let b = scheduler.create_job(None, noop);
        assert_eq!(a.name(), "<Anonymous Job 1>");
        assert_eq!(b.name(), "<Anonymous Job 2>");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn created_job_is_unscheduled_and_unregistered() {
        let scheduler = Scheduler::default();
        let job = scheduler.create_job(Some("idle"), noop);
        assert_eq!(job.status(), JobStatus::Unscheduled);
        assert!(scheduler.job("idle").is_none());
        assert!(job.next_invocation().is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let scheduler = Scheduler::default();
        let now = at(2026, 1, 1, 0, 0, 0);
        let rule = RecurrenceRule::new().second(0);
        scheduler
            .schedule_job_at(Some("dup"), rule.clone(), noop, now)
            .unwrap();
        let err = scheduler
            .schedule_job_at(Some("dup"), rule, noop, now)
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_JOB");
        assert_eq!(scheduler.scheduled_jobs().len(), 1);
    }

    #[test]
    fn failed_schedule_registers_nothing() {
        let scheduler = Scheduler::default();
        let now = at(2026, 1, 1, 0, 0, 0);
        let never = RecurrenceRule::new().month(4).date(31);
        assert!(scheduler
            .schedule_job_at(Some("never"), never, noop, now)
            .is_err());
        assert!(scheduler.job("never").is_none());
    }

    #[test]
    fn not_due_yet_does_not_fire() {
        let scheduler = Scheduler::default();
        let now = at(2026, 1, 1, 0, 0, 0);
        let job = scheduler
            .schedule_job_at(Some("later"), at(2026, 1, 1, 0, 5, 0), noop, now)
            .unwrap();
        assert_eq!(scheduler.tick_at(at(2026, 1, 1, 0, 4, 59)), 0);
        assert_eq!(job.status(), JobStatus::Scheduled);
        assert_eq!(scheduler.tick_at(at(2026, 1, 1, 0, 5, 0)), 1);
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn cancel_by_name() {
        let scheduler = Scheduler::default();
        let now = at(2026, 1, 1, 0, 0, 0);
        scheduler
            .schedule_job_at(Some("named"), "* * * * *", noop, now)
            .unwrap();
        assert!(scheduler.cancel_job_by_name("named").unwrap());
        assert!(matches!(
            scheduler.cancel_job_by_name("named"),
            Err(SchedulerError::JobNotFound { .. })
        ));
    }

    #[test]
    fn shutdown_all_cancels_everything() {
        let scheduler = Scheduler::default();
        let now = at(2026, 1, 1, 0, 0, 0);
        let a = scheduler
            .schedule_job_at(Some("a"), "@hourly", noop, now)
            .unwrap();
        let b = scheduler
            .schedule_job_at(Some("b"), "@daily", noop, now)
            .unwrap();
        assert_eq!(scheduler.shutdown_all(), 2);
        assert_eq!(a.status(), JobStatus::Canceled);
        assert_eq!(b.status(), JobStatus::Canceled);
        assert!(scheduler.scheduled_jobs().is_empty());
    }

    #[test]
    fn dropped_scheduler_leaves_jobs_unschedulable() {
        let scheduler = Scheduler::default();
        let job = scheduler.create_job(Some("orphan"), noop);
        drop(scheduler);
        assert!(matches!(
            job.schedule("@daily"),
            Err(SchedulerError::SchedulerGone)
        ));
    }
}

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use vigil_events::EventEmitter;

use crate::{
    cron,
    engine::Shared,
    error::{Result, SchedulerError},
    rule::RecurrenceRule,
    types::{Invocation, JobEvent, JobStatus, Trigger},
};

/// Work run when a job fires. Receives the nominal fire date.
///
/// An `Err` is logged and otherwise ignored; the job still transitions.
pub type JobCallback = Arc<dyn Fn(DateTime<Utc>) -> std::result::Result<(), String> + Send + Sync>;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

fn next_timer_id() -> u64 {
    NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed)
}

/// What the job does after it fires.
#[derive(Debug, Clone)]
enum Plan {
    Recurring(RecurrenceRule),
    Once(DateTime<Utc>),
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    plan: Option<Plan>,
    pending: Option<Invocation>,
    run_count: u64,
    last_run: Option<DateTime<Utc>>,
}

struct JobInner {
    /// UUID v4 string.
    id: String,
    name: String,
    callback: JobCallback,
    events: EventEmitter<JobEvent>,
    state: Mutex<JobState>,
    scheduler: Weak<Shared>,
}

/// Handle to a scheduled unit of work. Clones refer to the same job.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    pub(crate) fn new(
        id: String,
        name: String,
        callback: JobCallback,
        max_listeners: usize,
        scheduler: Weak<Shared>,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id,
                name,
                callback,
                events: EventEmitter::with_max_listeners(max_listeners),
                state: Mutex::new(JobState {
                    status: JobStatus::Unscheduled,
                    plan: None,
                    pending: None,
                    run_count: 0,
                    last_run: None,
                }),
                scheduler,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    /// Lifecycle event emitter (`scheduled`, `run`, `canceled`).
    pub fn events(&self) -> &EventEmitter<JobEvent> {
        &self.inner.events
    }

    /// The currently armed invocation, if any.
    pub fn pending_invocation(&self) -> Option<Invocation> {
        self.state().pending.clone()
    }

    /// Date of the next firing, if one is armed.
    pub fn next_invocation(&self) -> Option<DateTime<Utc>> {
        self.state().pending.as_ref().map(|inv| inv.fire_date)
    }

    /// Number of times the callback has been invoked.
    pub fn run_count(&self) -> u64 {
        self.state().run_count
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state().last_run
    }

    /// Attach `trigger` to this job, replacing any pending invocation.
    ///
    /// Works on unscheduled, completed and canceled jobs alike. On failure the
    /// job keeps whatever it had before. Returns the first fire date.
    pub fn schedule(&self, trigger: impl Into<Trigger>) -> Result<DateTime<Utc>> {
        self.schedule_at(trigger, Utc::now())
    }

    /// [`schedule`](Self::schedule) evaluated as if the current time were `now`.
    pub fn schedule_at(
        &self,
        trigger: impl Into<Trigger>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let shared = self
            .inner
            .scheduler
            .upgrade()
            .ok_or(SchedulerError::SchedulerGone)?;

        let plan = match trigger.into() {
            Trigger::Rule { rule } => Plan::Recurring(rule),
            Trigger::Cron { expression } => Plan::Recurring(cron::parse(&expression)?),
            Trigger::At { at } => Plan::Once(at),
        };
        let fire_date = match &plan {
            Plan::Recurring(rule) => rule.next_after(now, shared.horizon_years)?,
            Plan::Once(at) => *at,
        };

        shared.register(self)?;

        {
            let mut state = self.state();
            state.pending = Some(self.invocation(fire_date, &plan));
            state.plan = Some(plan);
            state.status = JobStatus::Scheduled;
        }

        info!(job_id = %self.inner.id, name = %self.inner.name, %fire_date, "job scheduled");
        self.inner.events.emit(&JobEvent::Scheduled { fire_date });
        Ok(fire_date)
    }

    /// Tear down the pending invocation.
    ///
    /// Returns `true` only when something was actually canceled: a scheduled
    /// job, or a recurring job whose callback is running (it will not re-arm).
    pub fn cancel(&self) -> bool {
        let fire_date = {
            let mut state = self.state();
            let recurring = matches!(state.plan, Some(Plan::Recurring(_)));
            match state.status {
                JobStatus::Scheduled => {}
                JobStatus::Firing if recurring => {}
                _ => return false,
            }
            state.status = JobStatus::Canceled;
            state.pending.take().map(|inv| inv.fire_date)
        };

        if let Some(shared) = self.inner.scheduler.upgrade() {
            shared.unregister(self);
        }
        info!(job_id = %self.inner.id, name = %self.inner.name, "job canceled");
        self.inner.events.emit(&JobEvent::Canceled { fire_date });
        true
    }

    /// Fire date of the pending invocation if it is due at `now`.
    pub(crate) fn due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let state = self.state();
        if state.status != JobStatus::Scheduled {
            return None;
        }
        state
            .pending
            .as_ref()
            .map(|inv| inv.fire_date)
            .filter(|date| *date <= now)
    }

    /// Run one firing if the job is due at `now`. Returns whether it fired.
    ///
    /// No lock is held while the callback runs, so it may cancel or
    /// reschedule any job, this one included.
    pub(crate) fn fire(&self, now: DateTime<Utc>, horizon_years: u32) -> bool {
        let invocation = {
            let mut state = self.state();
            if state.status != JobStatus::Scheduled {
                return false;
            }
            let invocation = match state.pending.take() {
                Some(inv) if inv.fire_date <= now => inv,
                other => {
                    state.pending = other;
                    return false;
                }
            };
            state.status = JobStatus::Firing;
            state.run_count += 1;
            state.last_run = Some(now);
            invocation
        };

        let fire_date = invocation.fire_date;
        debug!(job_id = %self.inner.id, timer_id = invocation.timer_id, %fire_date, "firing job");
        self.inner.events.emit(&JobEvent::Run { fire_date });

        let callback = Arc::clone(&self.inner.callback);
        match panic::catch_unwind(AssertUnwindSafe(|| callback(fire_date))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(job_id = %self.inner.id, name = %self.inner.name, "job callback failed: {e}"),
            Err(_) => error!(job_id = %self.inner.id, name = %self.inner.name, "job callback panicked"),
        }

        let rearmed = {
            let mut state = self.state();
            // Canceled or rescheduled from inside the callback.
            if state.status != JobStatus::Firing {
                return true;
            }
            match state.plan.clone() {
                Some(Plan::Recurring(rule)) => match rule.next_after(now, horizon_years) {
                    Ok(next) => {
                        state.pending = Some(self.invocation(next, &Plan::Recurring(rule)));
                        state.status = JobStatus::Scheduled;
                        Some(next)
                    }
                    Err(e) => {
                        warn!(job_id = %self.inner.id, name = %self.inner.name, "recurrence exhausted: {e}");
                        state.status = JobStatus::Completed;
                        None
                    }
                },
                _ => {
                    state.status = JobStatus::Completed;
                    None
                }
            }
        };

        match rearmed {
            Some(next) => {
                info!(job_id = %self.inner.id, name = %self.inner.name, next = %next, "job re-armed");
                self.inner.events.emit(&JobEvent::Scheduled { fire_date: next });
            }
            None => {
                info!(job_id = %self.inner.id, name = %self.inner.name, "job completed");
                if let Some(shared) = self.inner.scheduler.upgrade() {
                    shared.unregister(self);
                }
            }
        }
        true
    }

    fn invocation(&self, fire_date: DateTime<Utc>, plan: &Plan) -> Invocation {
        Invocation {
            job_id: self.inner.id.clone(),
            job_name: self.inner.name.clone(),
            fire_date,
            recurrence_rule: match plan {
                Plan::Recurring(rule) => Some(rule.clone()),
                Plan::Once(_) => None,
            },
            timer_id: next_timer_id(),
        }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.inner.state.lock().expect("job state lock poisoned")
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &state.status)
            .field("pending", &state.pending)
            .field("run_count", &state.run_count)
            .finish()
    }
}

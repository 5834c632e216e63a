use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The recurrence rule never matches within the search horizon.
    #[error("No matching date within {horizon_years} years")]
    NoMatchingDate { horizon_years: u32 },

    /// The cron-like expression could not be parsed.
    #[error("Invalid cron expression `{expression}`: {reason}")]
    InvalidCron { expression: String, reason: String },

    /// No job with the given name is registered.
    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    /// Another scheduled job already uses this name.
    #[error("Duplicate job name: {name}")]
    DuplicateJob { name: String },

    /// The scheduler owning the job has been dropped.
    #[error("Scheduler is gone")]
    SchedulerGone,
}

impl SchedulerError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::NoMatchingDate { .. } => "NO_MATCHING_DATE",
            SchedulerError::InvalidCron { .. } => "INVALID_CRON",
            SchedulerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            SchedulerError::DuplicateJob { .. } => "DUPLICATE_JOB",
            SchedulerError::SchedulerGone => "SCHEDULER_GONE",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

//! `vigil-core`: configuration and error types shared by the vigil crates.

pub mod config;
pub mod error;

pub use config::{HashConfig, JobConfig, SchedulerConfig, VigilConfig};
pub use error::{Result, VigilError};

//! Error types for the vigil-hash crate.

use thiserror::Error;

/// All errors the hashing engine reports. None are retried internally.
#[derive(Debug, Error)]
pub enum HashError {
    /// The input cannot be hashed (e.g. longer than `max_input_bytes`).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested cost factor is outside the accepted bound.
    #[error("Invalid cost factor {cost}: expected {min}..={max}")]
    InvalidCostFactor { cost: u32, min: u32, max: u32 },

    /// The salt string does not match the salt encoding.
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    /// A stored digest is malformed. Distinct from "does not match".
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// The blocking worker was cancelled or panicked.
    #[error("Hash worker failed: {0}")]
    Worker(String),

    /// Unexpected failure inside the Argon2 backend.
    #[error("Hash backend error: {0}")]
    Backend(String),
}

impl HashError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            HashError::InvalidInput(_) => "INVALID_INPUT",
            HashError::InvalidCostFactor { .. } => "INVALID_COST_FACTOR",
            HashError::InvalidSalt(_) => "INVALID_SALT",
            HashError::InvalidDigest(_) => "INVALID_DIGEST",
            HashError::Worker(_) => "WORKER_ERROR",
            HashError::Backend(_) => "BACKEND_ERROR",
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, HashError>;

//! `Hasher`: blocking, future and callback forms of every hashing operation.
//!
//! The blocking form runs on the caller's thread. The future form hands the
//! same computation to Tokio's blocking pool, gated by a semaphore sized from
//! `HashConfig::pool_size` so a burst of logins cannot starve the pool. The
//! callback form spawns the future form and passes its result on.

use std::sync::Arc;

use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use rand::rngs::OsRng;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vigil_core::config::HashConfig;

use crate::encoding::{argon2_for, check_cost, encode_salt, parse_digest, parse_salt};
use crate::error::{HashError, Result};

/// Either a pre-generated salt string or a cost factor to generate one with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaltOrCost {
    Salt(String),
    Cost(u32),
}

impl From<&str> for SaltOrCost {
    fn from(salt: &str) -> Self {
        SaltOrCost::Salt(salt.to_string())
    }
}

impl From<String> for SaltOrCost {
    fn from(salt: String) -> Self {
        SaltOrCost::Salt(salt)
    }
}

impl From<u32> for SaltOrCost {
    fn from(cost: u32) -> Self {
        SaltOrCost::Cost(cost)
    }
}

/// Password hashing engine. Cheap to clone; clones share the worker budget.
#[derive(Debug, Clone)]
pub struct Hasher {
    default_cost: u32,
    max_input_bytes: usize,
    permits: Arc<Semaphore>,
}

impl Hasher {
    pub fn new(config: &HashConfig) -> Self {
        Self {
            default_cost: config.default_cost,
            max_input_bytes: config.max_input_bytes,
            permits: Arc::new(Semaphore::new(config.pool_size.max(1))),
        }
    }

    pub fn default_cost(&self) -> u32 {
        self.default_cost
    }

    // -----------------------------------------------------------------------
    // Blocking forms
    // -----------------------------------------------------------------------

    /// Generate a salt for `cost`. Each call draws fresh bytes from the OS RNG.
    pub fn generate_salt(&self, cost: u32) -> Result<String> {
        generate_salt(cost)
    }

    /// Generate a salt with the configured default cost.
    pub fn generate_salt_default(&self) -> Result<String> {
        generate_salt(self.default_cost)
    }

    /// Hash `data` with the given salt, or with a new salt of the given cost.
    pub fn hash(&self, data: impl AsRef<[u8]>, salt: impl Into<SaltOrCost>) -> Result<String> {
        hash(data.as_ref(), &salt.into(), self.max_input_bytes)
    }

    /// Check `data` against a stored digest.
    ///
    /// `Ok(false)` means the data does not match; a malformed digest is an
    /// `InvalidDigest` error, never `Ok(false)`.
    pub fn compare(&self, data: impl AsRef<[u8]>, digest: &str) -> Result<bool> {
        compare(data.as_ref(), digest, self.max_input_bytes)
    }

    // -----------------------------------------------------------------------
    // Future forms
    // -----------------------------------------------------------------------

    pub async fn generate_salt_async(&self, cost: u32) -> Result<String> {
        self.offload("generate_salt", move || generate_salt(cost))
            .await
    }

    pub async fn hash_async(
        &self,
        data: impl Into<Vec<u8>>,
        salt: impl Into<SaltOrCost>,
    ) -> Result<String> {
        let data = data.into();
        let salt = salt.into();
        let max = self.max_input_bytes;
        self.offload("hash", move || hash(&data, &salt, max)).await
    }

    pub async fn compare_async(
        &self,
        data: impl Into<Vec<u8>>,
        digest: impl Into<String>,
    ) -> Result<bool> {
        let data = data.into();
        let digest = digest.into();
        let max = self.max_input_bytes;
        self.offload("compare", move || compare(&data, &digest, max))
            .await
    }

    // -----------------------------------------------------------------------
    // Callback forms (must be called from within a Tokio runtime)
    // -----------------------------------------------------------------------

    pub fn generate_salt_with_callback<F>(&self, cost: u32, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<String>) + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move { callback(this.generate_salt_async(cost).await) })
    }

    pub fn hash_with_callback<F>(
        &self,
        data: impl Into<Vec<u8>>,
        salt: impl Into<SaltOrCost>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<String>) + Send + 'static,
    {
        let this = self.clone();
        let data = data.into();
        let salt = salt.into();
        tokio::spawn(async move { callback(this.hash_async(data, salt).await) })
    }

    pub fn compare_with_callback<F>(
        &self,
        data: impl Into<Vec<u8>>,
        digest: impl Into<String>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        let this = self.clone();
        let data = data.into();
        let digest = digest.into();
        tokio::spawn(async move { callback(this.compare_async(data, digest).await) })
    }

    /// Run `work` on the blocking pool once a worker permit is available.
    async fn offload<T, F>(&self, op: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| HashError::Worker(e.to_string()))?;
        debug!(op, available = self.permits.available_permits(), "offloading to blocking pool");

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|e| {
            warn!(op, "hash worker failed: {e}");
            HashError::Worker(e.to_string())
        })?
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(&HashConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Pure operations shared by every calling convention
// ---------------------------------------------------------------------------

fn generate_salt(cost: u32) -> Result<String> {
    check_cost(cost)?;
    Ok(encode_salt(cost, &SaltString::generate(&mut OsRng)))
}

fn check_input(data: &[u8], max_input_bytes: usize) -> Result<()> {
    if data.len() > max_input_bytes {
        return Err(HashError::InvalidInput(format!(
            "input is {} bytes, limit is {max_input_bytes}",
            data.len()
        )));
    }
    Ok(())
}

fn hash(data: &[u8], salt: &SaltOrCost, max_input_bytes: usize) -> Result<String> {
    check_input(data, max_input_bytes)?;
    let generated;
    let salt = match salt {
        SaltOrCost::Salt(s) => s.as_str(),
        SaltOrCost::Cost(cost) => {
            generated = generate_salt(*cost)?;
            generated.as_str()
        }
    };
    let parsed = parse_salt(salt)?;
    let argon2 = argon2_for(parsed.cost)?;
    let digest = argon2
        .hash_password(data, parsed.salt)
        .map_err(|e| HashError::Backend(e.to_string()))?
        .to_string();
    debug!(cost = parsed.cost, "hashed input");
    Ok(digest)
}

fn compare(data: &[u8], digest: &str, max_input_bytes: usize) -> Result<bool> {
    let parsed = parse_digest(digest)?;
    // An over-long input cannot have produced a valid digest.
    if check_input(data, max_input_bytes).is_err() {
        return Ok(false);
    }
    let argon2 = argon2_for(parsed.cost)?;
    // Output equality inside verify_password is constant time.
    match argon2.verify_password(data, &parsed.phc) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(HashError::InvalidDigest(e.to_string())),
    }
}

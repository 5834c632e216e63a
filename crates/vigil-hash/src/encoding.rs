//! Salt and digest encodings.
//!
//! Both are PHC strings for Argon2id with fixed `t` and `p`; only the memory
//! cost varies and it is always a power of two, so the cost factor is
//! `log2(m)`:
//!
//! ```text
//! salt:   $argon2id$v=19$m=1024,t=3,p=1$<22 chars b64>
//! digest: $argon2id$v=19$m=1024,t=3,p=1$<22 chars b64>$<43 chars b64>
//! ```
//!
//! A digest always starts with the salt it was produced from.

use argon2::password_hash::{PasswordHash, Salt, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::{HashError, Result};

pub use vigil_core::config::{DEFAULT_COST, MAX_COST, MIN_COST};

pub const ALGORITHM: &str = "argon2id";
pub const VERSION: u32 = 0x13;
/// Argon2 passes over memory. Fixed; the cost factor scales memory instead.
pub const TIME_COST: u32 = 3;
pub const PARALLELISM: u32 = 1;
/// 16 random bytes, unpadded B64.
pub const SALT_B64_LEN: usize = 22;
/// Hash output length in bytes.
pub const OUTPUT_LEN: usize = 32;

/// A salt or digest that passed structural validation.
#[derive(Debug)]
pub(crate) struct Parsed<'a> {
    pub cost: u32,
    pub salt: Salt<'a>,
    pub phc: PasswordHash<'a>,
}

pub(crate) fn check_cost(cost: u32) -> Result<()> {
    if (MIN_COST..=MAX_COST).contains(&cost) {
        Ok(())
    } else {
        Err(HashError::InvalidCostFactor {
            cost,
            min: MIN_COST,
            max: MAX_COST,
        })
    }
}

/// Memory cost in KiB for a cost factor.
pub(crate) fn memory_kib(cost: u32) -> u32 {
    1u32 << cost
}

pub(crate) fn argon2_for(cost: u32) -> Result<Argon2<'static>> {
    check_cost(cost)?;
    let params = Params::new(memory_kib(cost), TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| HashError::Backend(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Render the salt string for `cost` and freshly generated salt bytes.
pub(crate) fn encode_salt(cost: u32, salt: &SaltString) -> String {
    format!(
        "${ALGORITHM}$v={}$m={},t={TIME_COST},p={PARALLELISM}${}",
        VERSION,
        memory_kib(cost),
        salt.as_str()
    )
}

/// Parse a salt string. The hash segment must be absent.
pub(crate) fn parse_salt(s: &str) -> Result<Parsed<'_>> {
    let parsed = parse_phc(s).map_err(HashError::InvalidSalt)?;
    if parsed.phc.hash.is_some() {
        return Err(HashError::InvalidSalt(
            "value carries a hash segment; pass a salt, not a digest".to_string(),
        ));
    }
    Ok(parsed)
}

/// Parse a digest string. The hash segment must be present and full length.
pub(crate) fn parse_digest(s: &str) -> Result<Parsed<'_>> {
    let parsed = parse_phc(s).map_err(HashError::InvalidDigest)?;
    match parsed.phc.hash {
        Some(ref out) if out.len() == OUTPUT_LEN => Ok(parsed),
        Some(ref out) => Err(HashError::InvalidDigest(format!(
            "hash segment is {} bytes, expected {OUTPUT_LEN}",
            out.len()
        ))),
        None => Err(HashError::InvalidDigest("missing hash segment".to_string())),
    }
}

/// Return the cost factor a digest was produced with.
///
/// Pure; fails with `InvalidDigest` if `digest` is malformed.
pub fn extract_cost_factor(digest: &str) -> Result<u32> {
    parse_digest(digest).map(|p| p.cost)
}

/// Structural checks shared by salts and digests. Errors are reasons.
fn parse_phc(s: &str) -> std::result::Result<Parsed<'_>, String> {
    let phc = PasswordHash::new(s).map_err(|e| format!("not a PHC string: {e}"))?;

    if phc.algorithm.as_str() != ALGORITHM {
        return Err(format!("unsupported algorithm `{}`", phc.algorithm));
    }
    if phc.version != Some(VERSION) {
        return Err(format!("unsupported version {:?}", phc.version));
    }
    if phc.params.iter().count() != 3 {
        return Err("expected exactly the m, t and p parameters".to_string());
    }
    let (Some(m), Some(t), Some(p)) = (
        phc.params.get_decimal("m"),
        phc.params.get_decimal("t"),
        phc.params.get_decimal("p"),
    ) else {
        return Err("missing m, t or p parameter".to_string());
    };
    if t != TIME_COST || p != PARALLELISM {
        return Err(format!("unexpected t={t}, p={p}"));
    }
    if !m.is_power_of_two() {
        return Err(format!("memory cost {m} is not a power of two"));
    }
    let cost = m.trailing_zeros();
    if check_cost(cost).is_err() {
        return Err(format!("cost factor {cost} outside {MIN_COST}..={MAX_COST}"));
    }
    let salt = match phc.salt {
        Some(salt) if salt.len() == SALT_B64_LEN => salt,
        Some(salt) => {
            return Err(format!(
                "salt is {} chars, expected {SALT_B64_LEN}",
                salt.len()
            ))
        }
        None => return Err("missing salt segment".to_string()),
    };

    Ok(Parsed { cost, salt, phc })
}

//! `vigil-hash`: salted, cost-parameterized password digests.
//!
//! # Overview
//!
//! A digest is an Argon2id PHC string whose memory cost is `2^cost` KiB, so
//! each increment of the cost factor doubles the work. Salts and digests are
//! self-describing: [`extract_cost_factor`] reads the cost back out of a
//! digest without any external state.
//!
//! # Calling conventions
//!
//! | Form     | Methods                                             |
//! |----------|-----------------------------------------------------|
//! | Blocking | `generate_salt`, `hash`, `compare`                  |
//! | Future   | `generate_salt_async`, `hash_async`, `compare_async` |
//! | Callback | `*_with_callback` (spawns onto the current runtime) |
//!
//! All three return identical results for identical inputs.
//!
//! ```rust
//! use vigil_hash::Hasher;
//!
//! let hasher = Hasher::default();
//! let digest = hasher.hash("correct horse", 4).unwrap();
//! assert!(hasher.compare("correct horse", &digest).unwrap());
//! assert_eq!(vigil_hash::extract_cost_factor(&digest).unwrap(), 4);
//! ```

pub mod encoding;
pub mod error;
pub mod hasher;

pub use encoding::{extract_cost_factor, DEFAULT_COST, MAX_COST, MIN_COST};
pub use error::{HashError, Result};
pub use hasher::{Hasher, SaltOrCost};

//! Secret hashing used for user passwords and the per-game registration secrets.
//!
//! The rest of the crate only sees the [`SecretHasher`] trait; swap in a different
//! implementation without touching the stores.

use crate::OvoError;

// Mirrors bcrypt's cost bounds, which the bcrypt crate keeps private.
const BCRYPT_MIN_COST: u32 = 4;
const BCRYPT_MAX_COST: u32 = 31;

pub trait SecretHasher: Send + Sync {
    /// Produces a self-describing, salted hash of `secret`.
    fn hash(&self, secret: &str) -> Result<String, OvoError>;

    /// Checks `secret` against a value previously returned by [`SecretHasher::hash`].
    /// Malformed hashes never verify.
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// bcrypt, stored in the modular crypt format (`$2b$<cost>$...`).
///
/// The cost only affects new hashes; verification reads it from the stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bcrypt {
    cost: u32,
}

impl Bcrypt {
    /// The lowest cost bcrypt accepts. Fast enough for tests, too weak for anything else.
    pub const CHEAPEST: Bcrypt = Bcrypt {
        cost: BCRYPT_MIN_COST,
    };

    /// A hasher with the given cost; values outside bcrypt's range are clamped.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(BCRYPT_MIN_COST, BCRYPT_MAX_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for Bcrypt {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl SecretHasher for Bcrypt {
    fn hash(&self, secret: &str) -> Result<String, OvoError> {
        bcrypt::hash(secret, self.cost)
            .map_err(|e| OvoError::Internal(format!("cannot hash secret: {}", e)))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        bcrypt::verify(secret, hash).unwrap_or(false)
    }
}

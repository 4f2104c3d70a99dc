// src/core/hasher.rs

//! The password hashing primitive. Concrete algorithm: BCrypt.

use tracing::error;

/// Capability set for verifying and producing password hashes.
pub trait PasswordHasher: Send + Sync {
    /// Verifies `plaintext` against a previously produced `hash`.
    /// Returns `false` (never an error) for a malformed hash, the same way
    /// a corrupt stored hash should fail closed rather than panic.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;

    /// Hashes `plaintext`, producing an opaque string suitable for storage.
    fn hash(&self, plaintext: &str) -> anyhow::Result<String>;
}

/// The production hasher, backed by BCrypt.
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match bcrypt::verify(plaintext, hash) {
            Ok(matches) => matches,
            Err(e) => {
                error!(error = %e, "rejecting verification: stored hash is not a valid bcrypt hash");
                false
            }
        }
    }

    fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_a_hash_it_produced() {
        let hasher = BcryptHasher::new(4); // low cost for fast tests
        let hash = hasher.hash("s3cr3t").unwrap();
        assert!(hasher.verify("s3cr3t", &hash));
        assert!(!hasher.verify("wrong", &hash));
    }

    #[test]
    fn rejects_a_malformed_stored_hash_instead_of_panicking() {
        let hasher = BcryptHasher::new(4);
        assert!(!hasher.verify("s3cr3t", "not-a-bcrypt-hash"));
    }
}

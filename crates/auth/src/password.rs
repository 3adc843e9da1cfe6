//! Credential Store: bcrypt with a fixed truncation policy.
//!
//! bcrypt only looks at the first 72 bytes of its input. Inputs are cut to
//! that many bytes, backing off to the previous UTF-8 boundary, and the same
//! cut is applied when hashing and when verifying.

use thiserror::Error;
use tracing::warn;

pub const BCRYPT_MAX_BYTES: usize = 72;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone, Copy)]
pub struct CredentialStore {
    cost: u32,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialStore {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(truncate(password), self.cost)?)
    }

    /// A malformed digest never verifies.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        match bcrypt::verify(truncate(password), digest) {
            Ok(ok) => ok,
            Err(err) => {
                warn!(error = %err, "stored password digest is unreadable");
                false
            }
        }
    }
}

pub fn truncate(password: &str) -> &str {
    if password.len() <= BCRYPT_MAX_BYTES {
        return password;
    }
    let mut end = BCRYPT_MAX_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

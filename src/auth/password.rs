use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AppResult;

/// Hash a password for storage. bcrypt salts internally, so equal passwords
/// still produce distinct hashes.
pub fn hash_password(password: &str) -> AppResult<String> {
    Ok(hash(password, DEFAULT_COST)?)
}

/// Check a plaintext password against a stored bcrypt hash. A stored value
/// that is not a valid bcrypt hash reads as a failed check, not an error.
pub fn verify_password(password: &str, stored: &str) -> bool {
    verify(password, stored).unwrap_or(false)
}

// core/src/password.rs

//! Password hashing and verification with Argon2.

use crate::error::CoreError;
use argon2::{
  password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use rand_core::OsRng;
use tracing::{debug, error, instrument};

/// Hashes a plain-text password with a fresh random salt and default Argon2 parameters.
#[instrument(name = "password::hash", skip(password), err(Display))]
pub fn hash_password(password: &str) -> Result<String, CoreError> {
  if password.is_empty() {
    return Err(CoreError::Validation("Password cannot be empty.".to_string()));
  }

  let salt = SaltString::generate(&mut OsRng);
  match Argon2::default().hash_password(password.as_bytes(), &salt) {
    Ok(hash) => {
      debug!("Password hashed successfully.");
      Ok(hash.to_string())
    }
    Err(argon_err) => {
      error!(error = %argon_err, "Argon2 password hashing failed.");
      Err(CoreError::Internal(format!("Password hashing process failed: {}", argon_err)))
    }
  }
}

/// Returns `Ok(false)` on a mismatch; errors only for a malformed stored hash.
#[instrument(name = "password::verify", skip_all, err(Display))]
pub fn verify_password(stored_hash: &str, provided: &str) -> Result<bool, CoreError> {
  if provided.is_empty() {
    return Ok(false);
  }

  let parsed = PasswordHash::new(stored_hash).map_err(|parse_err| {
    error!(error = %parse_err, "Failed to parse stored password hash string.");
    CoreError::Internal(format!("Invalid stored password hash format: {}", parse_err))
  })?;

  match Argon2::default().verify_password(provided.as_bytes(), &parsed) {
    Ok(()) => Ok(true),
    Err(argon2::password_hash::Error::Password) => Ok(false),
    Err(other) => {
      error!(error = %other, "Argon2 password verification process encountered an error.");
      Err(CoreError::Internal(format!("Password verification process failed: {}", other)))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_then_verify() {
    let hash = hash_password("correct horse battery").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password(&hash, "correct horse battery").unwrap());
    assert!(!verify_password(&hash, "wrong horse battery").unwrap());
    assert!(!verify_password(&hash, "").unwrap());
  }

  #[test]
  fn malformed_stored_hash_is_an_internal_error() {
    assert!(matches!(verify_password("not-a-hash", "pw"), Err(CoreError::Internal(_))));
    assert!(matches!(hash_password(""), Err(CoreError::Validation(_))));
  }
}

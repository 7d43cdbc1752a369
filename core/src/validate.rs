// core/src/validate.rs

//! Input normalization plus the field rules `validator` cannot express on its own.

use crate::error::{CoreError, CoreResult};
use std::borrow::Cow;
use validator::{ValidateLength, ValidationError};

pub fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}

/// Strips all whitespace. Empty input means "no phone".
pub fn normalize_phone(phone: Option<&str>) -> Option<String> {
  phone
    .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect::<String>())
    .filter(|p| !p.is_empty())
}

/// Trims and drops empty strings.
pub fn normalize_text(value: Option<&str>) -> Option<String> {
  value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// `validator` custom rule: 7 to 15 digits with an optional leading `+`.
pub fn phone_number(phone: &str) -> Result<(), ValidationError> {
  let digits = phone.strip_prefix('+').unwrap_or(phone);
  if (7..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
    return Ok(());
  }
  let mut err = ValidationError::new("phone");
  err.message = Some(Cow::from("Please enter a valid phone number."));
  Err(err)
}

/// The minimum password length comes from configuration, so it is checked here
/// rather than in a derive attribute.
pub fn password_length(password: &str, min_len: usize) -> CoreResult<()> {
  if !password.validate_length(Some(min_len as u64), None, None) {
    return Err(CoreError::Validation(format!(
      "Password must be at least {} characters long.",
      min_len
    )));
  }
  Ok(())
}

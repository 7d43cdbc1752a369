// core/src/codes.rs

//! Generation of OTPs, referral codes and password-reset tokens.

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use uuid::Uuid;

pub const OTP_MIN: u32 = 100_000;
pub const OTP_MAX: u32 = 999_999;
pub const REFERRAL_CODE_LEN: usize = 8;

/// Source of the random codes handed out during registration. Injected so that
/// collisions can be reproduced deterministically.
pub trait CodeSource: Send + Sync + Debug {
  /// A 6-digit one-time code in `[100000, 999999]`.
  fn otp(&self) -> String;
  /// A candidate referral code. Uniqueness is checked by the caller.
  fn referral_code(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
  fn otp(&self) -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
  }

  fn referral_code(&self) -> String {
    Uuid::new_v4().simple().to_string().chars().take(REFERRAL_CODE_LEN).collect()
  }
}

pub fn is_otp_format(code: &str) -> bool {
  code.len() == 6
    && code.bytes().all(|b| b.is_ascii_digit())
    && code.parse::<u32>().map_or(false, |n| (OTP_MIN..=OTP_MAX).contains(&n))
}

/// Fresh password-reset token: the raw value (mailed to the user) and its
/// SHA-256 hex digest (stored).
pub fn generate_reset_token() -> (String, String) {
  let mut bytes = [0u8; 20];
  rand::thread_rng().fill_bytes(&mut bytes);
  let raw = hex::encode(bytes);
  let hashed = hash_reset_token(&raw);
  (raw, hashed)
}

pub fn hash_reset_token(raw: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(raw.as_bytes());
  hex::encode(hasher.finalize())
}

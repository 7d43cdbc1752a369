// server/src/services/session.rs

//! HS256 session tokens carried in the `token` cookie or a bearer header.

use crate::errors::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use referral_core::{SessionIssuer, SessionToken, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
  /// User id.
  pub sub: String,
  pub role: String,
  pub iat: i64,
  pub exp: i64,
}

pub struct JwtSessionIssuer {
  encoding: EncodingKey,
  decoding: DecodingKey,
  validation: Validation,
  ttl: Duration,
}

impl JwtSessionIssuer {
  pub fn new(secret: &str, ttl_days: i64) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    Self {
      encoding: EncodingKey::from_secret(secret.as_bytes()),
      decoding: DecodingKey::from_secret(secret.as_bytes()),
      validation,
      ttl: Duration::days(ttl_days),
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  #[instrument(name = "session::decode", skip_all, err(Display))]
  pub fn decode(&self, token: &str) -> Result<SessionClaims, AppError> {
    decode::<SessionClaims>(token, &self.decoding, &self.validation)
      .map(|data| data.claims)
      .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Auth("Session expired. Please log in again.".to_string()),
        _ => AppError::Auth("Invalid session. Please log in again.".to_string()),
      })
  }
}

impl SessionIssuer for JwtSessionIssuer {
  fn issue(&self, user: &User) -> anyhow::Result<SessionToken> {
    let issued_at = Utc::now();
    let expires_at = issued_at + self.ttl;
    let claims = SessionClaims {
      sub: user.id.to_string(),
      role: user.role.to_string(),
      iat: issued_at.timestamp(),
      exp: expires_at.timestamp(),
    };
    let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
    debug!(user_id = %user.id, %expires_at, "Session token issued.");
    Ok(SessionToken { token, expires_at })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use referral_core::{AccountStatus, DueStatus, IncentiveAccrual, Role, UserStatus};
  use uuid::Uuid;

  fn user() -> User {
    let now = Utc::now();
    User {
      id: Uuid::new_v4(),
      name: "Session Person".to_string(),
      email: "session@example.com".to_string(),
      phone: None,
      password_hash: String::new(),
      role: Role::Admin,
      status: UserStatus::Active,
      referral_code: "sess0001".to_string(),
      sponsor_id: None,
      direct_referrals: Vec::new(),
      stage2_referrals: Vec::new(),
      stage3_referrals: Vec::new(),
      incentive: IncentiveAccrual::default(),
      company_profit_due_status: DueStatus::Active,
      email_verified: true,
      account_status: AccountStatus::Pending,
      login_attempts: 0,
      account_locked: false,
      reset_token: None,
      last_login: None,
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn issued_tokens_decode_to_the_same_user() {
    let issuer = JwtSessionIssuer::new("test-secret-of-reasonable-length", 1);
    let user = user();
    let session = issuer.issue(&user).unwrap();
    assert!(session.expires_at > Utc::now() + Duration::hours(23));

    let claims = issuer.decode(&session.token).unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.role, "admin");
  }

  #[test]
  fn foreign_and_expired_tokens_are_rejected() {
    let issuer = JwtSessionIssuer::new("test-secret-of-reasonable-length", 1);
    let other = JwtSessionIssuer::new("another-secret-entirely-123456", 1);
    let token = other.issue(&user()).unwrap().token;
    assert!(matches!(issuer.decode(&token), Err(AppError::Auth(m)) if m.starts_with("Invalid session")));

    let expired = JwtSessionIssuer::new("test-secret-of-reasonable-length", -1);
    let token = expired.issue(&user()).unwrap().token;
    assert!(matches!(issuer.decode(&token), Err(AppError::Auth(m)) if m.starts_with("Session expired")));

    assert!(issuer.decode("not-a-jwt").is_err());
  }
}

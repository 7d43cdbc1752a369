// core/src/accounts.rs

//! Account administration, self-service profile operations and login.

use crate::clock::Clock;
use crate::codes::{generate_reset_token, hash_reset_token};
use crate::collab::NotificationSender;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{AccountStatus, ResetToken, Role, User, UserProfile, UserStatus};
use crate::password::{hash_password, verify_password};
use crate::store::{IdentityStore, UserPatch};
use crate::validate::{normalize_email, normalize_phone, normalize_text, password_length};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Self-service profile changes. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
  #[validate(length(min = 4, max = 30, message = "Name should have between 4 and 30 characters"))]
  pub name: Option<String>,
  #[validate(email(message = "Please enter a valid email address."))]
  pub email: Option<String>,
  #[serde(alias = "phoneNumber")]
  #[validate(custom(function = "crate::validate::phone_number"))]
  pub phone: Option<String>,
}

impl ProfileUpdate {
  /// Blank fields count as absent.
  pub fn normalized(self) -> Self {
    Self {
      name: normalize_text(self.name.as_deref()),
      email: normalize_text(self.email.as_deref()).map(|e| normalize_email(&e)),
      phone: normalize_phone(self.phone.as_deref()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetTicket {
  pub email: String,
  pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Accounts {
  store: Arc<dyn IdentityStore>,
  notifier: Arc<dyn NotificationSender>,
  clock: Arc<dyn Clock>,
  config: CoreConfig,
}

impl Accounts {
  pub fn new(
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
  ) -> Self {
    Self {
      store,
      notifier,
      clock,
      config,
    }
  }

  async fn user(&self, id: Uuid) -> CoreResult<User> {
    self
      .store
      .find_by_id(id)
      .await?
      .ok_or_else(|| CoreError::UserNotFound(id.to_string()))
  }

  pub async fn profile(&self, id: Uuid) -> CoreResult<UserProfile> {
    Ok(self.user(id).await?.profile())
  }

  pub async fn set_role(&self, id: Uuid, role: &str) -> CoreResult<UserProfile> {
    let role: Role = role.trim().parse()?;
    let patch = UserPatch {
      role: Some(role),
      ..Default::default()
    };
    let user = self.store.update(id, patch).await?;
    info!(user_id = %id, %role, "User role updated.");
    Ok(user.profile())
  }

  pub async fn set_status(&self, id: Uuid, status: &str) -> CoreResult<UserProfile> {
    let status: UserStatus = status.trim().parse()?;
    let patch = UserPatch {
      status: Some(status),
      ..Default::default()
    };
    let user = self.store.update(id, patch).await?;
    info!(user_id = %id, %status, "User status updated.");
    Ok(user.profile())
  }

  pub async fn set_account_status(&self, id: Uuid, status: &str) -> CoreResult<UserProfile> {
    let status: AccountStatus = status.trim().parse()?;
    let patch = UserPatch {
      account_status: Some(status),
      ..Default::default()
    };
    let user = self.store.update(id, patch).await?;
    info!(user_id = %id, %status, "Account status updated.");
    Ok(user.profile())
  }

  /// Counts a failed login. The counter stops at the lock threshold and the
  /// account is locked from then on.
  pub async fn increment_login_attempts(&self, id: Uuid) -> CoreResult<User> {
    let user = self.store.record_failed_login(id, self.config.lock_threshold).await?;
    if user.account_locked {
      warn!(user_id = %id, attempts = user.login_attempts, "Account locked after repeated failed logins.");
    }
    Ok(user)
  }

  pub async fn reset_login_attempts(&self, id: Uuid) -> CoreResult<User> {
    self.store.reset_login_attempts(id, self.clock.now()).await
  }

  #[instrument(name = "accounts::login", skip(self, password))]
  pub async fn login(&self, email: &str, password: &str) -> CoreResult<User> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
      return Err(CoreError::Validation("Please enter email and password".to_string()));
    }

    let user = self.store.find_by_email(&email).await?.ok_or(CoreError::InvalidCredentials)?;

    if self.config.enforce_lockout && user.account_locked {
      warn!(user_id = %user.id, "Login rejected for locked account.");
      return Err(CoreError::AccountLocked);
    }

    if !verify_password(&user.password_hash, password)? {
      self.increment_login_attempts(user.id).await?;
      return Err(CoreError::InvalidCredentials);
    }

    let user = self.reset_login_attempts(user.id).await?;
    info!(user_id = %user.id, "User logged in.");
    Ok(user)
  }

  #[instrument(name = "accounts::update_profile", skip(self, update))]
  pub async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> CoreResult<UserProfile> {
    let update = update.normalized();
    update.validate()?;
    let patch = UserPatch {
      name: update.name,
      email: update.email,
      phone: update.phone.map(Some),
      ..Default::default()
    };
    if patch.is_empty() {
      return self.profile(id).await;
    }
    Ok(self.store.update(id, patch).await?.profile())
  }

  #[instrument(name = "accounts::change_password", skip_all, fields(user_id = %id))]
  pub async fn change_password(&self, id: Uuid, current: &str, new_password: &str) -> CoreResult<()> {
    if current.is_empty() || new_password.is_empty() {
      return Err(CoreError::Validation("Please provide current and new passwords".to_string()));
    }
    let user = self.user(id).await?;
    if !verify_password(&user.password_hash, current)? {
      return Err(CoreError::InvalidCredentials);
    }
    password_length(new_password, self.config.min_password_length)?;

    let patch = UserPatch {
      password_hash: Some(hash_password(new_password)?),
      ..Default::default()
    };
    self.store.update(id, patch).await?;
    info!("Password changed.");
    Ok(())
  }

  /// Stores a hashed reset token and mails the raw token. The token is cleared
  /// again if the mail cannot be sent.
  #[instrument(name = "accounts::request_password_reset", skip(self))]
  pub async fn request_password_reset(&self, email: &str) -> CoreResult<PasswordResetTicket> {
    let email = normalize_email(email);
    let user = self
      .store
      .find_by_email(&email)
      .await?
      .ok_or_else(|| CoreError::UserNotFound(email.clone()))?;

    let (raw, token_hash) = generate_reset_token();
    let expires_at = self.clock.now() + self.config.reset_token_ttl;
    let patch = UserPatch {
      reset_token: Some(Some(ResetToken { token_hash, expires_at })),
      ..Default::default()
    };
    self.store.update(user.id, patch).await?;

    if let Err(send_err) = self.notifier.send_password_reset(&user.email, &raw).await {
      let clear = UserPatch {
        reset_token: Some(None),
        ..Default::default()
      };
      self.store.update(user.id, clear).await?;
      return Err(CoreError::dependency("notification", send_err));
    }

    info!(user_id = %user.id, "Password reset token issued.");
    Ok(PasswordResetTicket {
      email: user.email,
      expires_at,
    })
  }

  #[instrument(name = "accounts::reset_password", skip_all)]
  pub async fn reset_password(&self, raw_token: &str, password: &str, confirm: &str) -> CoreResult<User> {
    if raw_token.trim().is_empty() {
      return Err(CoreError::Validation("Reset token is required".to_string()));
    }
    let now = self.clock.now();
    let user = self
      .store
      .find_by_reset_token(&hash_reset_token(raw_token.trim()))
      .await?
      .filter(|u| u.reset_token.as_ref().map_or(false, |t| now < t.expires_at))
      .ok_or(CoreError::InvalidResetToken)?;

    if password != confirm {
      return Err(CoreError::Validation("Passwords do not match".to_string()));
    }
    password_length(password, self.config.min_password_length)?;

    let patch = UserPatch {
      password_hash: Some(hash_password(password)?),
      reset_token: Some(None),
      ..Default::default()
    };
    let user = self.store.update(user.id, patch).await?;
    info!(user_id = %user.id, "Password reset completed.");
    Ok(user)
  }
}

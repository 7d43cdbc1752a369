// core/src/collab.rs

//! Interfaces of the external collaborators consumed by the registration flow.
//! Implementations live with the application (mock mailers, PDF renderers, ...).

use crate::models::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Input of the welcome-document generator.
#[derive(Debug, Clone, Serialize)]
pub struct WelcomeDetails {
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Document {
  pub file_name: String,
  pub content_type: String,
  pub bytes: Vec<u8>,
}

/// Summary mailed to the administrators after a registration was initiated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationAlert {
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub referral_code: String,
  pub sponsor_code: Option<String>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
  async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()>;

  async fn send_welcome_document(&self, email: &str, attachment: &Document) -> anyhow::Result<()>;

  async fn send_admin_alert(&self, summary: &RegistrationAlert) -> anyhow::Result<()>;

  /// `token` is the raw reset token; the recipient exchanges it for a new password.
  async fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
  async fn welcome_document(&self, details: &WelcomeDetails) -> anyhow::Result<Document>;
}

/// Bearer credential handed to a member after login or verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
  pub token: String,
  pub expires_at: DateTime<Utc>,
}

pub trait SessionIssuer: Send + Sync {
  fn issue(&self, user: &User) -> anyhow::Result<SessionToken>;
}

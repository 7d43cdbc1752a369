// server/src/services/email_mock.rs

//! Mail transport stand-in: logs each message and keeps it in an outbox.

use async_trait::async_trait;
use parking_lot::Mutex;
use referral_core::{Document, NotificationSender, RegistrationAlert};
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct SentEmailInfo {
  pub to: String,
  pub from: String,
  pub subject: String,
  pub body: String,
  pub attachment: Option<String>, // File name only
  pub message_id: String,
}

#[derive(Debug)]
pub struct MockNotifier {
  sender: String,
  admin_email: String,
  app_base_url: String,
  latency: Duration,
  outbox: Mutex<Vec<SentEmailInfo>>,
}

impl MockNotifier {
  pub fn new(sender: impl Into<String>, admin_email: impl Into<String>, app_base_url: impl Into<String>) -> Self {
    Self {
      sender: sender.into(),
      admin_email: admin_email.into(),
      app_base_url: app_base_url.into(),
      latency: Duration::from_millis(20), // Simulate network latency
      outbox: Mutex::new(Vec::new()),
    }
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Messages delivered so far, oldest first.
  pub fn outbox(&self) -> Vec<SentEmailInfo> {
    self.outbox.lock().clone()
  }

  pub fn last_to(&self, recipient: &str) -> Option<SentEmailInfo> {
    self.outbox.lock().iter().rev().find(|m| m.to == recipient).cloned()
  }

  #[instrument(name = "email_mock::deliver", skip(self, body, attachment), fields(to = %to, subject = %subject))]
  async fn deliver(&self, to: &str, subject: &str, body: String, attachment: Option<&Document>) -> anyhow::Result<()> {
    info!("Simulating sending email: To='{}', From='{}'", to, self.sender);
    tokio::time::sleep(self.latency).await;

    // Reserved TLD, never deliverable
    if to.ends_with(".invalid") {
      tracing::warn!("Simulated email failure for recipient: {}", to);
      anyhow::bail!("Simulated email send failure for {}", to);
    }

    let message_id = format!("mock_email_{}", uuid::Uuid::new_v4());
    info!(%message_id, "Mock email sent successfully.");
    self.outbox.lock().push(SentEmailInfo {
      to: to.to_string(),
      from: self.sender.clone(),
      subject: subject.to_string(),
      body,
      attachment: attachment.map(|d| d.file_name.clone()),
      message_id,
    });
    Ok(())
  }
}

#[async_trait]
impl NotificationSender for MockNotifier {
  async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()> {
    let body = format!(
      "Your verification code is {}. It is valid for a limited time; do not share it with anyone.",
      code
    );
    self.deliver(email, "Your OTP Code", body, None).await
  }

  async fn send_welcome_document(&self, email: &str, attachment: &Document) -> anyhow::Result<()> {
    let body = "Welcome aboard! Your registration document is attached.".to_string();
    self.deliver(email, "Welcome", body, Some(attachment)).await
  }

  async fn send_admin_alert(&self, summary: &RegistrationAlert) -> anyhow::Result<()> {
    let body = format!(
      "A new user has registered.\nName: {}\nEmail: {}\nPhone: {}\nReferral code: {}\nSponsor code: {}",
      summary.name,
      summary.email,
      summary.phone.as_deref().unwrap_or("-"),
      summary.referral_code,
      summary.sponsor_code.as_deref().unwrap_or("-"),
    );
    let admin = self.admin_email.clone();
    self.deliver(&admin, "New User Registration", body, None).await
  }

  async fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()> {
    let body = format!(
      "Your password reset token is:\n\n{}/password/reset/{}\n\nIf you did not request this, please ignore it.",
      self.app_base_url.trim_end_matches('/'),
      token
    );
    self.deliver(email, "Password Recovery", body, None).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn notifier() -> MockNotifier {
    MockNotifier::new("noreply@example.com", "admin@example.com", "http://localhost:8080/").with_latency(Duration::ZERO)
  }

  #[tokio::test]
  async fn messages_land_in_the_outbox() {
    let mailer = notifier();
    mailer.send_otp("member@example.com", "123456").await.unwrap();
    mailer.send_password_reset("member@example.com", "abc").await.unwrap();

    let outbox = mailer.outbox();
    assert_eq!(outbox.len(), 2);
    assert!(outbox[0].body.contains("123456"));
    let reset = mailer.last_to("member@example.com").unwrap();
    assert!(reset.body.contains("http://localhost:8080/password/reset/abc"));
  }

  #[tokio::test]
  async fn admin_alerts_go_to_the_admin_address() {
    let mailer = notifier();
    let alert = RegistrationAlert {
      name: "New Person".to_string(),
      email: "new@example.com".to_string(),
      phone: None,
      referral_code: "abcd1234".to_string(),
      sponsor_code: Some("sponsor1".to_string()),
    };
    mailer.send_admin_alert(&alert).await.unwrap();
    let sent = mailer.last_to("admin@example.com").unwrap();
    assert!(sent.body.contains("sponsor1"));
  }

  #[tokio::test]
  async fn invalid_domains_fail_delivery() {
    let mailer = notifier();
    assert!(mailer.send_otp("nobody@mail.invalid", "123456").await.is_err());
    assert!(mailer.outbox().is_empty());
  }
}

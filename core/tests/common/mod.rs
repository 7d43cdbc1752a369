// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use referral_core::{
  Clock, CodeSource, CoreConfig, Document, DocumentGenerator, IdentityStore, ManualClock, MemoryIdentityStore,
  NotificationSender, RandomCodes, ReferralService, RegistrationAlert, RegistrationInput, User, WelcomeDetails,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Level;

// --- Collaborator doubles ---

#[derive(Debug, Default)]
pub struct RecordingNotifier {
  pub otps: Mutex<Vec<(String, String)>>,
  pub welcome: Mutex<Vec<(String, String)>>,
  pub alerts: Mutex<Vec<RegistrationAlert>>,
  pub resets: Mutex<Vec<(String, String)>>,
  pub fail_otp: AtomicBool,
  pub fail_welcome: AtomicBool,
  pub fail_admin: AtomicBool,
  pub fail_reset: AtomicBool,
}

impl RecordingNotifier {
  pub fn last_otp(&self, email: &str) -> Option<String> {
    self.otps.lock().iter().rev().find(|(to, _)| to == email).map(|(_, code)| code.clone())
  }

  pub fn last_reset_token(&self, email: &str) -> Option<String> {
    self.resets.lock().iter().rev().find(|(to, _)| to == email).map(|(_, t)| t.clone())
  }

  fn check(flag: &AtomicBool, what: &str) -> anyhow::Result<()> {
    if flag.load(Ordering::SeqCst) {
      anyhow::bail!("{} delivery refused by test double", what);
    }
    Ok(())
  }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
  async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()> {
    Self::check(&self.fail_otp, "OTP")?;
    self.otps.lock().push((email.to_string(), code.to_string()));
    Ok(())
  }

  async fn send_welcome_document(&self, email: &str, attachment: &Document) -> anyhow::Result<()> {
    Self::check(&self.fail_welcome, "Welcome mail")?;
    self.welcome.lock().push((email.to_string(), attachment.file_name.clone()));
    Ok(())
  }

  async fn send_admin_alert(&self, summary: &RegistrationAlert) -> anyhow::Result<()> {
    Self::check(&self.fail_admin, "Admin alert")?;
    self.alerts.lock().push(summary.clone());
    Ok(())
  }

  async fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()> {
    Self::check(&self.fail_reset, "Password reset mail")?;
    self.resets.lock().push((email.to_string(), token.to_string()));
    Ok(())
  }
}

#[derive(Debug, Default)]
pub struct StaticDocuments {
  pub fail: AtomicBool,
}

#[async_trait]
impl DocumentGenerator for StaticDocuments {
  async fn welcome_document(&self, details: &WelcomeDetails) -> anyhow::Result<Document> {
    if self.fail.load(Ordering::SeqCst) {
      anyhow::bail!("renderer unavailable");
    }
    Ok(Document {
      file_name: format!("welcome-{}.pdf", details.email),
      content_type: "application/pdf".to_string(),
      bytes: details.name.as_bytes().to_vec(),
    })
  }
}

/// Hands out queued codes first, random ones afterwards.
#[derive(Debug, Default)]
pub struct ScriptedCodes {
  pub otps: Mutex<VecDeque<String>>,
  pub referral_codes: Mutex<VecDeque<String>>,
}

impl ScriptedCodes {
  pub fn queue_otp(&self, otp: &str) {
    self.otps.lock().push_back(otp.to_string());
  }

  pub fn queue_referral_code(&self, code: &str) {
    self.referral_codes.lock().push_back(code.to_string());
  }
}

impl CodeSource for ScriptedCodes {
  fn otp(&self) -> String {
    self.otps.lock().pop_front().unwrap_or_else(|| RandomCodes.otp())
  }

  fn referral_code(&self) -> String {
    self.referral_codes.lock().pop_front().unwrap_or_else(|| RandomCodes.referral_code())
  }
}

// --- Harness ---

pub struct Harness {
  pub service: ReferralService,
  pub store: Arc<MemoryIdentityStore>,
  pub notifier: Arc<RecordingNotifier>,
  pub documents: Arc<StaticDocuments>,
  pub codes: Arc<ScriptedCodes>,
  pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
  harness_with(CoreConfig::default())
}

pub fn harness_with(config: CoreConfig) -> Harness {
  setup_tracing();
  let store = Arc::new(MemoryIdentityStore::new());
  let notifier = Arc::new(RecordingNotifier::default());
  let documents = Arc::new(StaticDocuments::default());
  let codes = Arc::new(ScriptedCodes::default());
  let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));

  let service = ReferralService::builder()
    .store(store.clone())
    .notifier(notifier.clone())
    .documents(documents.clone())
    .codes(codes.clone())
    .clock(clock.clone())
    .config(config)
    .build()
    .expect("service should build");

  Harness {
    service,
    store,
    notifier,
    documents,
    codes,
    clock,
  }
}

pub fn input(name: &str, email: &str, sponsor_code: Option<&str>) -> RegistrationInput {
  RegistrationInput {
    name: name.to_string(),
    email: email.to_string(),
    password: "s3cret-passw0rd".to_string(),
    phone: None,
    referral_code: sponsor_code.map(str::to_string),
  }
}

impl Harness {
  /// Registers and verifies a member, returning the stored user.
  pub async fn onboard(&self, name: &str, email: &str, sponsor_code: Option<&str>) -> User {
    self
      .service
      .register(input(name, email, sponsor_code))
      .await
      .expect("registration should succeed");
    let otp = self.notifier.last_otp(email).expect("an OTP should have been sent");
    let verified = self.service.verify(email, &otp).await.expect("verification should succeed");
    self.user(verified.user_id).await
  }

  pub fn clock_now(&self) -> chrono::DateTime<Utc> {
    self.clock.now()
  }

  pub async fn user(&self, id: uuid::Uuid) -> User {
    self.store.find_by_id(id).await.unwrap().expect("user should exist")
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

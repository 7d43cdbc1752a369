// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper

use referral_core::MemoryIdentityStore;
use referral_server::services::MockNotifier;
use referral_server::{AppConfig, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

pub const PASSWORD: &str = "s3cret-passw0rd";

pub struct TestApp {
  pub state: AppState,
  pub store: Arc<MemoryIdentityStore>,
  pub mailer: Arc<MockNotifier>,
}

pub fn test_config() -> AppConfig {
  AppConfig::from_lookup(|name| match name {
    "DATABASE_URL" => Some("postgres://unused/referrals".to_string()),
    "JWT_SECRET" => Some("integration-test-secret".to_string()),
    "RUN_MIGRATIONS" => Some("false".to_string()),
    "APP_BASE_URL" => Some("http://referrals.test".to_string()),
    _ => None,
  })
  .expect("test configuration should load")
}

pub fn test_app() -> TestApp {
  setup_tracing();
  let config = test_config();
  let store = Arc::new(MemoryIdentityStore::new());
  let mailer = Arc::new(
    MockNotifier::new(
      config.mock_email_sender.clone(),
      config.admin_email.clone(),
      config.app_base_url.clone(),
    )
    .with_latency(Duration::ZERO),
  );
  let state = AppState::new(config, store.clone(), mailer.clone()).expect("state should build");
  TestApp { state, store, mailer }
}

impl TestApp {
  /// The 6-digit code of the last OTP mail sent to `email`.
  pub fn last_otp(&self, email: &str) -> String {
    let mail = self.mailer.last_to(email).expect("an OTP mail should have been sent");
    mail
      .body
      .split(|c: char| !c.is_ascii_digit())
      .find(|word| word.len() == 6)
      .expect("OTP mail should carry a 6-digit code")
      .to_string()
  }

  /// The raw token of the last password-recovery mail sent to `email`.
  pub fn last_reset_token(&self, email: &str) -> String {
    let mail = self.mailer.last_to(email).expect("a reset mail should have been sent");
    let (_, rest) = mail.body.split_once("/password/reset/").expect("reset link in body");
    rest.split_whitespace().next().unwrap_or_default().to_string()
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

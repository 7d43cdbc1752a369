// server/src/state.rs
use crate::config::AppConfig;
use crate::errors::Result as AppResult;
use crate::services::{JwtSessionIssuer, MockDocuments};
use referral_core::{IdentityStore, NotificationSender, ReferralService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub service: Arc<ReferralService>,
  pub sessions: Arc<JwtSessionIssuer>,
  pub config: Arc<AppConfig>, // Share loaded config
}

impl AppState {
  /// Wires the referral service around `store` and `notifier`.
  pub fn new(
    config: AppConfig,
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn NotificationSender>,
  ) -> AppResult<Self> {
    let service = ReferralService::builder()
      .store(store)
      .notifier(notifier)
      .documents(Arc::new(MockDocuments))
      .config(config.core.clone())
      .build()?;
    let sessions = JwtSessionIssuer::new(&config.jwt_secret, config.jwt_expire_days);
    Ok(Self {
      service: Arc::new(service),
      sessions: Arc::new(sessions),
      config: Arc::new(config),
    })
  }
}

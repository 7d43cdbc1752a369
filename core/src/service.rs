// core/src/service.rs

//! `ReferralService`, the facade an application talks to.

use crate::accounts::Accounts;
use crate::clock::{Clock, SystemClock};
use crate::codes::{CodeSource, RandomCodes};
use crate::collab::{DocumentGenerator, NotificationSender};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::flows::registration::{run_registration, RegistrationPipeline};
use crate::flows::verification::{run_verification, VerificationPipeline};
use crate::flows::{
  build_registration_pipeline, build_verification_pipeline, FlowDeps, PendingTicket, RegistrationInput, VerifiedMember,
};
use crate::ledger::{DueSnapshot, Ledger};
use crate::models::Tier;
use crate::pending::PendingRegistrations;
use crate::referral::{ReferralGraph, ReferralLink};
use crate::store::IdentityStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

pub struct ReferralService {
  deps: FlowDeps,
  registration: RegistrationPipeline,
  verification: VerificationPipeline,
  ledger: Ledger,
  accounts: Accounts,
}

impl ReferralService {
  pub fn builder() -> ReferralServiceBuilder {
    ReferralServiceBuilder::default()
  }

  /// Stages a registration and mails its OTP. Nothing reaches the identity
  /// store until [`verify`](Self::verify) succeeds.
  pub async fn register(&self, input: RegistrationInput) -> CoreResult<PendingTicket> {
    run_registration(&self.registration, self.deps.clone(), input).await
  }

  pub async fn verify(&self, email: &str, otp: &str) -> CoreResult<VerifiedMember> {
    run_verification(&self.verification, self.deps.clone(), email, otp).await
  }

  pub async fn credit_incentive(&self, user_id: Uuid, tier: Tier, amount: i64) -> CoreResult<DueSnapshot> {
    self.ledger.credit(user_id, tier, amount).await
  }

  pub async fn link_referral(&self, member_id: Uuid, referral_code: &str) -> CoreResult<ReferralLink> {
    self.deps.graph.link_referral(member_id, referral_code).await
  }

  pub fn accounts(&self) -> &Accounts {
    &self.accounts
  }

  pub fn ledger(&self) -> &Ledger {
    &self.ledger
  }

  pub fn graph(&self) -> &ReferralGraph {
    &self.deps.graph
  }

  pub fn pending(&self) -> &Arc<PendingRegistrations> {
    &self.deps.pending
  }

  pub fn store(&self) -> &Arc<dyn IdentityStore> {
    &self.deps.store
  }

  pub fn config(&self) -> &CoreConfig {
    &self.deps.config
  }

  pub fn spawn_pending_sweeper(&self) -> JoinHandle<()> {
    let interval = self.deps.config.pending_sweep_interval;
    info!(?interval, "Starting pending registration sweeper.");
    self.deps.pending.spawn_sweeper(interval)
  }
}

#[derive(Default)]
pub struct ReferralServiceBuilder {
  store: Option<Arc<dyn IdentityStore>>,
  notifier: Option<Arc<dyn NotificationSender>>,
  documents: Option<Arc<dyn DocumentGenerator>>,
  codes: Option<Arc<dyn CodeSource>>,
  clock: Option<Arc<dyn Clock>>,
  config: Option<CoreConfig>,
}

impl ReferralServiceBuilder {
  pub fn store(mut self, store: Arc<dyn IdentityStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn documents(mut self, documents: Arc<dyn DocumentGenerator>) -> Self {
    self.documents = Some(documents);
    self
  }

  pub fn codes(mut self, codes: Arc<dyn CodeSource>) -> Self {
    self.codes = Some(codes);
    self
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  pub fn config(mut self, config: CoreConfig) -> Self {
    self.config = Some(config);
    self
  }

  pub fn build(self) -> CoreResult<ReferralService> {
    let missing = |what: &str| CoreError::Internal(format!("ReferralService built without a {}", what));
    let store = self.store.ok_or_else(|| missing("identity store"))?;
    let notifier = self.notifier.ok_or_else(|| missing("notification sender"))?;
    let documents = self.documents.ok_or_else(|| missing("document generator"))?;
    let codes = self.codes.unwrap_or_else(|| Arc::new(RandomCodes));
    let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
    let config = self.config.unwrap_or_default();

    let pending = Arc::new(PendingRegistrations::new(clock.clone(), config.pending_max_entries));
    let graph = ReferralGraph::new(store.clone(), config.propagation);
    let ledger = Ledger::new(store.clone());
    let accounts = Accounts::new(store.clone(), notifier.clone(), clock.clone(), config.clone());

    info!(
      propagation = ?config.propagation,
      notification_policy = ?config.notification_policy,
      "Referral service assembled."
    );

    Ok(ReferralService {
      deps: FlowDeps {
        store,
        pending,
        graph,
        notifier,
        documents,
        codes,
        clock,
        config: Arc::new(config),
      },
      registration: build_registration_pipeline(),
      verification: build_verification_pipeline(),
      ledger,
      accounts,
    })
  }
}

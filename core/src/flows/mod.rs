// core/src/flows/mod.rs

//! Registration and verification, each run as a step pipeline over its own
//! context data.

pub mod contexts;
pub mod registration;
pub mod verification;

use crate::clock::Clock;
use crate::codes::CodeSource;
use crate::collab::{DocumentGenerator, NotificationSender};
use crate::config::CoreConfig;
use crate::pending::PendingRegistrations;
use crate::referral::ReferralGraph;
use crate::store::IdentityStore;
use std::sync::Arc;

pub use contexts::{PendingTicket, RegistrationCtxData, RegistrationInput, VerificationCtxData, VerifiedMember};
pub use registration::build_registration_pipeline;
pub use verification::build_verification_pipeline;

/// Everything a flow step may reach for. Cheap to clone.
#[derive(Clone)]
pub struct FlowDeps {
  pub store: Arc<dyn IdentityStore>,
  pub pending: Arc<PendingRegistrations>,
  pub graph: ReferralGraph,
  pub notifier: Arc<dyn NotificationSender>,
  pub documents: Arc<dyn DocumentGenerator>,
  pub codes: Arc<dyn CodeSource>,
  pub clock: Arc<dyn Clock>,
  pub config: Arc<CoreConfig>,
}

// core/src/lib.rs

//! Referral core: the three-tier referral graph, incentive accruals, pending
//! (unverified) registrations and the identity store behind them.
//!
//! Registration and verification run as named-step pipelines:
//!  - `register` validates input, checks uniqueness, resolves the sponsor and
//!    stages the record with a 6-digit OTP in the pending cache.
//!  - `verify` consumes the pending entry and promotes the member, together with
//!    every ancestor link, in one identity-store transaction.
//!
//! External collaborators (mail, document rendering) are consumed through the
//! traits in [`collab`].

pub mod accounts;
pub mod clock;
pub mod codes;
pub mod collab;
pub mod config;
pub mod error;
pub mod flows;
pub mod ledger;
pub mod models;
pub mod password;
pub mod pending;
pub mod pipeline;
pub mod referral;
pub mod service;
pub mod store;
pub mod validate;

// --- Re-exports for the Public API ---

pub use crate::accounts::{Accounts, PasswordResetTicket, ProfileUpdate};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::codes::{CodeSource, RandomCodes};
pub use crate::collab::{
  Document, DocumentGenerator, NotificationSender, RegistrationAlert, SessionIssuer, SessionToken, WelcomeDetails,
};
pub use crate::config::{CoreConfig, NotificationPolicy, PropagationMode};
pub use crate::error::{CoreError, CoreResult, ErrorCategory, PipelineError};
pub use crate::flows::{PendingTicket, RegistrationInput, VerifiedMember};
pub use crate::ledger::{is_withdrawal_eligible, DueSnapshot, Ledger};
pub use crate::models::{
  AccountStatus, DueStatus, IncentiveAccrual, PayoutRecord, Role, Tier, User, UserProfile, UserStatus, UserSummary,
};
pub use crate::pending::{PendingEntry, PendingRegistration, PendingRegistrations, VerifyOutcome};
pub use crate::pipeline::{Pipeline, PipelineResult, StepContext, StepControl};
pub use crate::referral::{AncestorChain, ReferralGraph, ReferralLink, TeamView};
pub use crate::service::{ReferralService, ReferralServiceBuilder};
pub use crate::store::{AncestorLink, IdentityStore, MemoryIdentityStore, ReferralLinkPlan, UserPatch};

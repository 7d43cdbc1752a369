// core/src/flows/contexts.rs

//! Data carried through the registration and verification pipelines.

use super::FlowDeps;
use crate::collab::Document;
use crate::models::User;
use crate::pending::PendingEntry;
use crate::referral::ReferralLink;
use crate::store::ReferralLinkPlan;
use chrono::{DateTime, Utc};
use crate::validate::{normalize_email, normalize_phone, normalize_text};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInput {
  #[validate(length(min = 4, max = 30, message = "Name should have between 4 and 30 characters"))]
  pub name: String,
  #[validate(email(message = "Please enter a valid email address."))]
  pub email: String,
  pub password: String,
  #[serde(default, alias = "phoneNumber")]
  #[validate(custom(function = "crate::validate::phone_number"))]
  pub phone: Option<String>,
  /// Sponsor's referral code.
  #[serde(default, alias = "referralId")]
  pub referral_code: Option<String>,
}

impl RegistrationInput {
  /// Trimmed name, lowercased email, phone without whitespace and blank
  /// optional fields dropped. Validation runs on this form.
  pub fn normalized(self) -> Self {
    Self {
      name: self.name.trim().to_string(),
      email: normalize_email(&self.email),
      password: self.password,
      phone: normalize_phone(self.phone.as_deref()),
      referral_code: normalize_text(self.referral_code.as_deref()),
    }
  }
}

/// Returned by `register`: the OTP itself only travels by mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTicket {
  pub pending_id: Uuid,
  pub email: String,
  pub otp_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedMember {
  pub user_id: Uuid,
  pub referral_code: String,
  pub link: Option<ReferralLink>,
}

pub struct RegistrationCtxData {
  pub deps: FlowDeps,
  pub input: RegistrationInput,
  // Normalized input
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub sponsor_code: Option<String>,
  pub sponsor_id: Option<Uuid>,
  pub entry: Option<PendingEntry>,
  pub document: Option<Document>,
  /// Set once the entry is in the pending cache, so a failure after that point
  /// can remove it again.
  pub stashed: bool,
}

impl RegistrationCtxData {
  pub fn new(deps: FlowDeps, input: RegistrationInput) -> Self {
    Self {
      deps,
      input,
      name: String::new(),
      email: String::new(),
      phone: None,
      sponsor_code: None,
      sponsor_id: None,
      entry: None,
      document: None,
      stashed: false,
    }
  }

  pub fn ticket(&self) -> Option<PendingTicket> {
    self.entry.as_ref().map(|entry| PendingTicket {
      pending_id: entry.record.id,
      email: entry.record.email.clone(),
      otp_expires_at: entry.expires_at,
    })
  }
}

pub struct VerificationCtxData {
  pub deps: FlowDeps,
  pub email: String,
  pub otp: String,
  /// The consumed cache entry; restored on a transient promotion failure.
  pub entry: Option<PendingEntry>,
  pub plan: Option<ReferralLinkPlan>,
  pub promoted: Option<User>,
}

impl VerificationCtxData {
  pub fn new(deps: FlowDeps, email: &str, otp: &str) -> Self {
    Self {
      deps,
      email: email.to_string(),
      otp: otp.trim().to_string(),
      entry: None,
      plan: None,
      promoted: None,
    }
  }

  pub fn has_sponsor(&self) -> bool {
    self
      .entry
      .as_ref()
      .map_or(false, |e| e.record.sponsor_code.is_some())
  }
}

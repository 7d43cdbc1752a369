// core/src/config.rs

//! Tunables of the referral core. The server builds a [`CoreConfig`] from its
//! environment; tests usually start from `CoreConfig::default()`.

use crate::error::CoreError;
use std::str::FromStr;
use std::time::Duration as StdDuration;

/// How a new member is propagated into the referral lists of its ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationMode {
  /// Source-compatible behavior: the sponsor records the member as a direct
  /// referral, and the sponsor's *first direct referral* (if any existed before
  /// this link) records it in its stage-3 list. Stage-2 lists are never written.
  Literal,
  /// Walks up the `sponsor_id` chain: sponsor (direct), the sponsor's sponsor
  /// (stage 2) and one level above that (stage 3).
  #[default]
  SponsorChain,
}

impl FromStr for PropagationMode {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "literal" => Ok(PropagationMode::Literal),
      "sponsor-chain" | "sponsor_chain" | "chain" => Ok(PropagationMode::SponsorChain),
      other => Err(CoreError::Validation(format!(
        "Unknown referral propagation mode '{}'. Use 'literal' or 'sponsor-chain'.",
        other
      ))),
    }
  }
}

/// What happens when a dependent service (document generation, welcome mail,
/// admin alert) fails during registration. OTP delivery failures are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationPolicy {
  /// Any dependent-service failure aborts the registration.
  #[default]
  Strict,
  /// Failures are logged and the registration proceeds.
  BestEffort,
}

impl FromStr for NotificationPolicy {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "strict" => Ok(NotificationPolicy::Strict),
      "best-effort" | "best_effort" => Ok(NotificationPolicy::BestEffort),
      other => Err(CoreError::Validation(format!(
        "Unknown notification policy '{}'. Use 'strict' or 'best-effort'.",
        other
      ))),
    }
  }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
  /// Validity window of a registration OTP.
  pub otp_ttl: chrono::Duration,
  /// Upper bound on registrations awaiting verification.
  pub pending_max_entries: usize,
  /// Period of the background sweep over expired pending registrations.
  pub pending_sweep_interval: StdDuration,
  pub propagation: PropagationMode,
  pub notification_policy: NotificationPolicy,
  /// Failed logins after which `account_locked` is set.
  pub lock_threshold: u32,
  /// Reject logins of locked accounts. When false the lock is only recorded.
  pub enforce_lockout: bool,
  pub min_password_length: usize,
  /// Attempts at finding an unused referral code before giving up.
  pub referral_code_attempts: u32,
  pub reset_token_ttl: chrono::Duration,
}

impl Default for CoreConfig {
  fn default() -> Self {
    Self {
      otp_ttl: chrono::Duration::minutes(10),
      pending_max_entries: 10_000,
      pending_sweep_interval: StdDuration::from_secs(60),
      propagation: PropagationMode::default(),
      notification_policy: NotificationPolicy::default(),
      lock_threshold: 5,
      enforce_lockout: false,
      min_password_length: 8,
      referral_code_attempts: 5,
      reset_token_ttl: chrono::Duration::minutes(15),
    }
  }
}

impl CoreConfig {
  pub fn with_propagation(mut self, mode: PropagationMode) -> Self {
    self.propagation = mode;
    self
  }

  pub fn with_notification_policy(mut self, policy: NotificationPolicy) -> Self {
    self.notification_policy = policy;
    self
  }

  pub fn with_pending_capacity(mut self, max_entries: usize) -> Self {
    self.pending_max_entries = max_entries;
    self
  }

  pub fn with_enforced_lockout(mut self, enforce: bool) -> Self {
    self.enforce_lockout = enforce;
    self
  }
}

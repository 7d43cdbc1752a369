// core/src/error.rs

//! Error types shared by every operation of the referral core.

use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

/// Coarse grouping of [`CoreError`] variants, used by callers to decide how an
/// error is surfaced (bad request, conflict, not found, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
  Validation,
  Conflict,
  NotFound,
  Auth,
  Dependency,
  Internal,
}

/// Framework-level failures of a step pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("{0}")]
  Validation(String),

  #[error("Role must be one of the following: admin, user, referral (got '{0}')")]
  InvalidRole(String),

  #[error("Invalid status '{0}'")]
  InvalidStatus(String),

  #[error("Incentive amount must be greater than zero (got {0})")]
  InvalidAmount(i64),

  #[error("User already exists with this email")]
  DuplicateEmail,

  #[error("User already exists with this phone number")]
  DuplicatePhone,

  #[error("Referral code is already assigned to another user")]
  DuplicateReferralCode,

  #[error("Referral code '{0}' is not valid")]
  InvalidReferralCode(String),

  #[error("User {0} already has a sponsor")]
  AlreadyLinked(Uuid),

  #[error("Linking {member} under {sponsor} would create a referral cycle")]
  ReferralCycle { member: Uuid, sponsor: Uuid },

  #[error("No pending registration for this email. Please register first.")]
  RegistrationNotFound,

  #[error("User not found: {0}")]
  UserNotFound(String),

  #[error("Invalid OTP. Please try again.")]
  OtpMismatch,

  #[error("OTP has expired. Please register again.")]
  OtpExpired,

  #[error("Too many registrations are awaiting verification. Please try again later.")]
  PendingCapacity,

  #[error("Invalid email or password")]
  InvalidCredentials,

  #[error("Account is locked after too many failed login attempts")]
  AccountLocked,

  #[error("Access denied: {0}")]
  Forbidden(String),

  #[error("Withdrawal is not allowed while company profit due status is Inactive")]
  WithdrawalNotEligible,

  #[error("Reset password token is invalid or has expired")]
  InvalidResetToken,

  #[error("{service} failed: {message}")]
  Dependency { service: &'static str, message: String },

  #[error("Storage error: {0}")]
  Storage(String),

  #[error("Internal error: {0}")]
  Internal(String),

  #[error("Workflow error: {source}")]
  Pipeline {
    #[from]
    source: PipelineError,
  },
}

impl CoreError {
  /// Stable machine-readable identifier of the error kind.
  pub fn kind(&self) -> &'static str {
    match self {
      CoreError::Validation(_) => "validation",
      CoreError::InvalidRole(_) => "invalid_role",
      CoreError::InvalidStatus(_) => "invalid_status",
      CoreError::InvalidAmount(_) => "invalid_amount",
      CoreError::DuplicateEmail => "duplicate_email",
      CoreError::DuplicatePhone => "duplicate_phone",
      CoreError::DuplicateReferralCode => "duplicate_referral_code",
      CoreError::InvalidReferralCode(_) => "invalid_referral_code",
      CoreError::AlreadyLinked(_) => "already_linked",
      CoreError::ReferralCycle { .. } => "referral_cycle",
      CoreError::RegistrationNotFound => "not_found",
      CoreError::UserNotFound(_) => "user_not_found",
      CoreError::OtpMismatch => "otp_mismatch",
      CoreError::OtpExpired => "otp_expired",
      CoreError::PendingCapacity => "pending_capacity",
      CoreError::InvalidCredentials => "invalid_credentials",
      CoreError::AccountLocked => "account_locked",
      CoreError::Forbidden(_) => "forbidden",
      CoreError::WithdrawalNotEligible => "withdrawal_not_eligible",
      CoreError::InvalidResetToken => "invalid_reset_token",
      CoreError::Dependency { .. } => "dependency",
      CoreError::Storage(_) => "storage",
      CoreError::Internal(_) => "internal",
      CoreError::Pipeline { .. } => "workflow",
    }
  }

  pub fn category(&self) -> ErrorCategory {
    match self {
      CoreError::Validation(_)
      | CoreError::InvalidRole(_)
      | CoreError::InvalidStatus(_)
      | CoreError::InvalidAmount(_)
      | CoreError::OtpMismatch
      | CoreError::OtpExpired
      | CoreError::InvalidResetToken => ErrorCategory::Validation,
      CoreError::DuplicateEmail
      | CoreError::DuplicatePhone
      | CoreError::DuplicateReferralCode
      | CoreError::InvalidReferralCode(_)
      | CoreError::AlreadyLinked(_)
      | CoreError::ReferralCycle { .. }
      | CoreError::WithdrawalNotEligible => ErrorCategory::Conflict,
      CoreError::RegistrationNotFound | CoreError::UserNotFound(_) => ErrorCategory::NotFound,
      CoreError::InvalidCredentials | CoreError::AccountLocked | CoreError::Forbidden(_) => ErrorCategory::Auth,
      CoreError::Dependency { .. } | CoreError::PendingCapacity => ErrorCategory::Dependency,
      CoreError::Storage(_) | CoreError::Internal(_) | CoreError::Pipeline { .. } => ErrorCategory::Internal,
    }
  }

  /// Failures that leave no trace in persisted state and may succeed if retried.
  pub fn is_transient(&self) -> bool {
    matches!(self, CoreError::Storage(_) | CoreError::Dependency { .. })
  }

  pub(crate) fn dependency(service: &'static str, err: anyhow::Error) -> Self {
    CoreError::Dependency {
      service,
      message: format!("{:#}", err),
    }
  }
}

/// Reports the first failing field (in name order) with its rule message.
impl From<ValidationErrors> for CoreError {
  fn from(errors: ValidationErrors) -> Self {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let message = fields
      .first()
      .and_then(|(field, errs)| {
        errs.first().map(|e| match &e.message {
          Some(message) => message.to_string(),
          None => format!("Invalid {}", field),
        })
      })
      .unwrap_or_else(|| "Invalid input".to_string());
    CoreError::Validation(message)
  }
}

pub type CoreResult<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_are_stable_and_categorized() {
    assert_eq!(CoreError::DuplicateEmail.kind(), "duplicate_email");
    assert_eq!(CoreError::DuplicateEmail.category(), ErrorCategory::Conflict);
    assert_eq!(CoreError::RegistrationNotFound.kind(), "not_found");
    assert_eq!(CoreError::OtpExpired.category(), ErrorCategory::Validation);
    assert_eq!(CoreError::InvalidAmount(0).to_string(), "Incentive amount must be greater than zero (got 0)");
  }

  #[test]
  fn pipeline_errors_convert_into_internal_workflow_errors() {
    let err: CoreError = PipelineError::HandlerMissing {
      step_name: "send_otp".to_string(),
    }
    .into();
    assert_eq!(err.kind(), "workflow");
    assert_eq!(err.category(), ErrorCategory::Internal);
    assert!(err.to_string().contains("send_otp"));
  }

  #[test]
  fn validation_errors_report_the_first_field_message() {
    let mut errors = ValidationErrors::new();
    let mut phone = validator::ValidationError::new("phone");
    phone.message = Some("Please enter a valid phone number.".into());
    errors.add("phone", phone);
    errors.add("email", validator::ValidationError::new("email"));
    let err: CoreError = errors.into();
    assert!(matches!(err, CoreError::Validation(ref m) if m == "Invalid email"));
    assert_eq!(err.kind(), "validation");

    let err: CoreError = ValidationErrors::new().into();
    assert!(matches!(err, CoreError::Validation(ref m) if m == "Invalid input"));
  }
}

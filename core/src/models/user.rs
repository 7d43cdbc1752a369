// core/src/models/user.rs

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  User,
  Referral,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Admin => "admin",
      Role::User => "user",
      Role::Referral => "referral",
    }
  }
}

impl FromStr for Role {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "admin" => Ok(Role::Admin),
      "user" => Ok(Role::User),
      "referral" => Ok(Role::Referral),
      other => Err(CoreError::InvalidRole(other.to_string())),
    }
  }
}

/// Administrative switch set by `setStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
  Active,
  Inactive,
}

impl UserStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      UserStatus::Active => "active",
      UserStatus::Inactive => "inactive",
    }
  }
}

impl FromStr for UserStatus {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "active" => Ok(UserStatus::Active),
      "inactive" => Ok(UserStatus::Inactive),
      other => Err(CoreError::InvalidStatus(other.to_string())),
    }
  }
}

/// Progress of the trading-account onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
  Pending,
  Verified,
  Trader,
}

impl AccountStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      AccountStatus::Pending => "Pending",
      AccountStatus::Verified => "Verified",
      AccountStatus::Trader => "Trader",
    }
  }
}

impl FromStr for AccountStatus {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "Pending" => Ok(AccountStatus::Pending),
      "Verified" => Ok(AccountStatus::Verified),
      "Trader" => Ok(AccountStatus::Trader),
      other => Err(CoreError::InvalidStatus(other.to_string())),
    }
  }
}

/// Gate on incentive withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DueStatus {
  #[default]
  Active,
  Inactive,
}

impl DueStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DueStatus::Active => "Active",
      DueStatus::Inactive => "Inactive",
    }
  }
}

impl FromStr for DueStatus {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "Active" => Ok(DueStatus::Active),
      "Inactive" => Ok(DueStatus::Inactive),
      other => Err(CoreError::InvalidStatus(other.to_string())),
    }
  }
}

/// Depth in the referral chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  Direct,
  Stage2,
  Stage3,
}

impl Tier {
  pub const ALL: [Tier; 3] = [Tier::Direct, Tier::Stage2, Tier::Stage3];

  pub fn as_str(&self) -> &'static str {
    match self {
      Tier::Direct => "direct",
      Tier::Stage2 => "stage2",
      Tier::Stage3 => "stage3",
    }
  }
}

impl FromStr for Tier {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "direct" => Ok(Tier::Direct),
      "stage2" => Ok(Tier::Stage2),
      "stage3" => Ok(Tier::Stage3),
      other => Err(CoreError::Validation(format!(
        "Tier must be one of: direct, stage2, stage3 (got '{}')",
        other
      ))),
    }
  }
}

macro_rules! display_via_as_str {
  ($($t:ty),*) => {
    $(impl fmt::Display for $t {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    })*
  };
}

display_via_as_str!(Role, UserStatus, AccountStatus, DueStatus, Tier);

/// Accrued, not yet paid out, referral incentives in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncentiveAccrual {
  pub direct: i64,
  pub stage2: i64,
  pub stage3: i64,
}

impl IncentiveAccrual {
  pub fn get(&self, tier: Tier) -> i64 {
    match tier {
      Tier::Direct => self.direct,
      Tier::Stage2 => self.stage2,
      Tier::Stage3 => self.stage3,
    }
  }

  /// Adds `amount` to one tier. Callers validate `amount > 0`.
  pub fn credit(&mut self, tier: Tier, amount: i64) -> CoreResult<()> {
    let slot = match tier {
      Tier::Direct => &mut self.direct,
      Tier::Stage2 => &mut self.stage2,
      Tier::Stage3 => &mut self.stage3,
    };
    *slot = slot
      .checked_add(amount)
      .ok_or_else(|| CoreError::Validation(format!("Incentive overflow on {} tier", tier)))?;
    Ok(())
  }

  pub fn total(&self) -> i64 {
    self.direct.saturating_add(self.stage2).saturating_add(self.stage3)
  }
}

/// One settlement of a user's accruals, written in the same transaction that
/// zeroes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
  pub id: Uuid,
  pub user_id: Uuid,
  pub direct: i64,
  pub stage2: i64,
  pub stage3: i64,
  pub total: i64,
  pub settled_at: DateTime<Utc>,
}

impl PayoutRecord {
  pub fn new(user_id: Uuid, settled: IncentiveAccrual, settled_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id,
      direct: settled.direct,
      stage2: settled.stage2,
      stage3: settled.stage3,
      total: settled.total(),
      settled_at,
    }
  }

  pub fn accrual(&self) -> IncentiveAccrual {
    IncentiveAccrual {
      direct: self.direct,
      stage2: self.stage2,
      stage3: self.stage3,
    }
  }
}

/// Hashed password-recovery token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
  pub token_hash: String,
  pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: Uuid,
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  #[serde(skip_serializing)] // Never send password hash to client
  pub password_hash: String,
  pub role: Role,
  pub status: UserStatus,
  pub referral_code: String,
  /// Who referred this user. Set once, when the user is linked.
  pub sponsor_id: Option<Uuid>,
  pub direct_referrals: Vec<Uuid>,
  pub stage2_referrals: Vec<Uuid>,
  pub stage3_referrals: Vec<Uuid>,
  pub incentive: IncentiveAccrual,
  pub company_profit_due_status: DueStatus,
  pub email_verified: bool,
  pub account_status: AccountStatus,
  pub login_attempts: u32,
  pub account_locked: bool,
  #[serde(skip_serializing)]
  pub reset_token: Option<ResetToken>,
  pub last_login: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl User {
  pub fn referrals(&self, tier: Tier) -> &[Uuid] {
    match tier {
      Tier::Direct => &self.direct_referrals,
      Tier::Stage2 => &self.stage2_referrals,
      Tier::Stage3 => &self.stage3_referrals,
    }
  }

  pub(crate) fn referrals_mut(&mut self, tier: Tier) -> &mut Vec<Uuid> {
    match tier {
      Tier::Direct => &mut self.direct_referrals,
      Tier::Stage2 => &mut self.stage2_referrals,
      Tier::Stage3 => &mut self.stage3_referrals,
    }
  }

  pub fn profile(&self) -> UserProfile {
    UserProfile {
      id: self.id,
      name: self.name.clone(),
      email: self.email.clone(),
      phone: self.phone.clone(),
      role: self.role,
      status: self.status,
      referral_code: self.referral_code.clone(),
      sponsor_id: self.sponsor_id,
      direct_referrals: self.direct_referrals.len(),
      stage2_referrals: self.stage2_referrals.len(),
      stage3_referrals: self.stage3_referrals.len(),
      incentive: self.incentive,
      company_profit_due_status: self.company_profit_due_status,
      email_verified: self.email_verified,
      account_status: self.account_status,
      account_locked: self.account_locked,
      last_login: self.last_login,
      created_at: self.created_at,
    }
  }

  pub fn summary(&self) -> UserSummary {
    UserSummary {
      id: self.id,
      name: self.name.clone(),
      email: self.email.clone(),
      referral_code: self.referral_code.clone(),
      account_status: self.account_status,
      created_at: self.created_at,
    }
  }
}

/// What a user (or an admin) gets to see of an account.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub id: Uuid,
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub role: Role,
  pub status: UserStatus,
  pub referral_code: String,
  pub sponsor_id: Option<Uuid>,
  pub direct_referrals: usize,
  pub stage2_referrals: usize,
  pub stage3_referrals: usize,
  pub incentive: IncentiveAccrual,
  pub company_profit_due_status: DueStatus,
  pub email_verified: bool,
  pub account_status: AccountStatus,
  pub account_locked: bool,
  pub last_login: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

/// Team-listing entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
  pub id: Uuid,
  pub name: String,
  pub email: String,
  pub referral_code: String,
  pub account_status: AccountStatus,
  pub created_at: DateTime<Utc>,
}

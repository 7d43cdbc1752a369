// core/src/store/mod.rs

//! Persistence boundary for verified users.
//!
//! Every implementation enforces the unique indexes (id, email, phone, referral
//! code) itself and applies multi-record referral updates in one transaction.

pub mod memory;

use crate::config::PropagationMode;
use crate::error::{CoreError, CoreResult};
use crate::models::{AccountStatus, DueStatus, PayoutRecord, ResetToken, Role, Tier, User, UserStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryIdentityStore;

/// Partial update of the mutable user fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
  pub name: Option<String>,
  pub email: Option<String>,
  /// `Some(None)` clears the phone number.
  pub phone: Option<Option<String>>,
  pub password_hash: Option<String>,
  pub role: Option<Role>,
  pub status: Option<UserStatus>,
  pub account_status: Option<AccountStatus>,
  pub company_profit_due_status: Option<DueStatus>,
  /// `Some(None)` clears a pending reset token.
  pub reset_token: Option<Option<ResetToken>>,
}

impl UserPatch {
  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.email.is_none()
      && self.phone.is_none()
      && self.password_hash.is_none()
      && self.role.is_none()
      && self.status.is_none()
      && self.account_status.is_none()
      && self.company_profit_due_status.is_none()
      && self.reset_token.is_none()
  }

  pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) {
    if let Some(name) = &self.name {
      user.name = name.clone();
    }
    if let Some(email) = &self.email {
      user.email = email.clone();
    }
    if let Some(phone) = &self.phone {
      user.phone = phone.clone();
    }
    if let Some(hash) = &self.password_hash {
      user.password_hash = hash.clone();
    }
    if let Some(role) = self.role {
      user.role = role;
    }
    if let Some(status) = self.status {
      user.status = status;
    }
    if let Some(account_status) = self.account_status {
      user.account_status = account_status;
    }
    if let Some(due) = self.company_profit_due_status {
      user.company_profit_due_status = due;
    }
    if let Some(token) = &self.reset_token {
      user.reset_token = token.clone();
    }
    user.updated_at = now;
  }
}

/// One tier entry: `referral_id` is appended to `ancestor_id`'s `tier` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorLink {
  pub ancestor_id: Uuid,
  pub referral_id: Uuid,
  pub tier: Tier,
}

impl AncestorLink {
  pub fn new(ancestor_id: Uuid, referral_id: Uuid, tier: Tier) -> Self {
    Self {
      ancestor_id,
      referral_id,
      tier,
    }
  }
}

/// The writes that attach `member_id` below `sponsor_id`. Produced by the referral
/// graph, applied by [`IdentityStore::promote`] or [`IdentityStore::apply_links`].
///
/// Stores re-derive `links` and the stage ids with [`derive_links`] from rows read
/// inside the applying transaction; after a successful apply the plan describes
/// exactly what was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralLinkPlan {
  pub member_id: Uuid,
  pub sponsor_id: Uuid,
  pub mode: PropagationMode,
  pub stage2_ancestor_id: Option<Uuid>,
  pub stage3_ancestor_id: Option<Uuid>,
  /// Always starts with the sponsor's `Tier::Direct` entry for the member.
  pub links: Vec<AncestorLink>,
}

impl ReferralLinkPlan {
  pub fn new(member_id: Uuid, sponsor_id: Uuid, mode: PropagationMode) -> Self {
    Self {
      member_id,
      sponsor_id,
      mode,
      stage2_ancestor_id: None,
      stage3_ancestor_id: None,
      links: Vec::new(),
    }
  }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
  /// Inserts a user with no referral side effects.
  async fn create(&self, user: User) -> CoreResult<User>;

  async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<User>>;

  /// `email` must already be normalized.
  async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;

  async fn find_by_phone(&self, phone: &str) -> CoreResult<Option<User>>;

  async fn find_by_referral_code(&self, code: &str) -> CoreResult<Option<User>>;

  async fn find_by_reset_token(&self, token_hash: &str) -> CoreResult<Option<User>>;

  /// Users for the given ids in input order; unknown ids are skipped.
  async fn find_many(&self, ids: &[Uuid]) -> CoreResult<Vec<User>>;

  /// Fails with `UserNotFound`, or a duplicate error if the new email/phone is taken.
  async fn update(&self, id: Uuid, patch: UserPatch) -> CoreResult<User>;

  /// Increments the attempt counter, saturating at `threshold`, and locks the
  /// account once the counter reaches it.
  async fn record_failed_login(&self, id: Uuid, threshold: u32) -> CoreResult<User>;

  /// Zeroes the counter, unlocks, and records `at` as the last login.
  async fn reset_login_attempts(&self, id: Uuid, at: DateTime<Utc>) -> CoreResult<User>;

  async fn credit(&self, id: Uuid, tier: Tier, amount: i64) -> CoreResult<User>;

  /// Zeroes the three accruals and records what they held as a payout, in one
  /// transaction. Rejected with `WithdrawalNotEligible` when the user's due
  /// status is `Inactive`.
  async fn reset_accruals(&self, id: Uuid) -> CoreResult<PayoutRecord>;

  /// Settled payouts of a user, newest first.
  async fn payouts(&self, user_id: Uuid) -> CoreResult<Vec<PayoutRecord>>;

  /// Atomically appends the plan's ancestor links and inserts `member`.
  /// Either everything is committed or nothing is. The plan is re-derived
  /// against the locked sponsor rows before it is written.
  async fn promote(&self, member: User, plan: Option<&mut ReferralLinkPlan>) -> CoreResult<User>;

  /// Atomically attaches an existing member together with its subtree. Fails
  /// with `AlreadyLinked` if the member gained a sponsor in the meantime.
  async fn apply_links(&self, plan: &mut ReferralLinkPlan) -> CoreResult<User>;
}

/// Rebuilds `plan.links` from the sponsor row, the sponsor's own sponsor
/// (`stage2`, only read in `SponsorChain` mode) and, for a late link, the member
/// being attached. Callers pass rows read in the transaction that applies the plan.
pub fn derive_links(
  plan: &mut ReferralLinkPlan,
  sponsor: &User,
  stage2: Option<&User>,
  member: Option<&User>,
) -> CoreResult<()> {
  if sponsor.id != plan.sponsor_id {
    return Err(CoreError::Internal(format!(
      "Referral plan for {} was derived against the wrong sponsor",
      plan.member_id
    )));
  }
  let member_id = plan.member_id;
  if let Some(member) = member {
    if Tier::ALL.iter().any(|tier| member.referrals(*tier).contains(&sponsor.id)) {
      return Err(CoreError::ReferralCycle {
        member: member_id,
        sponsor: sponsor.id,
      });
    }
  }

  let mut links = vec![AncestorLink::new(sponsor.id, member_id, Tier::Direct)];
  plan.stage2_ancestor_id = None;
  plan.stage3_ancestor_id = None;
  match plan.mode {
    PropagationMode::Literal => {
      // The sponsor's first direct referral receives the stage-3 entry.
      if let Some(first) = sponsor.direct_referrals.first().copied().filter(|id| *id != member_id) {
        plan.stage2_ancestor_id = Some(first);
        links.push(AncestorLink::new(first, member_id, Tier::Stage3));
      }
    }
    PropagationMode::SponsorChain => {
      let stage2 = stage2.filter(|g| Some(g.id) == sponsor.sponsor_id);
      plan.stage2_ancestor_id = stage2.map(|g| g.id);
      plan.stage3_ancestor_id = stage2.and_then(|g| g.sponsor_id);
      if let Some(g) = plan.stage2_ancestor_id {
        links.push(AncestorLink::new(g, member_id, Tier::Stage2));
      }
      if let Some(gg) = plan.stage3_ancestor_id {
        links.push(AncestorLink::new(gg, member_id, Tier::Stage3));
      }
      // A member attached late brings its first two levels along.
      if let Some(member) = member {
        for child in &member.direct_referrals {
          links.push(AncestorLink::new(sponsor.id, *child, Tier::Stage2));
          if let Some(g) = plan.stage2_ancestor_id {
            links.push(AncestorLink::new(g, *child, Tier::Stage3));
          }
        }
        for grandchild in &member.stage2_referrals {
          links.push(AncestorLink::new(sponsor.id, *grandchild, Tier::Stage3));
        }
      }
    }
  }
  plan.links = links;
  Ok(())
}

/// Checks that a plan is internally consistent before it is applied.
pub fn check_plan(plan: &ReferralLinkPlan) -> CoreResult<()> {
  match plan.links.first() {
    Some(first)
      if first.ancestor_id == plan.sponsor_id
        && first.referral_id == plan.member_id
        && first.tier == Tier::Direct => {}
    _ => {
      return Err(CoreError::Internal(format!(
        "Referral plan for {} does not start with its sponsor link",
        plan.member_id
      )))
    }
  }
  if plan
    .links
    .iter()
    .any(|l| l.ancestor_id == plan.member_id || l.ancestor_id == l.referral_id)
  {
    return Err(CoreError::ReferralCycle {
      member: plan.member_id,
      sponsor: plan.sponsor_id,
    });
  }
  Ok(())
}

pub fn check_amount(amount: i64) -> CoreResult<()> {
  if amount <= 0 {
    return Err(CoreError::InvalidAmount(amount));
  }
  Ok(())
}

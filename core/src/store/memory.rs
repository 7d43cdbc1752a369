// core/src/store/memory.rs

//! In-memory identity store, for tests and single-process deployments.

use super::{check_amount, check_plan, derive_links, IdentityStore, ReferralLinkPlan, UserPatch};
use crate::config::PropagationMode;
use crate::error::{CoreError, CoreResult};
use crate::models::{DueStatus, PayoutRecord, Tier, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
  users: HashMap<Uuid, User>,
  // Unique indexes
  by_email: HashMap<String, Uuid>,
  by_phone: HashMap<String, Uuid>,
  by_code: HashMap<String, Uuid>,
  payouts: HashMap<Uuid, Vec<PayoutRecord>>,
}

impl Tables {
  fn user_mut(&mut self, id: Uuid) -> CoreResult<&mut User> {
    self.users.get_mut(&id).ok_or_else(|| CoreError::UserNotFound(id.to_string()))
  }

  fn check_unique(&self, user: &User) -> CoreResult<()> {
    if self.users.contains_key(&user.id) {
      return Err(CoreError::Storage(format!("User id {} already exists", user.id)));
    }
    if self.by_email.contains_key(&user.email) {
      return Err(CoreError::DuplicateEmail);
    }
    if let Some(phone) = &user.phone {
      if self.by_phone.contains_key(phone) {
        return Err(CoreError::DuplicatePhone);
      }
    }
    if self.by_code.contains_key(&user.referral_code) {
      return Err(CoreError::DuplicateReferralCode);
    }
    Ok(())
  }

  fn insert(&mut self, user: User) -> User {
    self.by_email.insert(user.email.clone(), user.id);
    if let Some(phone) = &user.phone {
      self.by_phone.insert(phone.clone(), user.id);
    }
    self.by_code.insert(user.referral_code.clone(), user.id);
    self.users.insert(user.id, user.clone());
    user
  }

  /// Re-derives the plan from the current rows, then validates every ancestor
  /// before anything is written.
  fn settle_plan(&self, plan: &mut ReferralLinkPlan, member: Option<&User>) -> CoreResult<()> {
    let sponsor = self
      .users
      .get(&plan.sponsor_id)
      .ok_or_else(|| CoreError::UserNotFound(plan.sponsor_id.to_string()))?;
    let stage2 = match plan.mode {
      PropagationMode::SponsorChain => sponsor.sponsor_id.and_then(|id| self.users.get(&id)),
      PropagationMode::Literal => None,
    };
    derive_links(plan, sponsor, stage2, member)?;
    check_plan(plan)?;
    for link in &plan.links {
      if !self.users.contains_key(&link.ancestor_id) {
        return Err(CoreError::UserNotFound(link.ancestor_id.to_string()));
      }
    }
    Ok(())
  }

  fn write_links(&mut self, plan: &ReferralLinkPlan, now: DateTime<Utc>) {
    for link in &plan.links {
      if let Some(ancestor) = self.users.get_mut(&link.ancestor_id) {
        let list = ancestor.referrals_mut(link.tier);
        if !list.contains(&link.referral_id) {
          list.push(link.referral_id);
        }
        ancestor.updated_at = now;
      }
    }
  }

  fn lookup(&self, index: &HashMap<String, Uuid>, key: &str) -> Option<User> {
    index.get(key).and_then(|id| self.users.get(id)).cloned()
  }
}

/// All tables sit behind one lock, so every operation is a transaction.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
  tables: RwLock<Tables>,
}

impl MemoryIdentityStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.tables.read().users.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
  #[instrument(name = "memory_store::create", skip_all, fields(user_id = %user.id))]
  async fn create(&self, user: User) -> CoreResult<User> {
    let mut tables = self.tables.write();
    tables.check_unique(&user)?;
    Ok(tables.insert(user))
  }

  async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<User>> {
    Ok(self.tables.read().users.get(&id).cloned())
  }

  async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
    let tables = self.tables.read();
    Ok(tables.lookup(&tables.by_email, email))
  }

  async fn find_by_phone(&self, phone: &str) -> CoreResult<Option<User>> {
    let tables = self.tables.read();
    Ok(tables.lookup(&tables.by_phone, phone))
  }

  async fn find_by_referral_code(&self, code: &str) -> CoreResult<Option<User>> {
    let tables = self.tables.read();
    Ok(tables.lookup(&tables.by_code, code))
  }

  async fn find_by_reset_token(&self, token_hash: &str) -> CoreResult<Option<User>> {
    let tables = self.tables.read();
    Ok(
      tables
        .users
        .values()
        .find(|u| u.reset_token.as_ref().map_or(false, |t| t.token_hash == token_hash))
        .cloned(),
    )
  }

  async fn find_many(&self, ids: &[Uuid]) -> CoreResult<Vec<User>> {
    let tables = self.tables.read();
    Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
  }

  #[instrument(name = "memory_store::update", skip(self, patch))]
  async fn update(&self, id: Uuid, patch: UserPatch) -> CoreResult<User> {
    let mut tables = self.tables.write();
    let current = tables
      .users
      .get(&id)
      .cloned()
      .ok_or_else(|| CoreError::UserNotFound(id.to_string()))?;

    if let Some(email) = &patch.email {
      if tables.by_email.get(email).map_or(false, |owner| *owner != id) {
        return Err(CoreError::DuplicateEmail);
      }
    }
    if let Some(Some(phone)) = &patch.phone {
      if tables.by_phone.get(phone).map_or(false, |owner| *owner != id) {
        return Err(CoreError::DuplicatePhone);
      }
    }

    let mut updated = current.clone();
    patch.apply_to(&mut updated, Utc::now());

    if updated.email != current.email {
      tables.by_email.remove(&current.email);
      tables.by_email.insert(updated.email.clone(), id);
    }
    if updated.phone != current.phone {
      if let Some(old) = &current.phone {
        tables.by_phone.remove(old);
      }
      if let Some(new) = &updated.phone {
        tables.by_phone.insert(new.clone(), id);
      }
    }
    tables.users.insert(id, updated.clone());
    Ok(updated)
  }

  async fn record_failed_login(&self, id: Uuid, threshold: u32) -> CoreResult<User> {
    let mut tables = self.tables.write();
    let user = tables.user_mut(id)?;
    user.login_attempts = user.login_attempts.saturating_add(1).min(threshold);
    if user.login_attempts >= threshold {
      user.account_locked = true;
    }
    user.updated_at = Utc::now();
    debug!(user_id = %id, attempts = user.login_attempts, locked = user.account_locked, "Failed login recorded.");
    Ok(user.clone())
  }

  async fn reset_login_attempts(&self, id: Uuid, at: DateTime<Utc>) -> CoreResult<User> {
    let mut tables = self.tables.write();
    let user = tables.user_mut(id)?;
    user.login_attempts = 0;
    user.account_locked = false;
    user.last_login = Some(at);
    user.updated_at = Utc::now();
    Ok(user.clone())
  }

  #[instrument(name = "memory_store::credit", skip(self))]
  async fn credit(&self, id: Uuid, tier: Tier, amount: i64) -> CoreResult<User> {
    check_amount(amount)?;
    let mut tables = self.tables.write();
    let user = tables.user_mut(id)?;
    user.incentive.credit(tier, amount)?;
    user.updated_at = Utc::now();
    Ok(user.clone())
  }

  #[instrument(name = "memory_store::reset_accruals", skip(self))]
  async fn reset_accruals(&self, id: Uuid) -> CoreResult<PayoutRecord> {
    let mut tables = self.tables.write();
    let user = tables.user_mut(id)?;
    if user.company_profit_due_status == DueStatus::Inactive {
      return Err(CoreError::WithdrawalNotEligible);
    }
    let now = Utc::now();
    let record = PayoutRecord::new(id, std::mem::take(&mut user.incentive), now);
    user.updated_at = now;
    tables.payouts.entry(id).or_default().push(record);
    Ok(record)
  }

  async fn payouts(&self, user_id: Uuid) -> CoreResult<Vec<PayoutRecord>> {
    let tables = self.tables.read();
    let mut records = tables.payouts.get(&user_id).cloned().unwrap_or_default();
    records.reverse();
    Ok(records)
  }

  #[instrument(name = "memory_store::promote", skip_all, fields(user_id = %member.id))]
  async fn promote(&self, member: User, plan: Option<&mut ReferralLinkPlan>) -> CoreResult<User> {
    let mut tables = self.tables.write();
    tables.check_unique(&member)?;
    let linked = plan.is_some();
    if let Some(plan) = plan {
      if plan.member_id != member.id {
        return Err(CoreError::Internal("Referral plan does not belong to the promoted member".to_string()));
      }
      tables.settle_plan(plan, None)?;
      tables.write_links(plan, member.created_at);
    }
    debug!(user_id = %member.id, linked, "Member promoted into the identity store.");
    Ok(tables.insert(member))
  }

  #[instrument(name = "memory_store::apply_links", skip_all, fields(member_id = %plan.member_id))]
  async fn apply_links(&self, plan: &mut ReferralLinkPlan) -> CoreResult<User> {
    let mut tables = self.tables.write();
    let member = tables
      .users
      .get(&plan.member_id)
      .cloned()
      .ok_or_else(|| CoreError::UserNotFound(plan.member_id.to_string()))?;
    if member.sponsor_id.is_some() {
      return Err(CoreError::AlreadyLinked(plan.member_id));
    }
    tables.settle_plan(plan, Some(&member))?;

    let now = Utc::now();
    tables.write_links(plan, now);
    let member = tables.user_mut(plan.member_id)?;
    member.sponsor_id = Some(plan.sponsor_id);
    member.updated_at = now;
    Ok(member.clone())
  }
}

// server/src/db/pg_store.rs

//! PostgreSQL-backed identity store. Multi-row changes (promotion, linking)
//! run in one transaction with the touched rows locked `FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use referral_core::models::ResetToken;
use referral_core::store::{check_amount, check_plan, derive_links};
use referral_core::{
  AccountStatus, CoreError, CoreResult, DueStatus, IdentityStore, IncentiveAccrual, PayoutRecord, PropagationMode,
  ReferralLinkPlan, Role, Tier, User, UserPatch, UserStatus,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct UserRow {
  id: Uuid,
  name: String,
  email: String,
  phone: Option<String>,
  password_hash: String,
  role: String,
  status: String,
  referral_code: String,
  sponsor_id: Option<Uuid>,
  direct_referrals: Vec<Uuid>,
  stage2_referrals: Vec<Uuid>,
  stage3_referrals: Vec<Uuid>,
  direct_incentive: i64,
  stage2_incentive: i64,
  stage3_incentive: i64,
  company_profit_due_status: String,
  email_verified: bool,
  account_status: String,
  login_attempts: i32,
  account_locked: bool,
  reset_token_hash: Option<String>,
  reset_token_expires: Option<DateTime<Utc>>,
  last_login: Option<DateTime<Utc>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PayoutRow {
  id: Uuid,
  user_id: Uuid,
  direct_amount: i64,
  stage2_amount: i64,
  stage3_amount: i64,
  total: i64,
  settled_at: DateTime<Utc>,
}

impl From<PayoutRow> for PayoutRecord {
  fn from(row: PayoutRow) -> Self {
    PayoutRecord {
      id: row.id,
      user_id: row.user_id,
      direct: row.direct_amount,
      stage2: row.stage2_amount,
      stage3: row.stage3_amount,
      total: row.total,
      settled_at: row.settled_at,
    }
  }
}

fn column<T>(id: Uuid, name: &str, raw: &str) -> CoreResult<T>
where
  T: FromStr<Err = CoreError>,
{
  raw
    .parse()
    .map_err(|_| CoreError::Storage(format!("User {} has an unreadable {} '{}'", id, name, raw)))
}

impl TryFrom<UserRow> for User {
  type Error = CoreError;

  fn try_from(row: UserRow) -> CoreResult<Self> {
    let reset_token = match (row.reset_token_hash, row.reset_token_expires) {
      (Some(token_hash), Some(expires_at)) => Some(ResetToken { token_hash, expires_at }),
      _ => None,
    };
    Ok(User {
      role: column::<Role>(row.id, "role", &row.role)?,
      status: column::<UserStatus>(row.id, "status", &row.status)?,
      company_profit_due_status: column::<DueStatus>(row.id, "due status", &row.company_profit_due_status)?,
      account_status: column::<AccountStatus>(row.id, "account status", &row.account_status)?,
      id: row.id,
      name: row.name,
      email: row.email,
      phone: row.phone,
      password_hash: row.password_hash,
      referral_code: row.referral_code,
      sponsor_id: row.sponsor_id,
      direct_referrals: row.direct_referrals,
      stage2_referrals: row.stage2_referrals,
      stage3_referrals: row.stage3_referrals,
      incentive: IncentiveAccrual {
        direct: row.direct_incentive,
        stage2: row.stage2_incentive,
        stage3: row.stage3_incentive,
      },
      email_verified: row.email_verified,
      login_attempts: u32::try_from(row.login_attempts).unwrap_or(0),
      account_locked: row.account_locked,
      reset_token,
      last_login: row.last_login,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

/// Unique-constraint violations become the matching duplicate error; everything else is storage.
fn storage_error(err: sqlx::Error) -> CoreError {
  if let sqlx::Error::Database(db) = &err {
    match db.constraint() {
      Some("users_email_key") => return CoreError::DuplicateEmail,
      Some("users_phone_key") => return CoreError::DuplicatePhone,
      Some("users_referral_code_key") => return CoreError::DuplicateReferralCode,
      _ => {}
    }
  }
  CoreError::Storage(err.to_string())
}

fn into_user(row: Option<UserRow>) -> CoreResult<Option<User>> {
  row.map(User::try_from).transpose()
}

const INSERT_USER: &str = r#"
  INSERT INTO users (
    id, name, email, phone, password_hash, role, status, referral_code, sponsor_id,
    direct_referrals, stage2_referrals, stage3_referrals,
    direct_incentive, stage2_incentive, stage3_incentive,
    company_profit_due_status, email_verified, account_status, login_attempts, account_locked,
    reset_token_hash, reset_token_expires, last_login, created_at, updated_at
  ) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
  ) RETURNING *"#;

const UPDATE_USER: &str = r#"
  UPDATE users SET
    name = $2, email = $3, phone = $4, password_hash = $5, role = $6, status = $7, referral_code = $8,
    sponsor_id = $9, direct_referrals = $10, stage2_referrals = $11, stage3_referrals = $12,
    direct_incentive = $13, stage2_incentive = $14, stage3_incentive = $15,
    company_profit_due_status = $16, email_verified = $17, account_status = $18,
    login_attempts = $19, account_locked = $20, reset_token_hash = $21, reset_token_expires = $22,
    last_login = $23, created_at = $24, updated_at = $25
  WHERE id = $1
  RETURNING *"#;

/// Binds every column of `user` in the positional order shared by `INSERT_USER` and `UPDATE_USER`.
fn bind_user<'q>(
  sql: &'q str,
  user: &User,
) -> sqlx::query::QueryAs<'q, Postgres, UserRow, sqlx::postgres::PgArguments> {
  sqlx::query_as::<_, UserRow>(sql)
    .bind(user.id)
    .bind(user.name.clone())
    .bind(user.email.clone())
    .bind(user.phone.clone())
    .bind(user.password_hash.clone())
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(user.referral_code.clone())
    .bind(user.sponsor_id)
    .bind(user.direct_referrals.clone())
    .bind(user.stage2_referrals.clone())
    .bind(user.stage3_referrals.clone())
    .bind(user.incentive.direct)
    .bind(user.incentive.stage2)
    .bind(user.incentive.stage3)
    .bind(user.company_profit_due_status.as_str())
    .bind(user.email_verified)
    .bind(user.account_status.as_str())
    .bind(i32::try_from(user.login_attempts).unwrap_or(i32::MAX))
    .bind(user.account_locked)
    .bind(user.reset_token.as_ref().map(|t| t.token_hash.clone()))
    .bind(user.reset_token.as_ref().map(|t| t.expires_at))
    .bind(user.last_login)
    .bind(user.created_at)
    .bind(user.updated_at)
}

#[derive(Clone)]
pub struct PgIdentityStore {
  pool: PgPool,
}

impl PgIdentityStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  async fn begin(&self) -> CoreResult<Transaction<'static, Postgres>> {
    self.pool.begin().await.map_err(storage_error)
  }

  async fn find_one(&self, sql: &str, key: &str) -> CoreResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(sql)
      .bind(key)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    into_user(row)
  }

  /// Loads a user and holds its row lock until the transaction ends.
  async fn lock_user(tx: &mut Transaction<'static, Postgres>, id: Uuid) -> CoreResult<User> {
    let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
      .bind(id)
      .fetch_optional(&mut **tx)
      .await
      .map_err(storage_error)?;
    into_user(row)?.ok_or_else(|| CoreError::UserNotFound(id.to_string()))
  }

  async fn save_user(tx: &mut Transaction<'static, Postgres>, user: &User) -> CoreResult<User> {
    let row = bind_user(UPDATE_USER, user)
      .fetch_one(&mut **tx)
      .await
      .map_err(storage_error)?;
    User::try_from(row)
  }

  /// Read-modify-write of one row inside its own transaction.
  async fn modify<F>(&self, id: Uuid, change: F) -> CoreResult<User>
  where
    F: FnOnce(&mut User) -> CoreResult<()> + Send,
  {
    let mut tx = self.begin().await?;
    let mut user = Self::lock_user(&mut tx, id).await?;
    change(&mut user)?;
    user.updated_at = Utc::now();
    let saved = Self::save_user(&mut tx, &user).await?;
    tx.commit().await.map_err(storage_error)?;
    Ok(saved)
  }

  /// Locks the sponsor (and, in sponsor-chain mode, the sponsor's sponsor),
  /// re-derives the plan from those locked rows, then locks the remaining
  /// ancestors in id order and appends the planned entries.
  ///
  /// Rows are locked bottom-up along sponsor edges. A literal-mode stage-3 target
  /// sits below its sponsor, so two transactions can still wait on each other;
  /// Postgres aborts one and the caller sees a retryable storage error.
  async fn write_links(
    tx: &mut Transaction<'static, Postgres>,
    plan: &mut ReferralLinkPlan,
    member: Option<&User>,
    now: DateTime<Utc>,
  ) -> CoreResult<()> {
    let sponsor = Self::lock_user(tx, plan.sponsor_id).await?;
    let stage2 = match (plan.mode, sponsor.sponsor_id) {
      (PropagationMode::SponsorChain, Some(id)) => Some(Self::lock_user(tx, id).await?),
      _ => None,
    };
    derive_links(plan, &sponsor, stage2.as_ref(), member)?;
    check_plan(plan)?;

    let mut ancestors: HashMap<Uuid, User> = HashMap::with_capacity(plan.links.len());
    ancestors.insert(sponsor.id, sponsor);
    if let Some(stage2) = stage2 {
      ancestors.insert(stage2.id, stage2);
    }
    let rest: BTreeSet<Uuid> = plan
      .links
      .iter()
      .map(|l| l.ancestor_id)
      .filter(|id| !ancestors.contains_key(id))
      .collect();
    for id in rest {
      let ancestor = Self::lock_user(tx, id).await?;
      ancestors.insert(id, ancestor);
    }

    let mut touched = BTreeSet::new();
    for link in &plan.links {
      if let Some(ancestor) = ancestors.get_mut(&link.ancestor_id) {
        let list = match link.tier {
          Tier::Direct => &mut ancestor.direct_referrals,
          Tier::Stage2 => &mut ancestor.stage2_referrals,
          Tier::Stage3 => &mut ancestor.stage3_referrals,
        };
        if !list.contains(&link.referral_id) {
          list.push(link.referral_id);
        }
        ancestor.updated_at = now;
        touched.insert(link.ancestor_id);
      }
    }
    for id in touched {
      if let Some(ancestor) = ancestors.get(&id) {
        Self::save_user(tx, ancestor).await?;
      }
    }
    Ok(())
  }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
  #[instrument(name = "pg_store::create", skip_all, fields(user_id = %user.id))]
  async fn create(&self, user: User) -> CoreResult<User> {
    let row = bind_user(INSERT_USER, &user)
      .fetch_one(&self.pool)
      .await
      .map_err(storage_error)?;
    User::try_from(row)
  }

  async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    into_user(row)
  }

  async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
    self.find_one("SELECT * FROM users WHERE email = $1", email).await
  }

  async fn find_by_phone(&self, phone: &str) -> CoreResult<Option<User>> {
    self.find_one("SELECT * FROM users WHERE phone = $1", phone).await
  }

  async fn find_by_referral_code(&self, code: &str) -> CoreResult<Option<User>> {
    self.find_one("SELECT * FROM users WHERE referral_code = $1", code).await
  }

  async fn find_by_reset_token(&self, token_hash: &str) -> CoreResult<Option<User>> {
    self
      .find_one("SELECT * FROM users WHERE reset_token_hash = $1", token_hash)
      .await
  }

  async fn find_many(&self, ids: &[Uuid]) -> CoreResult<Vec<User>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ANY($1)")
      .bind(ids.to_vec())
      .fetch_all(&self.pool)
      .await
      .map_err(storage_error)?;
    let mut by_id = HashMap::with_capacity(rows.len());
    for row in rows {
      let user = User::try_from(row)?;
      by_id.insert(user.id, user);
    }
    // Input order, duplicates preserved
    Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
  }

  #[instrument(name = "pg_store::update", skip(self, patch))]
  async fn update(&self, id: Uuid, patch: UserPatch) -> CoreResult<User> {
    let now = Utc::now();
    self
      .modify(id, move |user| {
        patch.apply_to(user, now);
        Ok(())
      })
      .await
  }

  async fn record_failed_login(&self, id: Uuid, threshold: u32) -> CoreResult<User> {
    let user = self
      .modify(id, |user| {
        user.login_attempts = user.login_attempts.saturating_add(1).min(threshold);
        if user.login_attempts >= threshold {
          user.account_locked = true;
        }
        Ok(())
      })
      .await?;
    debug!(user_id = %id, attempts = user.login_attempts, locked = user.account_locked, "Failed login recorded.");
    Ok(user)
  }

  async fn reset_login_attempts(&self, id: Uuid, at: DateTime<Utc>) -> CoreResult<User> {
    self
      .modify(id, |user| {
        user.login_attempts = 0;
        user.account_locked = false;
        user.last_login = Some(at);
        Ok(())
      })
      .await
  }

  #[instrument(name = "pg_store::credit", skip(self))]
  async fn credit(&self, id: Uuid, tier: Tier, amount: i64) -> CoreResult<User> {
    check_amount(amount)?;
    self.modify(id, |user| user.incentive.credit(tier, amount)).await
  }

  #[instrument(name = "pg_store::reset_accruals", skip(self))]
  async fn reset_accruals(&self, id: Uuid) -> CoreResult<PayoutRecord> {
    let mut tx = self.begin().await?;
    let mut user = Self::lock_user(&mut tx, id).await?;
    if user.company_profit_due_status == DueStatus::Inactive {
      return Err(CoreError::WithdrawalNotEligible);
    }
    let now = Utc::now();
    let record = PayoutRecord::new(id, std::mem::take(&mut user.incentive), now);
    user.updated_at = now;
    Self::save_user(&mut tx, &user).await?;
    sqlx::query(
      "INSERT INTO payouts (id, user_id, direct_amount, stage2_amount, stage3_amount, total, settled_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(record.direct)
    .bind(record.stage2)
    .bind(record.stage3)
    .bind(record.total)
    .bind(record.settled_at)
    .execute(&mut *tx)
    .await
    .map_err(storage_error)?;
    tx.commit().await.map_err(storage_error)?;
    debug!(user_id = %id, payout_id = %record.id, total = record.total, "Payout recorded.");
    Ok(record)
  }

  async fn payouts(&self, user_id: Uuid) -> CoreResult<Vec<PayoutRecord>> {
    let rows = sqlx::query_as::<_, PayoutRow>(
      "SELECT * FROM payouts WHERE user_id = $1 ORDER BY settled_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(storage_error)?;
    Ok(rows.into_iter().map(PayoutRecord::from).collect())
  }

  #[instrument(name = "pg_store::promote", skip_all, fields(user_id = %member.id))]
  async fn promote(&self, member: User, plan: Option<&mut ReferralLinkPlan>) -> CoreResult<User> {
    let linked = plan.is_some();
    let mut tx = self.begin().await?;
    if let Some(plan) = plan {
      if plan.member_id != member.id {
        return Err(CoreError::Internal(
          "Referral plan does not belong to the promoted member".to_string(),
        ));
      }
      // Ancestors first: their row locks order concurrent promotions under the same sponsor.
      Self::write_links(&mut tx, plan, None, member.created_at).await?;
    }
    let row = bind_user(INSERT_USER, &member)
      .fetch_one(&mut *tx)
      .await
      .map_err(storage_error)?;
    let promoted = User::try_from(row)?;
    tx.commit().await.map_err(storage_error)?;
    debug!(user_id = %promoted.id, linked, "Member promoted into the identity store.");
    Ok(promoted)
  }

  #[instrument(name = "pg_store::apply_links", skip_all, fields(member_id = %plan.member_id))]
  async fn apply_links(&self, plan: &mut ReferralLinkPlan) -> CoreResult<User> {
    let mut tx = self.begin().await?;
    let mut member = Self::lock_user(&mut tx, plan.member_id).await?;
    if member.sponsor_id.is_some() {
      return Err(CoreError::AlreadyLinked(plan.member_id));
    }
    let now = Utc::now();
    Self::write_links(&mut tx, plan, Some(&member), now).await?;
    member.sponsor_id = Some(plan.sponsor_id);
    member.updated_at = now;
    let linked = Self::save_user(&mut tx, &member).await?;
    tx.commit().await.map_err(storage_error)?;
    Ok(linked)
  }
}

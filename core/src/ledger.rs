// core/src/ledger.rs

//! Per-user incentive accruals and the withdrawal gate.

use crate::error::{CoreError, CoreResult};
use crate::models::{DueStatus, IncentiveAccrual, PayoutRecord, Tier};
use crate::store::{IdentityStore, UserPatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSnapshot {
  pub user_id: Uuid,
  pub accrual: IncentiveAccrual,
  pub total: i64,
  pub company_profit_due_status: DueStatus,
  pub withdrawal_eligible: bool,
}

/// Withdrawal is allowed only while the company profit due status is `Active`.
pub fn is_withdrawal_eligible(status: DueStatus) -> bool {
  status == DueStatus::Active
}

#[derive(Clone)]
pub struct Ledger {
  store: Arc<dyn IdentityStore>,
}

impl Ledger {
  pub fn new(store: Arc<dyn IdentityStore>) -> Self {
    Self { store }
  }

  #[instrument(name = "ledger::credit", skip(self))]
  pub async fn credit(&self, user_id: Uuid, tier: Tier, amount: i64) -> CoreResult<DueSnapshot> {
    if amount <= 0 {
      return Err(CoreError::InvalidAmount(amount));
    }
    let user = self.store.credit(user_id, tier, amount).await?;
    info!(%user_id, %tier, amount, "Incentive credited.");
    Ok(snapshot(user_id, user.incentive, user.company_profit_due_status))
  }

  pub async fn read_due(&self, user_id: Uuid) -> CoreResult<DueSnapshot> {
    let user = self
      .store
      .find_by_id(user_id)
      .await?
      .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
    Ok(snapshot(user_id, user.incentive, user.company_profit_due_status))
  }

  pub async fn set_due_status(&self, user_id: Uuid, status: DueStatus) -> CoreResult<DueSnapshot> {
    let patch = UserPatch {
      company_profit_due_status: Some(status),
      ..Default::default()
    };
    let user = self.store.update(user_id, patch).await?;
    info!(%user_id, %status, "Company profit due status changed.");
    Ok(snapshot(user_id, user.incentive, user.company_profit_due_status))
  }

  /// Zeroes the accruals and records what was owed. The external payout process
  /// moves the money.
  #[instrument(name = "ledger::settle", skip(self))]
  pub async fn settle(&self, user_id: Uuid) -> CoreResult<PayoutRecord> {
    let record = self.store.reset_accruals(user_id).await?;
    info!(%user_id, payout_id = %record.id, total = record.total, "Incentive accruals settled.");
    Ok(record)
  }

  /// Payout history, newest first.
  pub async fn payouts(&self, user_id: Uuid) -> CoreResult<Vec<PayoutRecord>> {
    self.store.payouts(user_id).await
  }
}

fn snapshot(user_id: Uuid, accrual: IncentiveAccrual, status: DueStatus) -> DueSnapshot {
  DueSnapshot {
    user_id,
    accrual,
    total: accrual.total(),
    company_profit_due_status: status,
    withdrawal_eligible: is_withdrawal_eligible(status),
  }
}

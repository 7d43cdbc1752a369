// tests/ledger_tests.rs
mod common;
use common::*;
use referral_core::{CoreError, DueStatus, Tier};
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn credit_accumulates_per_tier() {
  let h = harness();
  let user = h.onboard("Earning Member", "earner@example.com", None).await;

  h.service.credit_incentive(user.id, Tier::Direct, 1_500).await.unwrap();
  h.service.credit_incentive(user.id, Tier::Stage3, 200).await.unwrap();
  let snapshot = h.service.credit_incentive(user.id, Tier::Direct, 500).await.unwrap();

  assert_eq!(snapshot.accrual.direct, 2_000);
  assert_eq!(snapshot.accrual.stage2, 0);
  assert_eq!(snapshot.accrual.stage3, 200);
  assert_eq!(snapshot.total, 2_200);
  assert!(snapshot.withdrawal_eligible);
  assert_eq!(h.service.ledger().read_due(user.id).await.unwrap(), snapshot);
}

#[tokio::test]
#[serial]
async fn non_positive_amounts_and_unknown_users_are_rejected() {
  let h = harness();
  let user = h.onboard("Earning Member", "earner@example.com", None).await;

  for amount in [0, -1, i64::MIN] {
    let err = h.service.credit_incentive(user.id, Tier::Stage2, amount).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidAmount(a) if a == amount));
  }
  let err = h.service.credit_incentive(Uuid::new_v4(), Tier::Direct, 10).await.unwrap_err();
  assert!(matches!(err, CoreError::UserNotFound(_)));
  assert_eq!(h.service.ledger().read_due(user.id).await.unwrap().total, 0);
}

#[tokio::test]
#[serial]
async fn settlement_is_gated_by_due_status() {
  let h = harness();
  let user = h.onboard("Paid Member", "paid@example.com", None).await;
  let ledger = h.service.ledger();
  ledger.credit(user.id, Tier::Direct, 700).await.unwrap();
  ledger.credit(user.id, Tier::Stage2, 300).await.unwrap();

  let snapshot = ledger.set_due_status(user.id, DueStatus::Inactive).await.unwrap();
  assert!(!snapshot.withdrawal_eligible);
  let err = ledger.settle(user.id).await.unwrap_err();
  assert!(matches!(err, CoreError::WithdrawalNotEligible));
  assert_eq!(ledger.read_due(user.id).await.unwrap().total, 1_000);

  ledger.set_due_status(user.id, DueStatus::Active).await.unwrap();
  let settled = ledger.settle(user.id).await.unwrap();
  assert_eq!((settled.direct, settled.stage2, settled.stage3), (700, 300, 0));
  assert_eq!(settled.total, 1_000);
  assert_eq!(settled.user_id, user.id);
  assert_eq!(ledger.read_due(user.id).await.unwrap().total, 0);

  // Accrual resumes from zero after settlement.
  let after = ledger.credit(user.id, Tier::Stage3, 50).await.unwrap();
  assert_eq!(after.accrual.stage3, 50);
}

#[tokio::test]
#[serial]
async fn settlements_leave_a_payout_history() {
  let h = harness();
  let user = h.onboard("Paid Member", "paid@example.com", None).await;
  let other = h.onboard("Other Member", "other@example.com", None).await;
  let ledger = h.service.ledger();
  assert!(ledger.payouts(user.id).await.unwrap().is_empty());

  ledger.credit(user.id, Tier::Direct, 400).await.unwrap();
  let first = ledger.settle(user.id).await.unwrap();
  ledger.credit(user.id, Tier::Stage2, 90).await.unwrap();
  ledger.credit(user.id, Tier::Stage3, 10).await.unwrap();
  let second = ledger.settle(user.id).await.unwrap();

  let history = ledger.payouts(user.id).await.unwrap();
  assert_eq!(history, vec![second, first]);
  assert_eq!((second.direct, second.stage2, second.stage3, second.total), (0, 90, 10, 100));
  assert!(second.settled_at >= first.settled_at);
  assert_ne!(first.id, second.id);

  // A refused settlement records nothing.
  ledger.set_due_status(user.id, DueStatus::Inactive).await.unwrap();
  ledger.credit(user.id, Tier::Direct, 5).await.unwrap();
  assert!(ledger.settle(user.id).await.is_err());
  assert_eq!(ledger.payouts(user.id).await.unwrap().len(), 2);
  assert!(ledger.payouts(other.id).await.unwrap().is_empty());
}

// tests/accounts_tests.rs
mod common;
use common::*;
use chrono::Duration;
use referral_core::{AccountStatus, CoreConfig, CoreError, IdentityStore, ProfileUpdate, Role, UserStatus};
use serial_test::serial;
use std::sync::atomic::Ordering;

const PASSWORD: &str = "s3cret-passw0rd";

#[tokio::test]
#[serial]
async fn login_attempts_lock_at_five_and_saturate() {
  let h = harness();
  let user = h.onboard("Locked Person", "locked@example.com", None).await;
  let accounts = h.service.accounts();

  for expected in 1..=4 {
    let u = accounts.increment_login_attempts(user.id).await.unwrap();
    assert_eq!(u.login_attempts, expected);
    assert!(!u.account_locked);
  }
  let fifth = accounts.increment_login_attempts(user.id).await.unwrap();
  assert!(fifth.account_locked);
  let sixth = accounts.increment_login_attempts(user.id).await.unwrap();
  assert!(sixth.account_locked);
  assert_eq!(sixth.login_attempts, 5);

  let reset = accounts.reset_login_attempts(user.id).await.unwrap();
  assert_eq!(reset.login_attempts, 0);
  assert!(!reset.account_locked);
  assert_eq!(reset.last_login, Some(h.clock_now()));
}

#[tokio::test]
#[serial]
async fn login_records_failures_and_resets_on_success() {
  let h = harness();
  let user = h.onboard("Login Person", "login@example.com", None).await;
  let accounts = h.service.accounts();

  assert!(matches!(
    accounts.login("login@example.com", "wrong-password").await,
    Err(CoreError::InvalidCredentials)
  ));
  assert!(matches!(
    accounts.login("missing@example.com", PASSWORD).await,
    Err(CoreError::InvalidCredentials)
  ));
  assert_eq!(h.user(user.id).await.login_attempts, 1);

  let logged_in = accounts.login("LOGIN@example.com", PASSWORD).await.unwrap();
  assert_eq!(logged_in.login_attempts, 0);
  assert!(logged_in.last_login.is_some());
}

#[tokio::test]
#[serial]
async fn lockout_is_recorded_but_only_enforced_when_configured() {
  for enforce in [false, true] {
    let h = harness_with(CoreConfig::default().with_enforced_lockout(enforce));
    h.onboard("Lock Person", "lock@example.com", None).await;
    for _ in 0..5 {
      let _ = h.service.accounts().login("lock@example.com", "bad-password").await;
    }
    let result = h.service.accounts().login("lock@example.com", PASSWORD).await;
    if enforce {
      assert!(matches!(result, Err(CoreError::AccountLocked)));
    } else {
      assert!(!result.unwrap().account_locked);
    }
  }
}

#[tokio::test]
#[serial]
async fn roles_and_statuses_are_closed_sets() {
  let h = harness();
  let user = h.onboard("Admin Candidate", "candidate@example.com", None).await;
  let accounts = h.service.accounts();

  assert_eq!(accounts.set_role(user.id, "admin").await.unwrap().role, Role::Admin);
  assert!(matches!(accounts.set_role(user.id, "root").await, Err(CoreError::InvalidRole(r)) if r == "root"));
  assert_eq!(accounts.set_status(user.id, "inactive").await.unwrap().status, UserStatus::Inactive);
  assert!(matches!(accounts.set_status(user.id, "banned").await, Err(CoreError::InvalidStatus(_))));
  assert_eq!(
    accounts.set_account_status(user.id, "Trader").await.unwrap().account_status,
    AccountStatus::Trader
  );
  assert!(matches!(
    accounts.set_role(uuid::Uuid::new_v4(), "user").await,
    Err(CoreError::UserNotFound(_))
  ));
  assert_eq!(h.user(user.id).await.role, Role::Admin);
}

#[tokio::test]
#[serial]
async fn profile_updates_keep_emails_unique() {
  let h = harness();
  let first = h.onboard("First Person", "first@example.com", None).await;
  h.onboard("Second Person", "second@example.com", None).await;
  let accounts = h.service.accounts();

  let err = accounts
    .update_profile(
      first.id,
      ProfileUpdate {
        email: Some("SECOND@example.com".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::DuplicateEmail));

  let profile = accounts
    .update_profile(
      first.id,
      ProfileUpdate {
        name: Some("Renamed Person".to_string()),
        email: Some("renamed@example.com".to_string()),
        phone: Some("+44 7700 900123".to_string()),
      },
    )
    .await
    .unwrap();
  assert_eq!(profile.name, "Renamed Person");
  assert_eq!(profile.phone.as_deref(), Some("+447700900123"));
  assert!(h.store.find_by_email("first@example.com").await.unwrap().is_none());
  assert!(h.store.find_by_email("renamed@example.com").await.unwrap().is_some());
  assert!(h.store.find_by_phone("+447700900123").await.unwrap().is_some());

  let err = accounts
    .update_profile(
      first.id,
      ProfileUpdate {
        email: Some("bad<>@example.com".to_string()),
        name: Some("   ".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(m) if m == "Please enter a valid email address."));
}

#[tokio::test]
#[serial]
async fn change_password_requires_the_current_one() {
  let h = harness();
  let user = h.onboard("Careful Person", "careful@example.com", None).await;
  let accounts = h.service.accounts();

  assert!(matches!(
    accounts.change_password(user.id, "not-it", "new-password-1").await,
    Err(CoreError::InvalidCredentials)
  ));
  assert!(matches!(
    accounts.change_password(user.id, PASSWORD, "short").await,
    Err(CoreError::Validation(_))
  ));
  accounts.change_password(user.id, PASSWORD, "new-password-1").await.unwrap();
  assert!(accounts.login("careful@example.com", "new-password-1").await.is_ok());
}

#[tokio::test]
#[serial]
async fn password_reset_round_trip_and_expiry() {
  let h = harness();
  h.onboard("Forgetful Person", "forgetful@example.com", None).await;
  let accounts = h.service.accounts();

  let ticket = accounts.request_password_reset("forgetful@example.com").await.unwrap();
  assert_eq!(ticket.expires_at, h.clock_now() + Duration::minutes(15));
  let token = h.notifier.last_reset_token("forgetful@example.com").unwrap();

  assert!(matches!(
    accounts.reset_password(&token, "brand-new-pass", "different-pass").await,
    Err(CoreError::Validation(_))
  ));
  accounts.reset_password(&token, "brand-new-pass", "brand-new-pass").await.unwrap();
  assert!(accounts.login("forgetful@example.com", "brand-new-pass").await.is_ok());
  // Tokens are single use.
  assert!(matches!(
    accounts.reset_password(&token, "another-pass-1", "another-pass-1").await,
    Err(CoreError::InvalidResetToken)
  ));

  accounts.request_password_reset("forgetful@example.com").await.unwrap();
  let late_token = h.notifier.last_reset_token("forgetful@example.com").unwrap();
  h.clock.advance(Duration::minutes(15));
  assert!(matches!(
    accounts.reset_password(&late_token, "too-late-pass", "too-late-pass").await,
    Err(CoreError::InvalidResetToken)
  ));
}

#[tokio::test]
#[serial]
async fn failed_reset_mail_clears_the_token() {
  let h = harness();
  let user = h.onboard("Unreachable Person", "unreachable@example.com", None).await;
  h.notifier.fail_reset.store(true, Ordering::SeqCst);

  let err = h.service.accounts().request_password_reset("unreachable@example.com").await.unwrap_err();
  assert!(matches!(err, CoreError::Dependency { .. }));
  assert!(h.user(user.id).await.reset_token.is_none());

  assert!(matches!(
    h.service.accounts().request_password_reset("ghost@example.com").await,
    Err(CoreError::UserNotFound(_))
  ));
}

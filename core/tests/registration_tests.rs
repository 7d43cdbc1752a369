// tests/registration_tests.rs
mod common;
use common::*;
use referral_core::{CoreConfig, CoreError, IdentityStore, NotificationPolicy, RegistrationInput};
use serial_test::serial;
use std::sync::atomic::Ordering;

#[tokio::test]
#[serial]
async fn registration_stages_record_without_touching_the_store() {
  let h = harness();
  let ticket = h.service.register(input("Alice Able", "Alice@Example.com ", None)).await.unwrap();

  assert_eq!(ticket.email, "alice@example.com");
  assert!(h.store.is_empty());
  let entry = h.service.pending().get("alice@example.com").expect("pending entry");
  assert_eq!(entry.record.id, ticket.pending_id);
  assert_eq!(entry.expires_at - entry.issued_at, chrono::Duration::minutes(10));
  assert_eq!(entry.otp.len(), 6);
  assert!(entry.record.password_hash.starts_with("$argon2"));

  assert_eq!(h.notifier.last_otp("alice@example.com"), Some(entry.otp.clone()));
  assert_eq!(h.notifier.welcome.lock().len(), 1);
  let alerts = h.notifier.alerts.lock();
  assert_eq!(alerts.len(), 1);
  assert_eq!(alerts[0].referral_code, entry.record.referral_code);
}

#[tokio::test]
#[serial]
async fn registration_without_sponsor_mutates_no_ancestor() {
  let h = harness();
  let existing = h.onboard("Existing One", "existing@example.com", None).await;
  let member = h.onboard("Fresh Member", "fresh@example.com", None).await;

  assert!(member.sponsor_id.is_none());
  assert!(member.direct_referrals.is_empty());
  assert!(member.stage2_referrals.is_empty());
  assert!(member.stage3_referrals.is_empty());

  let existing_after = h.user(existing.id).await;
  assert!(existing_after.direct_referrals.is_empty());
  assert_eq!(existing_after.updated_at, existing.updated_at);
}

#[tokio::test]
#[serial]
async fn re_registration_overwrites_pending_entry() {
  let h = harness();
  h.codes.queue_otp("111111");
  h.codes.queue_otp("222222");
  h.service.register(input("Repeat Person", "repeat@example.com", None)).await.unwrap();
  h.service.register(input("Repeat Person", "repeat@example.com", None)).await.unwrap();

  assert_eq!(h.service.pending().len(), 1);
  let err = h.service.verify("repeat@example.com", "111111").await.unwrap_err();
  assert!(matches!(err, CoreError::OtpMismatch));
  let verified = h.service.verify("repeat@example.com", "222222").await.unwrap();
  assert_eq!(h.store.len(), 1);
  assert_eq!(h.user(verified.user_id).await.email, "repeat@example.com");
}

#[tokio::test]
#[serial]
async fn duplicate_email_and_phone_are_conflicts() {
  let h = harness();
  let mut with_phone = input("Phone Owner", "owner@example.com", None);
  with_phone.phone = Some("+1 555 010 0200".to_string());
  h.service.register(with_phone).await.unwrap();
  let otp = h.notifier.last_otp("owner@example.com").unwrap();
  let owner = h.service.verify("owner@example.com", &otp).await.unwrap();
  assert_eq!(h.user(owner.user_id).await.phone.as_deref(), Some("+15550100200"));

  let err = h.service.register(input("Other Person", "OWNER@example.com", None)).await.unwrap_err();
  assert!(matches!(err, CoreError::DuplicateEmail));

  let mut same_phone = input("Other Person", "other@example.com", None);
  same_phone.phone = Some("+15550100200".to_string());
  let err = h.service.register(same_phone).await.unwrap_err();
  assert!(matches!(err, CoreError::DuplicatePhone));
  assert!(h.service.pending().is_empty());
}

#[tokio::test]
#[serial]
async fn unknown_sponsor_code_aborts_registration() {
  let h = harness();
  let err = h
    .service
    .register(input("Lost Referral", "lost@example.com", Some("nope1234")))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidReferralCode(code) if code == "nope1234"));
  assert!(h.service.pending().is_empty());
  assert!(h.notifier.otps.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn validation_messages_name_the_failing_rule() {
  let h = harness();
  let err = h
    .service
    .register(input("Valid Name", "a<>@example.com", None))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(m) if m == "Please enter a valid email address."));

  // Whitespace is trimmed before the length rule applies
  let err = h.service.register(input("  Bob  ", "bob@example.com", None)).await.unwrap_err();
  assert!(matches!(err, CoreError::Validation(m) if m.starts_with("Name should have")));

  let ticket = h
    .service
    .register(RegistrationInput {
      phone: Some(" +44 20 7946 0958 ".to_string()),
      ..input("  Spaced Name ", " Spaced@Example.com ", None)
    })
    .await
    .unwrap();
  assert_eq!(ticket.email, "spaced@example.com");
}

#[tokio::test]
#[serial]
async fn invalid_input_is_rejected_before_any_side_effect() {
  let h = harness();
  let cases = vec![
    input("Valid Name", "not-an-email", None),
    input("Valid Name", "a<>@example.com", None),
    input("Bob", "bob@example.com", None),
    RegistrationInput {
      password: "short".to_string(),
      ..input("Valid Name", "valid@example.com", None)
    },
    RegistrationInput {
      phone: Some("12-34".to_string()),
      ..input("Valid Name", "valid@example.com", None)
    },
    input("", "", None),
  ];

  for case in cases {
    let err = h.service.register(case).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)), "unexpected {:?}", err);
  }
  assert!(h.service.pending().is_empty());
  assert!(h.notifier.otps.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn colliding_referral_codes_are_regenerated() {
  let h = harness();
  h.codes.queue_referral_code("aaaa1111");
  let first = h.onboard("First Member", "first@example.com", None).await;
  assert_eq!(first.referral_code, "aaaa1111");

  h.codes.queue_referral_code("aaaa1111");
  h.codes.queue_referral_code("bbbb2222");
  h.service.register(input("Second Member", "second@example.com", None)).await.unwrap();
  let entry = h.service.pending().get("second@example.com").unwrap();
  assert_eq!(entry.record.referral_code, "bbbb2222");
}

#[tokio::test]
#[serial]
async fn exhausted_referral_code_attempts_fail_with_duplicate() {
  let config = CoreConfig {
    referral_code_attempts: 2,
    ..CoreConfig::default()
  };
  let h = harness_with(config);
  h.codes.queue_referral_code("cccc3333");
  h.onboard("First Member", "first@example.com", None).await;

  h.codes.queue_referral_code("cccc3333");
  h.codes.queue_referral_code("cccc3333");
  let err = h.service.register(input("Second Member", "second@example.com", None)).await.unwrap_err();
  assert!(matches!(err, CoreError::DuplicateReferralCode));
  assert!(h.service.pending().get("second@example.com").is_none());
}

#[tokio::test]
#[serial]
async fn pending_codes_are_not_handed_out_twice() {
  let h = harness();
  h.codes.queue_referral_code("dddd4444");
  h.service.register(input("Pending One", "one@example.com", None)).await.unwrap();

  h.codes.queue_referral_code("dddd4444");
  h.codes.queue_referral_code("eeee5555");
  h.service.register(input("Pending Two", "two@example.com", None)).await.unwrap();
  assert_eq!(h.service.pending().get("two@example.com").unwrap().record.referral_code, "eeee5555");
}

#[tokio::test]
#[serial]
async fn strict_policy_fails_and_withdraws_pending_entry() {
  let h = harness();
  h.notifier.fail_admin.store(true, Ordering::SeqCst);

  let err = h.service.register(input("Strict Person", "strict@example.com", None)).await.unwrap_err();
  assert!(matches!(err, CoreError::Dependency { .. }));
  assert!(err.is_transient());
  assert!(h.service.pending().get("strict@example.com").is_none());
  // The OTP went out before the alert failed, but it can no longer be used.
  let otp = h.notifier.last_otp("strict@example.com").unwrap();
  assert!(matches!(
    h.service.verify("strict@example.com", &otp).await,
    Err(CoreError::RegistrationNotFound)
  ));
}

#[tokio::test]
#[serial]
async fn strict_policy_document_failure_stops_before_staging() {
  let h = harness();
  h.documents.fail.store(true, Ordering::SeqCst);

  let err = h.service.register(input("Strict Person", "strict@example.com", None)).await.unwrap_err();
  assert!(matches!(err, CoreError::Dependency { service: "document generator", .. }));
  assert!(h.service.pending().is_empty());
  assert!(h.notifier.otps.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn best_effort_policy_tolerates_courtesy_failures() {
  let h = harness_with(CoreConfig::default().with_notification_policy(NotificationPolicy::BestEffort));
  h.documents.fail.store(true, Ordering::SeqCst);
  h.notifier.fail_admin.store(true, Ordering::SeqCst);

  let ticket = h.service.register(input("Relaxed Person", "relaxed@example.com", None)).await.unwrap();
  assert!(h.service.pending().get("relaxed@example.com").is_some());
  assert!(h.notifier.welcome.lock().is_empty());
  assert!(h.notifier.alerts.lock().is_empty());

  let otp = h.notifier.last_otp("relaxed@example.com").unwrap();
  let verified = h.service.verify("relaxed@example.com", &otp).await.unwrap();
  assert_eq!(verified.user_id, ticket.pending_id);
}

#[tokio::test]
#[serial]
async fn otp_delivery_failure_is_always_fatal() {
  let h = harness_with(CoreConfig::default().with_notification_policy(NotificationPolicy::BestEffort));
  h.notifier.fail_otp.store(true, Ordering::SeqCst);

  let err = h.service.register(input("Silent Person", "silent@example.com", None)).await.unwrap_err();
  assert_eq!(err.kind(), "dependency");
  assert!(h.service.pending().is_empty());
}

#[tokio::test]
#[serial]
async fn full_cache_rejects_until_entries_expire() {
  let h = harness_with(CoreConfig::default().with_pending_capacity(1));
  h.service.register(input("Early Bird", "early@example.com", None)).await.unwrap();

  let err = h.service.register(input("Late Comer", "late@example.com", None)).await.unwrap_err();
  assert!(matches!(err, CoreError::PendingCapacity));
  // Same email still fits: it replaces its own entry.
  h.service.register(input("Early Bird", "early@example.com", None)).await.unwrap();

  h.clock.advance(chrono::Duration::minutes(11));
  h.service.register(input("Late Comer", "late@example.com", None)).await.unwrap();
  assert_eq!(h.service.pending().len(), 1);
  assert!(h.service.pending().get("early@example.com").is_none());
  assert!(h.store.find_by_email("early@example.com").await.unwrap().is_none());
}

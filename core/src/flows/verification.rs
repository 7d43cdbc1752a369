// core/src/flows/verification.rs

//! Verification: consume the pending entry with its OTP, plan the referral
//! links and promote the member in one store transaction.

use super::contexts::{VerificationCtxData, VerifiedMember};
use super::FlowDeps;
use crate::error::{CoreError, CoreResult};
use crate::models::{AccountStatus, DueStatus, IncentiveAccrual, User, UserStatus};
use crate::pending::PendingEntry;
use crate::pipeline::{Pipeline, StepContext, StepControl};
use crate::referral::ReferralLink;
use crate::validate::normalize_email;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

pub type VerificationPipeline = Pipeline<VerificationCtxData, CoreError>;

/// The user row a verified pending entry turns into.
fn member_from(entry: &PendingEntry, sponsor_id: Option<uuid::Uuid>, now: DateTime<Utc>) -> User {
  let record = &entry.record;
  User {
    id: record.id,
    name: record.name.clone(),
    email: record.email.clone(),
    phone: record.phone.clone(),
    password_hash: record.password_hash.clone(),
    role: record.role,
    status: UserStatus::Active,
    referral_code: record.referral_code.clone(),
    sponsor_id,
    direct_referrals: Vec::new(),
    stage2_referrals: Vec::new(),
    stage3_referrals: Vec::new(),
    incentive: IncentiveAccrual::default(),
    company_profit_due_status: DueStatus::Active,
    email_verified: true,
    account_status: AccountStatus::Pending,
    login_attempts: 0,
    account_locked: false,
    reset_token: None,
    last_login: None,
    created_at: now,
    updated_at: now,
  }
}

pub fn build_verification_pipeline() -> VerificationPipeline {
  let mut p = Pipeline::<VerificationCtxData, CoreError>::new(
    "verification",
    &[
      ("validate_input", false),
      ("consume_otp", false),
      ("plan_referral_links", false),
      ("promote_member", false),
    ],
  );

  p.skip_if("plan_referral_links", |data: &VerificationCtxData| !data.has_sponsor());

  p.on("validate_input", |ctx: StepContext<VerificationCtxData>| async move {
    let mut guard = ctx.write();
    if guard.email.trim().is_empty() || guard.otp.is_empty() {
      return Err(CoreError::Validation("Please provide email and OTP.".to_string()));
    }
    guard.email = normalize_email(&guard.email);
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("consume_otp", |ctx: StepContext<VerificationCtxData>| async move {
    let mut guard = ctx.write();
    let entry = guard.deps.pending.take_verified(&guard.email, &guard.otp)?;
    debug!(pending_id = %entry.record.id, "OTP accepted, pending entry consumed.");
    guard.entry = Some(entry);
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("plan_referral_links", |ctx: StepContext<VerificationCtxData>| async move {
    let (graph, member_id, code) = {
      let guard = ctx.read();
      let entry = guard
        .entry
        .as_ref()
        .ok_or_else(|| CoreError::Internal("No consumed entry to plan links for".to_string()))?;
      (
        guard.deps.graph.clone(),
        entry.record.id,
        entry.record.sponsor_code.clone().unwrap_or_default(),
      )
    };

    // The sponsor is resolved again: the graph may have grown since registration.
    let plan = graph.plan(member_id, &code).await?;
    ctx.write().plan = Some(plan);
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("promote_member", |ctx: StepContext<VerificationCtxData>| async move {
    let (deps, entry, mut plan) = {
      let guard = ctx.read();
      let entry = guard
        .entry
        .clone()
        .ok_or_else(|| CoreError::Internal("No consumed entry to promote".to_string()))?;
      (guard.deps.clone(), entry, guard.plan.clone())
    };

    let mut member = member_from(&entry, plan.as_ref().map(|p| p.sponsor_id), deps.clock.now());
    let mut attempts = 1;
    let promoted = loop {
      match deps.store.promote(member.clone(), plan.as_mut()).await {
        Ok(user) => break user,
        Err(CoreError::DuplicateReferralCode) if attempts < deps.config.referral_code_attempts => {
          attempts += 1;
          member.referral_code = deps.codes.referral_code();
          warn!(user_id = %member.id, attempts, "Referral code taken at promotion, regenerated.");
        }
        Err(e) => return Err(e),
      }
    };

    // The store settled the plan against locked rows; keep what it wrote.
    {
      let mut guard = ctx.write();
      guard.plan = plan;
      guard.promoted = Some(promoted);
    }
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p
}

/// Runs the pipeline. If promotion fails for a transient reason the consumed
/// entry goes back into the pending cache so the member can retry.
#[instrument(name = "flow::verify", skip(pipeline, deps, otp))]
pub async fn run_verification(
  pipeline: &VerificationPipeline,
  deps: FlowDeps,
  email: &str,
  otp: &str,
) -> CoreResult<VerifiedMember> {
  let pending = deps.pending.clone();
  let ctx = StepContext::new(VerificationCtxData::new(deps, email, otp));

  if let Err(e) = pipeline.run(ctx.clone()).await {
    let entry = ctx.write().entry.take();
    if let Some(entry) = entry {
      if e.is_transient() && pending.restore(entry) {
        warn!(error = %e, "Promotion failed, pending registration restored.");
      }
    }
    return Err(e);
  }

  let guard = ctx.read();
  let user = guard
    .promoted
    .as_ref()
    .ok_or_else(|| CoreError::Internal("Verification finished without a promoted member".to_string()))?;
  info!(user_id = %user.id, linked = guard.plan.is_some(), "Registration verified and member promoted.");
  Ok(VerifiedMember {
    user_id: user.id,
    referral_code: user.referral_code.clone(),
    link: guard.plan.as_ref().map(ReferralLink::from),
  })
}

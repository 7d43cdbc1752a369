// core/src/flows/registration.rs

//! Registration: validate, check uniqueness, resolve the sponsor, stage the
//! record in the pending cache and send the OTP.

use super::contexts::{PendingTicket, RegistrationCtxData, RegistrationInput};
use super::FlowDeps;
use crate::collab::{RegistrationAlert, WelcomeDetails};
use crate::config::NotificationPolicy;
use crate::error::{CoreError, CoreResult};
use crate::models::Role;
use crate::password::hash_password;
use crate::pending::{PendingEntry, PendingRegistration};
use crate::pipeline::{Pipeline, StepContext, StepControl};
use crate::validate::password_length;
use tracing::{debug, event, info, instrument, warn, Level};
use uuid::Uuid;
use validator::Validate;

pub type RegistrationPipeline = Pipeline<RegistrationCtxData, CoreError>;

/// Under `BestEffort`, a failed courtesy step is logged and the flow goes on.
fn tolerate(policy: NotificationPolicy, step: &'static str, err: CoreError) -> CoreResult<StepControl> {
  match policy {
    NotificationPolicy::Strict => Err(err),
    NotificationPolicy::BestEffort => {
      warn!(step, error = %err, "Registration step failed, continuing under best-effort policy.");
      Ok(StepControl::Continue)
    }
  }
}

pub fn build_registration_pipeline() -> RegistrationPipeline {
  let mut p = Pipeline::<RegistrationCtxData, CoreError>::new(
    "registration",
    &[
      ("validate_input", false),
      ("check_existing_user", false),
      ("resolve_sponsor", false),
      ("build_pending_record", false),
      ("generate_welcome_document", false),
      ("stash_pending", false),
      ("send_welcome_document", false),
      ("send_otp", false),
      ("notify_admin", false),
    ],
  );

  p.skip_if("resolve_sponsor", |data: &RegistrationCtxData| data.sponsor_code.is_none());

  p.on("validate_input", |ctx: StepContext<RegistrationCtxData>| async move {
    let (input, min_len) = {
      let guard = ctx.read();
      (guard.input.clone(), guard.deps.config.min_password_length)
    };

    if input.name.trim().is_empty() || input.email.trim().is_empty() || input.password.is_empty() {
      return Err(CoreError::Validation(
        "Missing required fields: name, email, and password".to_string(),
      ));
    }
    let input = input.normalized();
    input.validate()?;
    password_length(&input.password, min_len)?;
    let RegistrationInput {
      name,
      email,
      phone,
      referral_code: sponsor_code,
      ..
    } = input;

    event!(Level::DEBUG, %email, has_sponsor = sponsor_code.is_some(), "Registration input validated.");
    {
      let mut guard = ctx.write();
      guard.name = name;
      guard.email = email;
      guard.phone = phone;
      guard.sponsor_code = sponsor_code;
    }
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("check_existing_user", |ctx: StepContext<RegistrationCtxData>| async move {
    let (store, email, phone) = {
      let guard = ctx.read();
      (guard.deps.store.clone(), guard.email.clone(), guard.phone.clone())
    };

    if store.find_by_email(&email).await?.is_some() {
      warn!(%email, "Registration attempted with an existing email.");
      return Err(CoreError::DuplicateEmail);
    }
    if let Some(phone) = phone {
      if store.find_by_phone(&phone).await?.is_some() {
        warn!(%email, "Registration attempted with an existing phone number.");
        return Err(CoreError::DuplicatePhone);
      }
    }
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("resolve_sponsor", |ctx: StepContext<RegistrationCtxData>| async move {
    let (graph, code) = {
      let guard = ctx.read();
      (guard.deps.graph.clone(), guard.sponsor_code.clone().unwrap_or_default())
    };

    let sponsor = graph.resolve_sponsor(&code).await?;
    debug!(sponsor_id = %sponsor.id, "Sponsor resolved.");
    ctx.write().sponsor_id = Some(sponsor.id);
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("build_pending_record", |ctx: StepContext<RegistrationCtxData>| async move {
    let (deps, name, email, phone, password, sponsor_code, sponsor_id) = {
      let guard = ctx.read();
      (
        guard.deps.clone(),
        guard.name.clone(),
        guard.email.clone(),
        guard.phone.clone(),
        guard.input.password.clone(),
        guard.sponsor_code.clone(),
        guard.sponsor_id,
      )
    };

    let password_hash = hash_password(&password)?;
    let referral_code = unused_referral_code(&deps).await?;
    let now = deps.clock.now();
    let entry = PendingEntry {
      record: PendingRegistration {
        id: Uuid::new_v4(),
        name,
        email,
        phone,
        password_hash,
        role: Role::Referral,
        referral_code,
        sponsor_code,
        sponsor_id,
        created_at: now,
      },
      otp: deps.codes.otp(),
      issued_at: now,
      expires_at: now + deps.config.otp_ttl,
    };

    debug!(pending_id = %entry.record.id, "Pending registration record built.");
    ctx.write().entry = Some(entry);
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("generate_welcome_document", |ctx: StepContext<RegistrationCtxData>| async move {
    let (documents, policy, details) = {
      let guard = ctx.read();
      (
        guard.deps.documents.clone(),
        guard.deps.config.notification_policy,
        WelcomeDetails {
          name: guard.name.clone(),
          email: guard.email.clone(),
          phone: guard.phone.clone(),
        },
      )
    };

    match documents.welcome_document(&details).await {
      Ok(document) => {
        ctx.write().document = Some(document);
        Ok(StepControl::Continue)
      }
      Err(e) => tolerate(policy, "generate_welcome_document", CoreError::dependency("document generator", e)),
    }
  });

  p.on("stash_pending", |ctx: StepContext<RegistrationCtxData>| async move {
    let mut guard = ctx.write();
    let entry = guard
      .entry
      .clone()
      .ok_or_else(|| CoreError::Internal("Pending record missing before stash".to_string()))?;
    guard.deps.pending.put(entry)?;
    guard.stashed = true;
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("send_welcome_document", |ctx: StepContext<RegistrationCtxData>| async move {
    let (notifier, policy, email, document) = {
      let guard = ctx.read();
      (
        guard.deps.notifier.clone(),
        guard.deps.config.notification_policy,
        guard.email.clone(),
        guard.document.clone(),
      )
    };

    let Some(document) = document else {
      debug!("No welcome document to send.");
      return Ok(StepControl::Continue);
    };
    match notifier.send_welcome_document(&email, &document).await {
      Ok(()) => Ok(StepControl::Continue),
      Err(e) => tolerate(policy, "send_welcome_document", CoreError::dependency("notification", e)),
    }
  });

  p.on("send_otp", |ctx: StepContext<RegistrationCtxData>| async move {
    let (notifier, email, otp) = {
      let guard = ctx.read();
      let otp = guard.entry.as_ref().map(|e| e.otp.clone()).unwrap_or_default();
      (guard.deps.notifier.clone(), guard.email.clone(), otp)
    };

    notifier
      .send_otp(&email, &otp)
      .await
      .map_err(|e| CoreError::dependency("notification", e))?;
    info!(%email, "Registration OTP sent.");
    Ok::<_, CoreError>(StepControl::Continue)
  });

  p.on("notify_admin", |ctx: StepContext<RegistrationCtxData>| async move {
    let (notifier, policy, alert) = {
      let guard = ctx.read();
      let alert = RegistrationAlert {
        name: guard.name.clone(),
        email: guard.email.clone(),
        phone: guard.phone.clone(),
        referral_code: guard.entry.as_ref().map(|e| e.record.referral_code.clone()).unwrap_or_default(),
        sponsor_code: guard.sponsor_code.clone(),
      };
      (guard.deps.notifier.clone(), guard.deps.config.notification_policy, alert)
    };

    match notifier.send_admin_alert(&alert).await {
      Ok(()) => Ok(StepControl::Continue),
      Err(e) => tolerate(policy, "notify_admin", CoreError::dependency("notification", e)),
    }
  });

  p
}

/// A referral code not held by any stored user nor by another pending registration.
async fn unused_referral_code(deps: &FlowDeps) -> CoreResult<String> {
  for attempt in 1..=deps.config.referral_code_attempts {
    let candidate = deps.codes.referral_code();
    let taken = deps.pending.contains_referral_code(&candidate)
      || deps.store.find_by_referral_code(&candidate).await?.is_some();
    if !taken {
      return Ok(candidate);
    }
    debug!(attempt, "Generated referral code collided, retrying.");
  }
  warn!(attempts = deps.config.referral_code_attempts, "Could not generate an unused referral code.");
  Err(CoreError::DuplicateReferralCode)
}

/// Runs the pipeline and, when a step fails after the record was stashed,
/// removes that record from the pending cache again.
#[instrument(name = "flow::register", skip_all)]
pub async fn run_registration(
  pipeline: &RegistrationPipeline,
  deps: FlowDeps,
  input: RegistrationInput,
) -> CoreResult<PendingTicket> {
  let ctx = StepContext::new(RegistrationCtxData::new(deps, input));

  match pipeline.run(ctx.clone()).await {
    Ok(_) => {
      let ticket = ctx
        .read()
        .ticket()
        .ok_or_else(|| CoreError::Internal("Registration finished without a pending record".to_string()))?;
      info!(pending_id = %ticket.pending_id, email = %ticket.email, "Registration initiated.");
      Ok(ticket)
    }
    Err(e) => {
      let guard = ctx.read();
      if guard.stashed {
        if let Some(entry) = &guard.entry {
          if guard.deps.pending.remove_if(&entry.record.email, entry.record.id) {
            warn!(pending_id = %entry.record.id, "Pending registration withdrawn after a failed step.");
          }
        }
      }
      Err(e)
    }
  }
}

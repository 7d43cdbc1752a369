// core/src/pending.rs

//! Holding area for registrations that have not proven control of their email yet.
//!
//! At most one entry per (normalized) email. Entries expire `otp_ttl` after
//! issuance; expiry is checked on every verification and a background sweeper
//! purges whatever was never verified.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::models::Role;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The unverified shadow of a user, everything needed to promote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
  pub id: Uuid,
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub password_hash: String,
  pub role: Role,
  /// The code assigned to the new member.
  pub referral_code: String,
  /// The sponsor code supplied at registration, if any.
  pub sponsor_code: Option<String>,
  /// Sponsor resolved at registration time. Re-resolved at promotion.
  pub sponsor_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
  pub record: PendingRegistration,
  pub otp: String,
  pub issued_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl PendingEntry {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
  Verified,
  NotFound,
  OtpMismatch,
  OtpExpired,
}

impl VerifyOutcome {
  fn of(entry: Option<&PendingEntry>, otp: &str, now: DateTime<Utc>) -> Self {
    match entry {
      None => VerifyOutcome::NotFound,
      Some(entry) if entry.is_expired(now) => VerifyOutcome::OtpExpired,
      Some(entry) if entry.otp != otp => VerifyOutcome::OtpMismatch,
      Some(_) => VerifyOutcome::Verified,
    }
  }

  pub fn into_result(self) -> CoreResult<()> {
    match self {
      VerifyOutcome::Verified => Ok(()),
      VerifyOutcome::NotFound => Err(CoreError::RegistrationNotFound),
      VerifyOutcome::OtpMismatch => Err(CoreError::OtpMismatch),
      VerifyOutcome::OtpExpired => Err(CoreError::OtpExpired),
    }
  }
}

pub struct PendingRegistrations {
  entries: Mutex<HashMap<String, PendingEntry>>,
  clock: Arc<dyn Clock>,
  max_entries: usize,
}

impl std::fmt::Debug for PendingRegistrations {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PendingRegistrations")
      .field("len", &self.len())
      .field("max_entries", &self.max_entries)
      .finish()
  }
}

impl PendingRegistrations {
  pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      clock,
      max_entries,
    }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Stores `entry`, replacing any previous entry for the same email. When the
  /// cache is full, expired entries are evicted first.
  pub fn put(&self, entry: PendingEntry) -> CoreResult<()> {
    let mut entries = self.entries.lock();
    let email = entry.record.email.clone();

    if !entries.contains_key(&email) && entries.len() >= self.max_entries {
      let now = self.clock.now();
      let before = entries.len();
      entries.retain(|_, e| !e.is_expired(now));
      debug!(evicted = before - entries.len(), "Evicted expired pending registrations to make room.");
      if entries.len() >= self.max_entries {
        warn!(max_entries = self.max_entries, "Pending registration cache is full.");
        return Err(CoreError::PendingCapacity);
      }
    }

    if entries.insert(email.clone(), entry).is_some() {
      debug!(%email, "Replaced an earlier pending registration.");
    }
    Ok(())
  }

  pub fn get(&self, email: &str) -> Option<PendingEntry> {
    self.entries.lock().get(email).cloned()
  }

  /// Checks an OTP without consuming the entry.
  pub fn verify(&self, email: &str, otp: &str) -> VerifyOutcome {
    let now = self.clock.now();
    VerifyOutcome::of(self.entries.lock().get(email), otp, now)
  }

  /// Checks the OTP and, if it matches, removes the entry under the same lock so
  /// that only one caller can ever obtain it.
  pub fn take_verified(&self, email: &str, otp: &str) -> CoreResult<PendingEntry> {
    let now = self.clock.now();
    let mut entries = self.entries.lock();
    VerifyOutcome::of(entries.get(email), otp, now).into_result()?;
    entries.remove(email).ok_or(CoreError::RegistrationNotFound)
  }

  /// Puts a taken entry back after a failed promotion. A newer registration for
  /// the same email wins; returns whether the entry was restored.
  pub fn restore(&self, entry: PendingEntry) -> bool {
    let mut entries = self.entries.lock();
    if entries.contains_key(&entry.record.email) {
      return false;
    }
    entries.insert(entry.record.email.clone(), entry);
    true
  }

  /// Removes the entry for `email` only if it is still the registration `id`.
  pub fn remove_if(&self, email: &str, id: Uuid) -> bool {
    let mut entries = self.entries.lock();
    match entries.get(email) {
      Some(entry) if entry.record.id == id => entries.remove(email).is_some(),
      _ => false,
    }
  }

  pub fn contains_referral_code(&self, code: &str) -> bool {
    self.entries.lock().values().any(|e| e.record.referral_code == code)
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drops every expired entry; returns how many were removed.
  pub fn sweep_expired(&self) -> usize {
    let now = self.clock.now();
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    before - entries.len()
  }

  /// Runs [`sweep_expired`](Self::sweep_expired) every `interval` until the cache is dropped.
  pub fn spawn_sweeper(self: &Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
    let cache: Weak<Self> = Arc::downgrade(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(live) = cache.upgrade() else {
          debug!("Pending registration cache dropped, sweeper exiting.");
          break;
        };
        let removed = live.sweep_expired();
        if removed > 0 {
          info!(removed, remaining = live.len(), "Swept expired pending registrations.");
        }
      }
    })
  }
}

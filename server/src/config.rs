// server/src/config.rs

use crate::errors::{AppError, Result}; // Use AppError specific Result
use dotenvy::dotenv;
use referral_core::{CoreConfig, NotificationPolicy, PropagationMode};
use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,

  // Sessions
  pub jwt_secret: String,
  pub jwt_expire_days: i64,

  // Mock email config
  pub mock_email_sender: String,
  pub admin_email: String,

  /// Apply `migrations/` at start-up.
  pub run_migrations: bool,

  /// Tunables handed to the referral core.
  pub core: CoreConfig,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the configuration from any variable source; `from_env` passes the process environment.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get_env = |var_name: &str| {
      lookup(var_name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", var_name)))
    };
    let or_default = |var_name: &str, default: &str| lookup(var_name).unwrap_or_else(|| default.to_string());

    let server_host = or_default("SERVER_HOST", "127.0.0.1");
    let server_port = parse_var::<u16>("SERVER_PORT", &or_default("SERVER_PORT", "8080"))?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = lookup("APP_BASE_URL").unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));

    let jwt_secret = get_env("JWT_SECRET")?;
    if jwt_secret.len() < 16 {
      return Err(AppError::Config("JWT_SECRET must be at least 16 characters long".to_string()));
    }
    let jwt_expire_days = parse_var::<i64>("JWT_EXPIRE_DAYS", &or_default("JWT_EXPIRE_DAYS", "1"))?;
    if jwt_expire_days <= 0 {
      return Err(AppError::Config("JWT_EXPIRE_DAYS must be positive".to_string()));
    }

    let mock_email_sender = or_default("MOCK_EMAIL_SENDER", "noreply@example.com");
    let admin_email = or_default("ADMIN_EMAIL", "admin@example.com");
    let run_migrations = parse_var::<bool>("RUN_MIGRATIONS", &or_default("RUN_MIGRATIONS", "true"))?;

    let defaults = CoreConfig::default();
    let otp_ttl_secs = parse_var::<i64>(
      "OTP_TTL_SECS",
      &or_default("OTP_TTL_SECS", &defaults.otp_ttl.num_seconds().to_string()),
    )?;
    let pending_max_entries = parse_var::<usize>(
      "PENDING_MAX_ENTRIES",
      &or_default("PENDING_MAX_ENTRIES", &defaults.pending_max_entries.to_string()),
    )?;
    let pending_sweep_secs = parse_var::<u64>(
      "PENDING_SWEEP_SECS",
      &or_default("PENDING_SWEEP_SECS", &defaults.pending_sweep_interval.as_secs().to_string()),
    )?;
    let propagation = parse_var::<PropagationMode>(
      "REFERRAL_PROPAGATION",
      &or_default("REFERRAL_PROPAGATION", "sponsor-chain"),
    )?;
    let notification_policy =
      parse_var::<NotificationPolicy>("NOTIFICATION_POLICY", &or_default("NOTIFICATION_POLICY", "strict"))?;
    let enforce_lockout = parse_var::<bool>("ENFORCE_LOCKOUT", &or_default("ENFORCE_LOCKOUT", "false"))?;

    if otp_ttl_secs <= 0 || pending_sweep_secs == 0 {
      return Err(AppError::Config(
        "OTP_TTL_SECS and PENDING_SWEEP_SECS must be positive".to_string(),
      ));
    }

    let core = CoreConfig {
      otp_ttl: chrono::Duration::seconds(otp_ttl_secs),
      pending_sweep_interval: StdDuration::from_secs(pending_sweep_secs),
      ..defaults
    }
    .with_pending_capacity(pending_max_entries)
    .with_propagation(propagation)
    .with_notification_policy(notification_policy)
    .with_enforced_lockout(enforce_lockout);

    tracing::info!("Application configuration loaded successfully.");
    // Secrets (database url, jwt secret) are never logged.
    tracing::debug!(
      host = %server_host,
      port = server_port,
      propagation = ?core.propagation,
      policy = ?core.notification_policy,
      "Loaded config details"
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      jwt_secret,
      jwt_expire_days,
      mock_email_sender,
      admin_email,
      run_migrations,
      core,
    })
  }

  /// Session cookies are only marked `Secure` when the service is served over https.
  pub fn secure_cookies(&self) -> bool {
    self.app_base_url.starts_with("https://")
  }
}

fn parse_var<T>(var_name: &str, raw: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", var_name, raw, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name| map.get(name).cloned()
  }

  const REQUIRED: [(&str, &str); 2] = [
    ("DATABASE_URL", "postgres://localhost/referrals"),
    ("JWT_SECRET", "a-very-long-test-secret"),
  ];

  #[test]
  fn defaults_apply_when_only_required_vars_are_set() {
    let cfg = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.app_base_url, "http://127.0.0.1:8080");
    assert_eq!(cfg.jwt_expire_days, 1);
    assert!(cfg.run_migrations);
    assert!(!cfg.secure_cookies());
    assert_eq!(cfg.core.otp_ttl, chrono::Duration::minutes(10));
    assert_eq!(cfg.core.propagation, PropagationMode::SponsorChain);
    assert!(!cfg.core.enforce_lockout);
  }

  #[test]
  fn core_tunables_are_read_from_the_environment() {
    let mut vars = REQUIRED.to_vec();
    vars.extend([
      ("REFERRAL_PROPAGATION", "literal"),
      ("NOTIFICATION_POLICY", "best-effort"),
      ("ENFORCE_LOCKOUT", "true"),
      ("OTP_TTL_SECS", "300"),
      ("PENDING_MAX_ENTRIES", "42"),
      ("APP_BASE_URL", "https://referrals.example.com"),
    ]);
    let cfg = AppConfig::from_lookup(lookup(&vars)).unwrap();
    assert_eq!(cfg.core.propagation, PropagationMode::Literal);
    assert_eq!(cfg.core.notification_policy, NotificationPolicy::BestEffort);
    assert!(cfg.core.enforce_lockout);
    assert_eq!(cfg.core.otp_ttl, chrono::Duration::minutes(5));
    assert_eq!(cfg.core.pending_max_entries, 42);
    assert!(cfg.secure_cookies());
  }

  #[test]
  fn missing_or_malformed_values_are_config_errors() {
    assert!(matches!(
      AppConfig::from_lookup(lookup(&[("JWT_SECRET", "a-very-long-test-secret")])),
      Err(AppError::Config(m)) if m.contains("DATABASE_URL")
    ));
    let mut vars = REQUIRED.to_vec();
    vars.push(("SERVER_PORT", "eighty"));
    assert!(matches!(AppConfig::from_lookup(lookup(&vars)), Err(AppError::Config(_))));
    let mut vars = REQUIRED.to_vec();
    vars.push(("REFERRAL_PROPAGATION", "sideways"));
    assert!(matches!(AppConfig::from_lookup(lookup(&vars)), Err(AppError::Config(_))));
  }
}

// server/src/web/extract.rs

//! Request extractors resolving the session of the caller.

use crate::errors::AppError;
use crate::state::AppState;
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use referral_core::{CoreError, IdentityStore, Role, User};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "token";

/// The session token from the `token` cookie, or else from a `Bearer` header.
fn session_token(req: &HttpRequest) -> Option<String> {
  if let Some(cookie) = req.cookie(SESSION_COOKIE) {
    if !cookie.value().is_empty() {
      return Some(cookie.value().to_string());
    }
  }
  req
    .headers()
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
}

/// A caller holding a valid session for an existing account.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let token = session_token(req);
    Box::pin(async move {
      let state = state.ok_or_else(|| AppError::Internal("Application state is not configured".to_string()))?;
      let token = token.ok_or_else(|| AppError::Auth("Access denied. Please log in to continue.".to_string()))?;
      let claims = state.sessions.decode(&token)?;
      let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Auth("Invalid session. Please log in again.".to_string()))?;
      let user = state
        .service
        .store()
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
      debug!(user_id = %user.id, "Session resolved.");
      Ok(AuthenticatedUser(user))
    })
  }
}

/// An authenticated caller with the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
    let authenticated = AuthenticatedUser::from_request(req, payload);
    Box::pin(async move {
      let AuthenticatedUser(user) = authenticated.await?;
      if user.role != Role::Admin {
        return Err(AppError::Forbidden(format!("Role '{}' is not authorized.", user.role)));
      }
      Ok(AdminUser(user))
    })
  }
}

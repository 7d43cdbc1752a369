// server/src/web/handlers/auth_handlers.rs

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpResponse};
use referral_core::{RegistrationInput, SessionIssuer, SessionToken, User};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extract::SESSION_COOKIE;

// --- Request DTOs ---
#[derive(Deserialize, Debug)]
pub struct VerifyOtpPayload {
  pub email: String,
  pub otp: String,
}

#[derive(Deserialize)]
pub struct LoginPayload {
  pub email: String,
  pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct ForgotPasswordPayload {
  pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordPayload {
  pub password: String,
  pub confirm_password: String,
}

// --- Session cookie helpers ---

fn session_cookie(app_state: &AppState, session: &SessionToken) -> Cookie<'static> {
  let max_age = app_state.sessions.ttl().num_seconds();
  Cookie::build(SESSION_COOKIE, session.token.clone())
    .path("/")
    .http_only(true)
    .secure(app_state.config.secure_cookies())
    .same_site(SameSite::Strict)
    .max_age(CookieDuration::seconds(max_age))
    .finish()
}

/// Issues a session for `user` and returns it both as a cookie and in the body.
fn session_response(app_state: &AppState, user: &User, message: &str) -> Result<HttpResponse, AppError> {
  let session = app_state.sessions.issue(user)?;
  Ok(
    HttpResponse::Ok()
      .cookie(session_cookie(app_state, &session))
      .json(json!({
          "success": true,
          "message": message,
          "token": session.token,
          "expiresAt": session.expires_at,
          "user": user.profile(),
      })),
  )
}

// --- Handler Implementations ---

#[instrument(
    name = "handler::register",
    skip(app_state, req_payload),
    fields(req_email = %req_payload.email)
)]
pub async fn register_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<RegistrationInput>,
) -> Result<HttpResponse, AppError> {
  info!("Registration attempt for email: {}", req_payload.email);
  let ticket = app_state.service.register(req_payload.into_inner()).await?;
  info!(pending_id = %ticket.pending_id, "Registration staged, awaiting OTP verification.");

  Ok(HttpResponse::Created().json(json!({
      "success": true,
      "message": "Registration initiated. Please check your email for the OTP and the welcome document.",
      "pendingId": ticket.pending_id,
      "email": ticket.email,
      "otpExpiresAt": ticket.otp_expires_at,
  })))
}

#[instrument(
    name = "handler::verify_otp",
    skip(app_state, req_payload),
    fields(req_email = %req_payload.email)
)]
pub async fn verify_otp_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<VerifyOtpPayload>,
) -> Result<HttpResponse, AppError> {
  let member = app_state.service.verify(&req_payload.email, &req_payload.otp).await?;
  info!(user_id = %member.user_id, linked = member.link.is_some(), "Registration completed.");

  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "message": "OTP verified successfully. Registration complete!",
      "userId": member.user_id,
      "referralCode": member.referral_code,
      "link": member.link,
  })))
}

#[instrument(
    name = "handler::login",
    skip(app_state, req_payload),
    fields(req_email = %req_payload.email)
)]
pub async fn login_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, AppError> {
  let user = app_state
    .service
    .accounts()
    .login(&req_payload.email, &req_payload.password)
    .await?;
  info!(user_id = %user.id, "Login successful.");
  session_response(&app_state, &user, "Login successful!")
}

pub async fn logout_handler() -> HttpResponse {
  let mut removal = Cookie::build(SESSION_COOKIE, "").path("/").http_only(true).finish();
  removal.make_removal();
  HttpResponse::Ok().cookie(removal).json(json!({
      "success": true,
      "message": "Logged out successfully",
  }))
}

#[instrument(
    name = "handler::forgot_password",
    skip(app_state, req_payload),
    fields(req_email = %req_payload.email)
)]
pub async fn forgot_password_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ForgotPasswordPayload>,
) -> Result<HttpResponse, AppError> {
  let ticket = app_state
    .service
    .accounts()
    .request_password_reset(&req_payload.email)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "message": format!("Email sent to {} successfully", ticket.email),
  })))
}

#[instrument(name = "handler::reset_password", skip_all)]
pub async fn reset_password_handler(
  app_state: web::Data<AppState>,
  token: web::Path<String>,
  req_payload: web::Json<ResetPasswordPayload>,
) -> Result<HttpResponse, AppError> {
  let user = app_state
    .service
    .accounts()
    .reset_password(&token, &req_payload.password, &req_payload.confirm_password)
    .await?;
  info!(user_id = %user.id, "Password reset completed.");
  session_response(&app_state, &user, "Password change successful")
}

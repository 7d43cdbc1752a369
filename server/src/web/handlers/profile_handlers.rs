// server/src/web/handlers/profile_handlers.rs

use actix_web::{web, HttpResponse};
use referral_core::{CoreError, ProfileUpdate};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extract::AuthenticatedUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordPayload {
  pub current_password: String,
  pub new_password: String,
}

pub async fn me_handler(AuthenticatedUser(user): AuthenticatedUser) -> HttpResponse {
  HttpResponse::Ok().json(json!({ "success": true, "user": user.profile() }))
}

#[instrument(name = "handler::update_profile", skip_all, fields(user_id = %user.id))]
pub async fn update_profile_handler(
  app_state: web::Data<AppState>,
  AuthenticatedUser(user): AuthenticatedUser,
  req_payload: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
  let profile = app_state
    .service
    .accounts()
    .update_profile(user.id, req_payload.into_inner())
    .await?;
  info!("Profile updated.");
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "message": "Profile updated successfully",
      "user": profile,
  })))
}

#[instrument(name = "handler::update_password", skip_all, fields(user_id = %user.id))]
pub async fn update_password_handler(
  app_state: web::Data<AppState>,
  AuthenticatedUser(user): AuthenticatedUser,
  req_payload: web::Json<UpdatePasswordPayload>,
) -> Result<HttpResponse, AppError> {
  if req_payload.current_password.is_empty() || req_payload.new_password.is_empty() {
    return Err(AppError::Core(CoreError::Validation(
      "Please provide current and new passwords".to_string(),
    )));
  }
  app_state
    .service
    .accounts()
    .change_password(user.id, &req_payload.current_password, &req_payload.new_password)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "message": "Password updated successfully",
  })))
}

pub async fn team_handler(
  app_state: web::Data<AppState>,
  AuthenticatedUser(user): AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let team = app_state.service.graph().team(user.id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "size": team.size(), "team": team })))
}

pub async fn incentives_handler(
  app_state: web::Data<AppState>,
  AuthenticatedUser(user): AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let due = app_state.service.ledger().read_due(user.id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "incentives": due })))
}

pub async fn payouts_handler(
  app_state: web::Data<AppState>,
  AuthenticatedUser(user): AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payouts = app_state.service.ledger().payouts(user.id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "count": payouts.len(), "payouts": payouts })))
}

pub async fn ancestors_handler(
  app_state: web::Data<AppState>,
  AuthenticatedUser(user): AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let chain = app_state.service.graph().ancestors(user.id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "ancestors": chain })))
}

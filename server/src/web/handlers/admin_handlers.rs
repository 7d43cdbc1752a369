// server/src/web/handlers/admin_handlers.rs

//! Administrative operations. Every handler requires an `admin` session.

use actix_web::{web, HttpResponse};
use referral_core::{DueStatus, Tier};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extract::AdminUser;

#[derive(Deserialize, Debug)]
pub struct RolePayload {
  pub role: String,
}

#[derive(Deserialize, Debug)]
pub struct StatusPayload {
  pub status: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusPayload {
  pub account_status: String,
}

#[derive(Deserialize, Debug)]
pub struct CreditPayload {
  pub tier: Tier,
  /// Minor currency units.
  pub amount: i64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LinkPayload {
  pub member_id: Uuid,
  pub referral_code: String,
}

#[instrument(name = "handler::admin::set_role", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn set_role_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  user_id: web::Path<Uuid>,
  req_payload: web::Json<RolePayload>,
) -> Result<HttpResponse, AppError> {
  let profile = app_state.service.accounts().set_role(*user_id, &req_payload.role).await?;
  info!(user_id = %profile.id, role = %profile.role, "Role updated.");
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "message": "User role updated successfully",
      "user": profile,
  })))
}

#[instrument(name = "handler::admin::set_status", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn set_status_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  user_id: web::Path<Uuid>,
  req_payload: web::Json<StatusPayload>,
) -> Result<HttpResponse, AppError> {
  let profile = app_state
    .service
    .accounts()
    .set_status(*user_id, &req_payload.status)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "message": format!("User status updated to {}", profile.status),
      "user": profile,
  })))
}

#[instrument(name = "handler::admin::set_account_status", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn set_account_status_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  user_id: web::Path<Uuid>,
  req_payload: web::Json<AccountStatusPayload>,
) -> Result<HttpResponse, AppError> {
  let profile = app_state
    .service
    .accounts()
    .set_account_status(*user_id, &req_payload.account_status)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "user": profile })))
}

#[instrument(name = "handler::admin::credit", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn credit_incentive_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  user_id: web::Path<Uuid>,
  req_payload: web::Json<CreditPayload>,
) -> Result<HttpResponse, AppError> {
  let due = app_state
    .service
    .credit_incentive(*user_id, req_payload.tier, req_payload.amount)
    .await?;
  info!(user_id = %due.user_id, total = due.total, "Incentive credited.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "incentives": due })))
}

#[instrument(name = "handler::admin::settle", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn settle_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  user_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let payout = app_state.service.ledger().settle(*user_id).await?;
  info!(user_id = %user_id, payout_id = %payout.id, paid_out = payout.total, "Incentives settled.");
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "payout": payout,
      "total": payout.total,
  })))
}

#[instrument(name = "handler::admin::set_due_status", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn set_due_status_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  user_id: web::Path<Uuid>,
  req_payload: web::Json<StatusPayload>,
) -> Result<HttpResponse, AppError> {
  let status: DueStatus = req_payload.status.parse()?;
  let due = app_state.service.ledger().set_due_status(*user_id, status).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "incentives": due })))
}

#[instrument(name = "handler::admin::link_referral", skip(app_state, admin), fields(admin_id = %admin.0.id))]
pub async fn link_referral_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  req_payload: web::Json<LinkPayload>,
) -> Result<HttpResponse, AppError> {
  let link = app_state
    .service
    .link_referral(req_payload.member_id, &req_payload.referral_code)
    .await?;
  info!(member_id = %link.member_id, sponsor_id = %link.sponsor_id, "Referral linked.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "link": link })))
}

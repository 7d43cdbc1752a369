// server/src/web/routes.rs

use crate::web::handlers::{admin_handlers, auth_handlers, profile_handlers};
use actix_web::web;

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

// This function will be called in `main.rs` to configure services for the Actix App.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1") // Base path for API version 1
      .route("/health", web::get().to(health_check_handler))
      // Registration, sessions and password recovery
      .route("/register", web::post().to(auth_handlers::register_handler))
      .route("/verify-otp", web::post().to(auth_handlers::verify_otp_handler))
      .route("/login", web::post().to(auth_handlers::login_handler))
      .route("/logout", web::post().to(auth_handlers::logout_handler))
      .route("/password/forgot", web::post().to(auth_handlers::forgot_password_handler))
      .route("/password/reset/{token}", web::put().to(auth_handlers::reset_password_handler))
      // Self-service, session required
      .route("/me", web::get().to(profile_handlers::me_handler))
      .route("/me/team", web::get().to(profile_handlers::team_handler))
      .route("/me/incentives", web::get().to(profile_handlers::incentives_handler))
      .route("/me/payouts", web::get().to(profile_handlers::payouts_handler))
      .route("/me/ancestors", web::get().to(profile_handlers::ancestors_handler))
      .route("/update-profile", web::put().to(profile_handlers::update_profile_handler))
      .route("/update-password", web::put().to(profile_handlers::update_password_handler))
      // Admin, admin session required
      .route("/users/{id}/role", web::put().to(admin_handlers::set_role_handler))
      .service(
        web::scope("/admin")
          .route("/users/{id}/status", web::patch().to(admin_handlers::set_status_handler))
          .route(
            "/users/{id}/account-status",
            web::patch().to(admin_handlers::set_account_status_handler),
          )
          .route(
            "/users/{id}/incentives",
            web::post().to(admin_handlers::credit_incentive_handler),
          )
          .route("/users/{id}/settle", web::post().to(admin_handlers::settle_handler))
          .route("/users/{id}/due-status", web::patch().to(admin_handlers::set_due_status_handler))
          .route("/referrals/link", web::post().to(admin_handlers::link_referral_handler)),
      ),
  );
}

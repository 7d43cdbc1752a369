// server/src/main.rs

use actix_web::{web as actix_data, App, HttpServer}; // Renamed web to actix_data
use referral_server::db::{self, PgIdentityStore};
use referral_server::services::MockNotifier;
use referral_server::web::configure_app_routes;
use referral_server::{AppConfig, AppState};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan; // For span events in tracing

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  // Initialize tracing subscriber for logging
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO) // Default level
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE) // Log when spans close, showing duration
    .init();

  tracing::info!("Starting referral service...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
    }
  };

  let db_pool = match db::connect(&app_config).await {
    Ok(pool) => pool,
    Err(e) => {
      tracing::error!(error = %e, "Failed to prepare the database.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
  };

  let notifier = Arc::new(MockNotifier::new(
    app_config.mock_email_sender.clone(),
    app_config.admin_email.clone(),
    app_config.app_base_url.clone(),
  ));
  let store = Arc::new(PgIdentityStore::new(db_pool));
  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);

  let app_state = match AppState::new(app_config, store, notifier) {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to build the referral service.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
  };

  // Expired pending registrations are dropped in the background
  let sweeper = app_state.service.spawn_pending_sweeper();

  tracing::info!("Attempting to bind server to {}...", server_address);
  let result = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone())) // Share AppState with handlers
      .wrap(tracing_actix_web::TracingLogger::default()) // Actix middleware for tracing requests
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await;

  sweeper.abort();
  result
}

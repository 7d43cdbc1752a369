// server/src/lib.rs

//! HTTP surface of the referral service: actix-web routes, the PostgreSQL
//! identity store and the mock collaborators the core is wired with.

pub mod config;
pub mod db;
pub mod errors;
pub mod services;
pub mod state;
pub mod web;

pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use state::AppState;

// server/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod auth_handlers;
pub mod profile_handlers;

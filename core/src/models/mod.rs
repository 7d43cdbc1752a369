// core/src/models/mod.rs

//! Data structures of the identity store and the referral graph.

pub mod user;

pub use user::{
  AccountStatus, DueStatus, IncentiveAccrual, PayoutRecord, ResetToken, Role, Tier, User, UserProfile, UserStatus,
  UserSummary,
};

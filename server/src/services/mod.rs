// server/src/services/mod.rs

pub mod document_mock;
pub mod email_mock;
pub mod session;

pub use document_mock::MockDocuments;
pub use email_mock::{MockNotifier, SentEmailInfo};
pub use session::{JwtSessionIssuer, SessionClaims};

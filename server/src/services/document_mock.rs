// server/src/services/document_mock.rs

use async_trait::async_trait;
use referral_core::{Document, DocumentGenerator, WelcomeDetails};
use tracing::debug;

/// Renders the welcome document as plain text.
#[derive(Debug, Default, Clone)]
pub struct MockDocuments;

#[async_trait]
impl DocumentGenerator for MockDocuments {
  async fn welcome_document(&self, details: &WelcomeDetails) -> anyhow::Result<Document> {
    let content = format!(
      "Welcome, {}!\n\nThank you for registering.\n\nEmail: {}\nPhone: {}\n",
      details.name,
      details.email,
      details.phone.as_deref().unwrap_or("-"),
    );
    let slug: String = details
      .name
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
      .collect();
    debug!(email = %details.email, bytes = content.len(), "Welcome document rendered.");
    Ok(Document {
      file_name: format!("welcome-{}.txt", slug),
      content_type: "text/plain; charset=utf-8".to_string(),
      bytes: content.into_bytes(),
    })
  }
}

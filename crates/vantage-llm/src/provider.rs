//! Provider trait and structured request types.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A model backend that produces JSON text constrained by a schema.
///
/// Implementations return the raw text of the first candidate. JSON recovery
/// and validation happen in the gateway, outside the retry loop.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one generation request.
    ///
    /// # Errors
    /// Returns error if the provider fails, network issues occur, or the
    /// response envelope cannot be decoded.
    async fn generate(&self, request: &StructuredRequest) -> Result<String>;

    /// Get the unique identifier for this provider.
    fn provider_id(&self) -> &str;
}

/// An image sent inline with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    /// MIME type, e.g. `image/jpeg`
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl InlineImage {
    /// A base64-encoded JPEG.
    #[must_use]
    pub fn jpeg(data: impl Into<String>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data: data.into(),
        }
    }

    /// A base64-encoded PNG.
    #[must_use]
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            data: data.into(),
        }
    }
}

/// Request for schema-constrained JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRequest {
    /// System instruction text
    pub system_instruction: String,

    /// User content text
    pub content: String,

    /// Response schema the model must follow
    pub schema: serde_json::Value,

    /// Images placed before the text, in order
    pub images: Vec<InlineImage>,
}

impl StructuredRequest {
    /// Create a text-only request.
    #[must_use]
    pub fn new(
        system_instruction: impl Into<String>,
        content: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            content: content.into(),
            schema,
            images: Vec::new(),
        }
    }

    /// Attach an image.
    #[must_use]
    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.images.push(image);
        self
    }

    /// Keys the schema marks as required at the top level.
    #[must_use]
    pub fn required_keys(&self) -> Vec<&str> {
        self.schema
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|keys| keys.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default()
    }
}

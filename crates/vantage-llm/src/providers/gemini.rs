//! Google Gemini API provider implementation.

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, StructuredRequest};
use crate::providers::common::{build_http_client, transport_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use vantage_core::LlmConfig;

const PROVIDER: &str = "gemini";

/// Harm categories relaxed to `BLOCK_NONE`; audit content routinely quotes
/// arbitrary third-party pages.
const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Google Gemini API provider.
///
/// Calls `models/{model}:generateContent` with a JSON response schema and
/// inline image parts.
pub struct GeminiProvider {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
    max_output_tokens: u32,
    timeout_secs: u64,
}

impl GeminiProvider {
    /// Create a provider from configuration.
    ///
    /// # Errors
    /// Returns error if no API key is configured or the HTTP client cannot be
    /// created.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey {
                provider: PROVIDER.to_string(),
            })?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            client: build_http_client(Some(config.request_timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_output_tokens: config.max_output_tokens,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Convert internal request to Gemini API format.
    fn to_api_request(&self, request: &StructuredRequest) -> GeminiRequest {
        let mut parts: Vec<GeminiPart> = request
            .images
            .iter()
            .map(|image| GeminiPart {
                text: None,
                inline_data: Some(GeminiInlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                }),
            })
            .collect();
        parts.push(GeminiPart {
            text: Some(request.content.clone()),
            inline_data: None,
        });

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system_instruction.clone()),
                    inline_data: None,
                }],
            },
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: request.schema.clone(),
                max_output_tokens: self.max_output_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| GeminiSafetySetting {
                    category: (*category).to_string(),
                    threshold: "BLOCK_NONE".to_string(),
                })
                .collect(),
        }
    }
}

/// Pull the text out of a decoded response.
fn response_text(response: GeminiResponse) -> Result<String> {
    let block_reason = response.prompt_feedback.and_then(|f| f.block_reason);

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(LlmError::EmptyResponse {
            reason: block_reason.or_else(|| Some("no candidates".to_string())),
        });
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse {
            reason: candidate.finish_reason,
        });
    }
    Ok(text)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, request: &StructuredRequest) -> Result<String> {
        let api_request = self.to_api_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout_secs, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let decoded: GeminiResponse = response
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout_secs, &e))?;
        response_text(decoded)
    }

    fn provider_id(&self) -> &'static str {
        PROVIDER
    }
}

/// Prefer the structured `error.message` of an error body, keeping the
/// status name and any retry hint visible to the classifier.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(GeminiErrorBody { error }) => match error.status {
            Some(status) => format!("{status}: {}", error.message),
            None => error.message,
        },
        Err(_) => body.trim().to_string(),
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiContent,
    generation_config: GeminiGenerationConfig,
    safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GeminiSafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InlineImage;
    use serde_json::json;

    fn config() -> LlmConfig {
        LlmConfig {
            api_key: Some("test-key".to_string()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_provider_creation() {
        let provider = GeminiProvider::from_config(&config()).expect("create provider");
        assert_eq!(provider.provider_id(), "gemini");
        assert_eq!(provider.model, "gemini-2.5-flash");
        assert!(provider.endpoint().ends_with("/models/gemini-2.5-flash:generateContent"));
    }

    #[test]
    fn test_missing_api_key() {
        let result = GeminiProvider::from_config(&LlmConfig::default());
        assert!(matches!(result, Err(LlmError::MissingApiKey { .. })));

        let blank = LlmConfig {
            api_key: Some("  ".to_string()),
            ..LlmConfig::default()
        };
        assert!(GeminiProvider::from_config(&blank).is_err());
    }

    #[test]
    fn test_api_request_conversion() {
        let provider = GeminiProvider::from_config(&config()).expect("create provider");
        let request = StructuredRequest::new(
            "You are a UX auditor",
            "Audit this page",
            json!({"type": "OBJECT", "properties": {}}),
        )
        .with_image(InlineImage::jpeg("AAAA"));

        let body = serde_json::to_value(provider.to_api_request(&request)).expect("serialize");

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(
            body["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(body["contents"][0]["parts"][1]["text"], "Audit this page");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a UX auditor"
        );
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert_eq!(body["safetySettings"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                "finishReason": "STOP"
            }]
        }))
        .expect("decode");
        assert_eq!(response_text(response).expect("text"), "{\"a\":1}");
    }

    #[test]
    fn test_blocked_prompt_is_empty_response() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .expect("decode");
        let err = response_text(response).expect_err("blocked");
        assert_eq!(err.to_string(), "response text is empty (SAFETY)");
    }

    #[test]
    fn test_candidate_without_text() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }))
        .expect("decode");
        assert!(matches!(
            response_text(response),
            Err(LlmError::EmptyResponse { reason: Some(r) }) if r == "MAX_TOKENS"
        ));
    }

    #[test]
    fn test_error_message_keeps_status_and_hint() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded. Please retry in 12.5s.","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            error_message(body),
            "RESOURCE_EXHAUSTED: Quota exceeded. Please retry in 12.5s."
        );
        assert_eq!(error_message("upstream connect error"), "upstream connect error");
    }
}

//! Gemini AI provider implementation.
//!
//! Sends the rendered prompt to Gemini's `generateContent` endpoint with the
//! image attached as inline data (data URIs) or file data (remote URLs), and
//! asks for JSON conforming to the declared response schema.

use super::{FinishReason, ProviderError, ProviderResponse, VisionProvider};
use crate::models::MediaReference;
use crate::services::prompt::{Prompt, PromptPart};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            temperature: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Gemini vision provider.
pub struct GeminiVisionProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiVisionProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    /// Convert prompt parts to Gemini content parts, preserving order.
    fn prompt_to_parts(prompt: &Prompt) -> Vec<ContentPart> {
        prompt
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => ContentPart::Text { text: text.clone() },
                PromptPart::Media(MediaReference::Inline { mime_type, data }) => {
                    ContentPart::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.clone(),
                            data: data.clone(),
                        },
                    }
                }
                PromptPart::Media(MediaReference::Remote { mime_type, url }) => {
                    ContentPart::FileData {
                        file_data: FileData {
                            mime_type: mime_type.clone(),
                            file_uri: url.clone(),
                        },
                    }
                }
            })
            .collect()
    }

    /// Build generation config requesting schema-conformant JSON.
    fn build_generation_config(&self, output_schema: &Value) -> GenerationConfig {
        GenerationConfig {
            temperature: self.config.temperature,
            response_mime_type: "application/json".to_string(),
            response_schema: output_schema.clone(),
        }
    }
}

#[async_trait]
impl VisionProvider for GeminiVisionProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        output_schema: &Value,
    ) -> Result<ProviderResponse, ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: Self::prompt_to_parts(prompt),
            }],
            generation_config: Some(self.build_generation_config(output_schema)),
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.text_len(),
            media_count = prompt.media().count(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }
            if status == StatusCode::BAD_REQUEST {
                return Err(ProviderError::InvalidRequest(format!(
                    "Gemini rejected the request: {}",
                    error_text
                )));
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if let Some(reason) = api_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            tracing::warn!(block_reason = %reason, "Gemini blocked the prompt");
            return Err(ProviderError::ContentFiltered);
        }

        let candidate = api_response.candidates.first();

        let raw_reason = candidate.and_then(|c| c.finish_reason.as_deref());
        let finish_reason = map_finish_reason(raw_reason);

        if finish_reason == FinishReason::ContentFilter {
            tracing::warn!(
                finish_reason = raw_reason.unwrap_or_default(),
                "Gemini withheld the response"
            );
            return Err(ProviderError::ContentFiltered);
        }

        // Gemini may split the JSON across several text parts.
        let text: String = candidate
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ProviderResponse {
            output: parse_output(&text),
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        // Fetch the configured model to verify both key and model id
        let url = format!(
            "{}/models/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url().to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

/// Every reason Gemini uses to withhold or truncate a candidate for policy
/// reasons counts as a content filter.
fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY")
        | Some("IMAGE_SAFETY")
        | Some("PROHIBITED_CONTENT")
        | Some("BLOCKLIST")
        | Some("SPII")
        | Some("RECITATION") => FinishReason::ContentFilter,
        Some("OTHER") | Some("MALFORMED_FUNCTION_CALL") => FinishReason::Error,
        _ => FinishReason::Complete,
    }
}

/// Blank text is no output. Text that is not JSON is kept as a JSON string
/// so the response boundary rejects it with a type error.
fn parse_output(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Gemini returned text that is not valid JSON");
            Some(Value::String(trimmed.to_string()))
        }
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisRequest;
    use crate::services::prompt::render_prompt;
    use serde_json::json;

    #[test]
    fn inline_image_serializes_as_inline_data() {
        let prompt = render_prompt(&AnalysisRequest::new("data:image/png;base64,AAAA")).unwrap();
        let parts = serde_json::to_value(GeminiVisionProvider::prompt_to_parts(&prompt)).unwrap();

        assert!(parts[0]["text"].as_str().unwrap().contains("expert radiologist"));
        assert_eq!(
            parts[1],
            json!({ "inlineData": { "mimeType": "image/png", "data": "AAAA" } })
        );
    }

    #[test]
    fn remote_image_serializes_as_file_data() {
        let prompt = render_prompt(&AnalysisRequest::new("https://example.com/scan.jpeg")).unwrap();
        let parts = serde_json::to_value(GeminiVisionProvider::prompt_to_parts(&prompt)).unwrap();

        assert_eq!(
            parts[1],
            json!({ "fileData": { "mimeType": "image/jpeg", "fileUri": "https://example.com/scan.jpeg" } })
        );
    }

    #[test]
    fn parse_output_handles_blank_json_and_prose() {
        assert_eq!(parse_output("   "), None);
        assert_eq!(parse_output("null"), None);
        assert_eq!(parse_output("{\"a\":1}"), Some(json!({ "a": 1 })));
        assert_eq!(
            parse_output("The image looks fine."),
            Some(json!("The image looks fine."))
        );
    }

    #[test]
    fn policy_stops_are_content_filters() {
        let policy_stops = [
            "SAFETY",
            "IMAGE_SAFETY",
            "PROHIBITED_CONTENT",
            "BLOCKLIST",
            "SPII",
            "RECITATION",
        ];
        for reason in policy_stops {
            assert_eq!(
                map_finish_reason(Some(reason)),
                FinishReason::ContentFilter,
                "{}",
                reason
            );
        }
        assert_eq!(map_finish_reason(Some("STOP")), FinishReason::Complete);
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), FinishReason::Length);
        assert_eq!(map_finish_reason(None), FinishReason::Complete);
    }

    #[test]
    fn api_url_tolerates_trailing_slash() {
        let mut config = GeminiConfig::new("key", "gemini-2.0-flash");
        config.base_url = "http://localhost:9999/v1beta/".to_string();
        let provider = GeminiVisionProvider::new(config).unwrap();
        assert_eq!(
            provider.api_url("generateContent"),
            "http://localhost:9999/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}

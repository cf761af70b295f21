//! Google Gemini provider (`generateContent`).
//!
//! Gemini is asked for JSON through `responseMimeType`; the stage schema is
//! described in the system instruction, since Gemini's native response
//! schema supports only a subset of JSON Schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    factory::{check_base_url, ProviderFactory},
    http,
    secrets::{ApiCredential, CredentialSource},
    CompletionConfig, CompletionResponse, LlmProvider, ProviderError, StructuredRequest,
    TokenUsage,
};
use crate::config::ProviderSettings;

/// Environment variable name for Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "Gemini API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from settings, falling back to `GEMINI_API_KEY`.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_settings_or_env(
            settings.api_key.as_deref(),
            GEMINI_API_KEY_ENV,
            "Gemini API key",
        )?;

        Ok(Self {
            credential,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
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
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

fn text_content(role: Option<&str>, text: String) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part { text: Some(text) }],
    }
}

/// Gemini names the assistant role "model".
fn gemini_role(role: &str) -> &str {
    match role {
        "assistant" => "model",
        other => other,
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        request: &StructuredRequest,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let client = http::client()?;
        let (system, turns) = request.system_with_instruction();

        let body = GenerateRequest {
            system_instruction: text_content(None, system),
            contents: turns
                .into_iter()
                .map(|m| text_content(Some(gemini_role(&m.role)), m.content))
                .collect(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
                response_mime_type: "application/json",
            },
        };

        let response = client
            .post(format!("{}/models/{}:generateContent", self.base_url, config.model))
            .header("x-goog-api-key", self.credential.expose())
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, config.timeout))?;

        let body: GenerateResponse = http::read_json(response).await?;

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no candidates".to_string()))?;
        let content = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        let usage = body.usage_metadata.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            ..Default::default()
        });

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model_version.unwrap_or_else(|| config.model.clone()),
            stop_reason: candidate.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for creating Gemini providers from configuration.
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_settings(settings)?))
    }

    fn validate_settings(&self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(settings.api_key.as_deref(), GEMINI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Gemini API key required: set 'api_key' in config or {} env",
                GEMINI_API_KEY_ENV
            )));
        }
        check_base_url(settings)
    }

    fn default_model(&self) -> &'static str {
        "gemini-2.0-flash"
    }

    fn description(&self) -> &'static str {
        "Google Gemini generateContent with JSON output"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_role_is_renamed() {
        assert_eq!(gemini_role("assistant"), "model");
        assert_eq!(gemini_role("user"), "user");
    }

    #[test]
    fn test_request_uses_camel_case() {
        let body = GenerateRequest {
            system_instruction: text_content(None, "system".to_string()),
            contents: vec![text_content(Some("user"), "clause".to_string())],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 1024,
                response_mime_type: "application/json",
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "clause");
    }

    #[test]
    fn test_response_envelope_parses() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"clauses\": []}"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 900, "candidatesTokenCount": 12, "totalTokenCount": 912},
            "modelVersion": "gemini-2.0-flash"
        }"#;

        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.usage_metadata.unwrap().prompt_token_count, 900);
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let provider = GeminiProvider::new("gemini-secret-key");
        assert!(!format!("{:?}", provider).contains("gemini-secret-key"));
    }
}

//! OpenAI chat completions provider.
//!
//! Requests schema-constrained output through the `json_schema` response
//! format, so the stage contract travels with every call.

use async_trait::async_trait;
use legaldoc_core::schema::json_schema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{
    factory::{check_base_url, ProviderFactory},
    http,
    secrets::{ApiCredential, CredentialSource},
    CompletionConfig, CompletionResponse, LlmProvider, ProviderError, StructuredRequest,
    TokenUsage,
};
use crate::config::ProviderSettings;

/// Environment variable name for OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "OpenAI API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from settings, falling back to `OPENAI_API_KEY`.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_settings_or_env(
            settings.api_key.as_deref(),
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;

        Ok(Self {
            credential,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Set custom base URL (Azure, proxies, compatible servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: JsonValue,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Schema document in the shape OpenAI accepts.
fn response_schema(request: &StructuredRequest) -> JsonValue {
    let mut schema = json_schema(request.schema)
        .cloned()
        .unwrap_or_else(|| serde_json::json!({ "type": "object" }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: &StructuredRequest,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let client = http::client()?;

        let body = ChatRequest {
            model: &config.model,
            messages: request
                .messages
                .iter()
                .map(|m| ChatTurn {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            response_format: ResponseFormat {
                type_: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.schema.name(),
                    schema: response_schema(request),
                    strict: false,
                },
            },
        };

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(e, config.timeout))?;

        let body: ChatResponse = http::read_json(response).await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;
        let usage = body.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            ..Default::default()
        });

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for creating OpenAI providers from configuration.
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_settings(settings)?))
    }

    fn validate_settings(&self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(settings.api_key.as_deref(), OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in config or {} env",
                OPENAI_API_KEY_ENV
            )));
        }
        check_base_url(settings)
    }

    fn default_model(&self) -> &'static str {
        "gpt-4o-mini"
    }

    fn description(&self) -> &'static str {
        "OpenAI chat completions with JSON Schema response format"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legaldoc_core::schema::SchemaId;

    #[test]
    fn test_api_key_not_in_debug_output() {
        let provider = OpenAiProvider::new("sk-openai-secret-12345");
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains("sk-openai-secret-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_settings_uses_custom_base_url() {
        let mut settings = ProviderSettings::new("openai");
        settings.api_key = Some("config-key".to_string());
        settings.base_url = Some("https://proxy.internal/v1".to_string());

        let provider = OpenAiProvider::from_settings(&settings).unwrap();
        assert_eq!(provider.base_url, "https://proxy.internal/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_response_schema_drops_meta_keyword() {
        let request = StructuredRequest::new(vec![], SchemaId::RiskAssessment);
        let schema = response_schema(&request);
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn test_response_envelope_parses() {
        let body = r#"{
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"message": {"role": "assistant", "content": "{\"severity\":\"LOW\"}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
        }"#;

        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"severity\":\"LOW\"}"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 120);
    }
}

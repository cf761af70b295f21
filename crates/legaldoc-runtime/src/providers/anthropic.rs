//! Anthropic messages API provider.
//!
//! The messages API has no schema-constrained output mode, so the stage
//! schema is appended to the system prompt. The system block is marked for
//! prompt caching: it is identical for every clause of a stage.

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

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic provider.
///
/// The key lives in an [`ApiCredential`] and is only exposed when a request
/// header is built.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "Anthropic API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from settings, falling back to `ANTHROPIC_API_KEY`.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_settings_or_env(
            settings.api_key.as_deref(),
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;

        Ok(Self {
            credential,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: [TextBlock; 1],
    messages: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Turn {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct TextBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<Ephemeral>,
}

#[derive(Debug, Serialize)]
struct Ephemeral {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

impl From<MessagesUsage> for TokenUsage {
    fn from(usage: MessagesUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_creation_tokens: usage.cache_creation_input_tokens,
        }
    }
}

fn messages_request<'a>(request: &StructuredRequest, config: &'a CompletionConfig) -> MessagesRequest<'a> {
    let (system, turns) = request.system_with_instruction();

    MessagesRequest {
        model: &config.model,
        max_tokens: config.max_tokens,
        system: [TextBlock {
            kind: "text",
            text: system,
            cache_control: config.prompt_caching.then_some(Ephemeral { kind: "ephemeral" }),
        }],
        messages: turns
            .into_iter()
            .map(|m| Turn {
                role: m.role,
                content: m.content,
            })
            .collect(),
        // The API default is 1.0, so zero must be sent explicitly
        temperature: Some(config.temperature),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        request: &StructuredRequest,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let response = http::client()?
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(&messages_request(request, config))
            .send()
            .await
            .map_err(|e| http::send_error(e, config.timeout))?;

        let body: MessagesResponse = http::read_json(response).await?;
        let content: String = body.content.into_iter().filter_map(|b| b.text).collect();

        if content.is_empty() {
            return Err(ProviderError::ParseError(
                "response contained no text blocks".to_string(),
            ));
        }

        Ok(CompletionResponse {
            content,
            usage: body.usage.into(),
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for creating Anthropic providers from configuration.
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_settings(settings)?))
    }

    fn validate_settings(&self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(settings.api_key.as_deref(), ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }
        check_base_url(settings)
    }

    fn default_model(&self) -> &'static str {
        "claude-3-5-haiku-latest"
    }

    fn description(&self) -> &'static str {
        "Anthropic messages API, schema in a cached system prompt"
    }
}

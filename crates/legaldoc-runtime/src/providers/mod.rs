//! LLM Provider abstractions for legaldoc-runtime.
//!
//! This module defines the trait every model backend implements and the
//! adapters for OpenAI, Google Gemini, and Anthropic, each behind its own
//! cargo feature.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use legaldoc_core::schema::{json_schema, SchemaId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "reqwest")]
mod http;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory};
#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Errors from LLM providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ProviderError::AuthError(message.into()),
            429 => ProviderError::RateLimited { retry_after },
            _ => ProviderError::ApiError {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether a fresh attempt at the same request may succeed.
    ///
    /// Rate limits, timeouts, connection failures, truncated or garbled
    /// envelopes and server-side statuses are transient. Authentication
    /// failures, missing configuration and other client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::ParseError(_) => true,
            ProviderError::ApiError { status, .. } => {
                matches!(status, 408 | 529) || (500..600).contains(status)
            }
            ProviderError::AuthError(_) | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,

    /// Enable prompt caching (Anthropic-specific)
    pub prompt_caching: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            prompt_caching: true,
        }
    }
}

impl CompletionConfig {
    /// Create a config for the given model with default limits.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }
}

/// A completion request whose answer must satisfy a stage contract.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub messages: Vec<ChatMessage>,
    pub schema: SchemaId,
}

impl StructuredRequest {
    pub fn new(messages: Vec<ChatMessage>, schema: SchemaId) -> Self {
        Self { messages, schema }
    }

    /// Plain-text description of the required output shape.
    ///
    /// Used by providers without native schema-constrained output.
    pub fn schema_instruction(&self) -> String {
        let schema = json_schema(self.schema)
            .and_then(|s| serde_json::to_string_pretty(s).ok())
            .unwrap_or_default();

        format!(
            "Respond with a single JSON object and nothing else. \
             It must conform to this JSON Schema ({}):\n{}",
            self.schema, schema
        )
    }

    /// The system prompt (all system messages joined) and the remaining turns.
    pub fn split_system(&self) -> (Option<String>, Vec<ChatMessage>) {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
            .collect();
        let turns = self.messages.iter().filter(|m| !m.is_system()).cloned().collect();

        let system = if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        };
        (system, turns)
    }

    /// System prompt with the schema instruction appended.
    pub fn system_with_instruction(&self) -> (String, Vec<ChatMessage>) {
        let (system, turns) = self.split_system();
        let instruction = self.schema_instruction();
        let system = match system {
            Some(s) => format!("{}\n\n{}", s, instruction),
            None => instruction,
        };
        (system, turns)
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,

    /// Tokens read from cache (Anthropic)
    pub cache_read_tokens: u32,

    /// Tokens written to cache (Anthropic)
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Add another response's usage to this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// This is the ONLY place where LLM calls are made. Stage agents reach it
/// through the provider client and fallback chain, never directly.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a completion whose answer should satisfy `request.schema`.
    async fn complete(
        &self,
        request: &StructuredRequest,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy.
    async fn health_check(&self) -> bool;

    /// Get provider name for logs and provenance.
    fn name(&self) -> &str;

    /// Whether the provider can be shown its own bad output and asked to fix it.
    fn supports_correction(&self) -> bool {
        true
    }

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Simple estimate: ~4 chars per token
        (text.len() / 4) as u32
    }
}

//! Provider factory pattern for dynamic LLM provider registration.
//!
//! Providers register factories that create instances from
//! [`ProviderSettings`]; the pipeline config names providers by type.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = ProviderRegistry::new();
//! registry.register(Arc::new(OpenAiProviderFactory));
//!
//! let provider = registry.create(&settings)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{CompletionConfig, LlmProvider, ProviderError};
use crate::config::ProviderSettings;

/// Factory for creating LLM providers from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier for this provider type.
    ///
    /// Examples: "openai", "gemini", "anthropic"
    fn provider_type(&self) -> &'static str;

    /// Create a provider instance from settings.
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate settings without creating a provider.
    ///
    /// Use this for fast config validation during startup.
    fn validate_settings(&self, settings: &ProviderSettings) -> Result<(), ProviderError>;

    /// Model used when the settings name none.
    fn default_model(&self) -> &'static str;

    /// Human-readable description of this provider.
    fn description(&self) -> &'static str {
        "LLM Provider"
    }

    /// Completion parameters for calls made with these settings.
    fn completion_config(&self, settings: &ProviderSettings) -> CompletionConfig {
        CompletionConfig {
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| self.default_model().to_string()),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout,
            prompt_caching: true,
        }
    }
}

/// Check that a configured base URL looks like one.
pub(crate) fn check_base_url(settings: &ProviderSettings) -> Result<(), ProviderError> {
    match settings.base_url.as_deref() {
        Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => Err(
            ProviderError::NotConfigured("base_url must start with http:// or https://".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory with the same type already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Create a provider and its completion parameters from settings.
    pub fn create(
        &self,
        settings: &ProviderSettings,
    ) -> Result<(Arc<dyn LlmProvider>, CompletionConfig), ProviderError> {
        let factory = self.factory(&settings.provider_type)?;
        let provider = factory.create(settings)?;
        Ok((provider, factory.completion_config(settings)))
    }

    /// Validate settings for their provider type.
    pub fn validate(&self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        self.factory(&settings.provider_type)?
            .validate_settings(settings)
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// List available provider types.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a provider type is registered.
    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Create a registry with every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        #[cfg(feature = "gemini")]
        registry.register(Arc::new(super::GeminiProviderFactory));
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));

        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

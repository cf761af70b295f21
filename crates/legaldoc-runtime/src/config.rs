//! Pipeline configuration, loadable from YAML or JSON.
//!
//! ```yaml
//! providers:
//!   - type: openai
//!     model: gpt-4o-mini
//!   - type: gemini
//!     model: gemini-2.0-flash
//!     timeout: 90s
//! retry:
//!   max_attempts: 3
//!   min_delay: 500ms
//!   max_delay: 10s
//! correction_attempts: 1
//! clause_concurrency: 4
//! cache:
//!   enabled: true
//!   ttl: 1h
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::ProviderError;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Durations as human-readable strings ("500ms", "1m 30s"), or plain seconds.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Repr::Text(text) => humantime::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// One configured provider, in fallback order.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Registered provider type ("openai", "gemini", "anthropic")
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Model name; the provider's default when absent
    #[serde(default)]
    pub model: Option<String>,

    /// API key; the provider's environment variable when absent
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl ProviderSettings {
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            model: None,
            api_key: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider_type", &self.provider_type)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Maximum cached responses
    pub capacity: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Everything needed to build a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Providers in fallback order, primary first
    pub providers: Vec<ProviderSettings>,

    pub retry: RetryPolicy,

    /// Times a provider is shown its own invalid output and asked to fix it
    pub correction_attempts: u32,

    /// Concurrent per-clause calls in the classifier and risk stages
    pub clause_concurrency: usize,

    pub circuit_breaker: CircuitBreakerConfig,

    pub cache: CacheSettings,

    /// Directory of prompt templates; built-in prompts when absent
    pub prompt_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retry: RetryPolicy::default(),
            correction_attempts: 1,
            clause_concurrency: 4,
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheSettings::default(),
            prompt_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML config.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Serialize to YAML. API keys are never written out.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges and cross-field constraints.
    ///
    /// An empty provider list is valid here; the pipeline rejects it before
    /// the first model call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.min_delay > self.retry.max_delay {
            return invalid(format!(
                "retry.min_delay ({:?}) exceeds retry.max_delay ({:?})",
                self.retry.min_delay, self.retry.max_delay
            ));
        }
        if !(self.retry.factor >= 1.0) {
            return invalid(format!("retry.factor must be >= 1.0, got {}", self.retry.factor));
        }
        if self.clause_concurrency == 0 {
            return invalid("clause_concurrency must be at least 1".to_string());
        }
        if self.circuit_breaker.failure_threshold == 0 || self.circuit_breaker.success_threshold == 0 {
            return invalid("circuit_breaker thresholds must be at least 1".to_string());
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return invalid("cache.capacity must be positive when the cache is enabled".to_string());
        }

        for (i, provider) in self.providers.iter().enumerate() {
            if provider.provider_type.trim().is_empty() {
                return invalid(format!("providers[{}].type is empty", i));
            }
            if !(0.0..=2.0).contains(&provider.temperature) {
                return invalid(format!(
                    "providers[{}].temperature must be within 0.0..=2.0, got {}",
                    i, provider.temperature
                ));
            }
            if provider.max_tokens == 0 {
                return invalid(format!("providers[{}].max_tokens must be positive", i));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.providers.is_empty());
        assert_eq!(config.correction_attempts, 1);
        assert_eq!(config.clause_concurrency, 4);
        assert!(!config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
providers:
  - type: openai
    model: gpt-4o-mini
  - type: gemini
    timeout: 90s
    temperature: 0.2
retry:
  max_attempts: 5
  min_delay: 250ms
  max_delay: 1m
clause_concurrency: 8
cache:
  enabled: true
  ttl: 2h
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.providers[1].timeout, Duration::from_secs(90));
        assert_eq!(config.providers[1].max_tokens, 4096);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.min_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_secs(60));
        assert!(config.retry.jitter);
        assert_eq!(config.clause_concurrency, 8);
        assert_eq!(config.cache.ttl, Duration::from_secs(7200));
        assert_eq!(config.correction_attempts, 1);
    }

    #[test]
    fn test_from_json_accepts_plain_seconds() {
        let json = r#"{
            "providers": [{"type": "anthropic", "timeout": 30}],
            "circuit_breaker": {"failure_threshold": 5, "recovery_timeout": "45s", "success_threshold": 1}
        }"#;

        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.providers[0].timeout, Duration::from_secs(30));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_yaml_round_trip_omits_api_key() {
        let mut config = PipelineConfig::default();
        let mut provider = ProviderSettings::new("openai").with_model("gpt-4o");
        provider.api_key = Some("sk-secret".to_string());
        config.providers.push(provider);

        let yaml = config.to_yaml().unwrap();
        assert!(!yaml.contains("sk-secret"));

        let reloaded = PipelineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(reloaded.providers[0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(reloaded.retry, config.retry);
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let mut provider = ProviderSettings::new("openai");
        provider.api_key = Some("sk-secret".to_string());
        assert!(!format!("{:?}", provider).contains("sk-secret"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let yaml = "retry:\n  max_attempts: 0\n";
        assert!(matches!(PipelineConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));

        let yaml = "retry:\n  min_delay: 5s\n  max_delay: 1s\n";
        assert!(matches!(PipelineConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));

        let yaml = "clause_concurrency: 0\n";
        assert!(matches!(PipelineConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));

        let yaml = "providers:\n  - type: openai\n    temperature: 3.5\n";
        assert!(matches!(PipelineConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_duration_is_a_parse_error() {
        let yaml = "retry:\n  min_delay: soon\n";
        assert!(matches!(PipelineConfig::from_yaml(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/legaldoc.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

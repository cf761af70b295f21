//! Provider API keys.
//!
//! Keys are wrapped in [`secrecy::SecretString`]: they never show up in
//! `Debug` or `Display` output (and so never in logs or error messages),
//! and are zeroed when dropped. Adapters call [`ApiCredential::expose`]
//! only while building a request header.
//!
//! A key configured in `ProviderSettings` wins over the provider's
//! environment variable (`OPENAI_API_KEY`, `GEMINI_API_KEY`,
//! `ANTHROPIC_API_KEY`). An empty configured key counts as absent.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "programmatic",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider API key that cannot be printed.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, label: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            label,
        }
    }

    /// Resolve a key from settings, then from `env_var`.
    pub fn from_settings_or_env(
        configured: Option<&str>,
        env_var: &str,
        label: &'static str,
    ) -> Result<Self, ProviderError> {
        match lookup(configured, env_var) {
            Some((value, source)) => Ok(Self::new(value, source, label)),
            None => Err(ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in config or {} environment variable",
                label, env_var
            ))),
        }
    }

    /// Whether a key would resolve, without keeping it.
    pub fn is_available(configured: Option<&str>, env_var: &str) -> bool {
        lookup(configured, env_var).is_some()
    }

    /// The raw key, for request headers only.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

fn lookup(configured: Option<&str>, env_var: &str) -> Option<(String, CredentialSource)> {
    configured
        .filter(|v| !v.is_empty())
        .map(|v| (v.to_string(), CredentialSource::Config))
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| (v, CredentialSource::Environment))
        })
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("label", &self.label)
            .field("source", &self.source)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [REDACTED]", self.label, self.source)
    }
}

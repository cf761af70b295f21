//! Provider fallback: try each configured provider in order.

use legaldoc_core::{SchemaViolation, StructuredOutput};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::CircuitBreaker;
use crate::cache::ResponseCache;
use crate::client::{CallError, ProviderClient};
use crate::config::{ConfigError, PipelineConfig};
use crate::providers::{ChatMessage, ProviderError, ProviderRegistry, TokenUsage};

/// Why one provider in the chain did not serve a call.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Transient failures outlasted the retry policy
    TransientExhausted { attempts: u32, error: ProviderError },

    /// Output could not be brought into the required shape
    SchemaViolation(SchemaViolation),

    /// The provider rejected the request outright
    Fatal(ProviderError),

    /// Skipped because the provider's circuit is open
    CircuitOpen,
}

impl From<CallError> for FailureReason {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Transient { attempts, source } => FailureReason::TransientExhausted {
                attempts,
                error: source,
            },
            CallError::SchemaViolation(v) => FailureReason::SchemaViolation(v),
            CallError::Fatal(e) => FailureReason::Fatal(e),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TransientExhausted { attempts, error } => {
                write!(f, "gave up after {} attempts: {}", attempts, error)
            }
            FailureReason::SchemaViolation(v) => write!(f, "{}", v),
            FailureReason::Fatal(e) => write!(f, "fatal: {}", e),
            FailureReason::CircuitOpen => f.write_str("circuit open"),
        }
    }
}

/// One provider's failure, as reported in diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub model: String,
    pub reason: FailureReason,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.model, self.reason)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackError {
    #[error("No provider configured")]
    NoProviderConfigured,

    #[error("All providers exhausted: {}", summarize(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A value together with who served it.
#[derive(Debug, Clone)]
pub struct Served<T> {
    pub value: T,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,

    /// Failures of the providers tried before the serving one, in order
    pub failures: Vec<ProviderFailure>,
}

impl<T> Served<T> {
    /// Transform the value, keeping the diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            value: f(self.value),
            provider: self.provider,
            model: self.model,
            usage: self.usage,
            failures: self.failures,
        }
    }
}

/// Result of one provider's health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHealth {
    pub provider: String,
    pub model: String,
    pub healthy: bool,
}

/// Ordered providers, primary first.
///
/// Cheap to share behind an `Arc`; the circuit breaker is shared by every
/// call made through the chain. Each chain entry has its own circuit, so two
/// entries of the same provider type (say, two OpenAI keys) fail independently.
pub struct ProviderChain {
    clients: Vec<ProviderClient>,
    circuit_keys: Vec<String>,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderChain {
    pub fn new(clients: Vec<ProviderClient>, breaker: Arc<CircuitBreaker>) -> Self {
        let circuit_keys = clients
            .iter()
            .enumerate()
            .map(|(position, client)| {
                format!("{}#{}:{}", position, client.provider_name(), client.model())
            })
            .collect();

        Self {
            clients,
            circuit_keys,
            breaker,
        }
    }

    /// Build every configured provider through the registry.
    pub fn from_config(
        config: &PipelineConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let cache = ResponseCache::from_settings(&config.cache);

        let clients = config
            .providers
            .iter()
            .map(|settings| -> Result<ProviderClient, ProviderError> {
                registry.validate(settings)?;
                let (provider, completion) = registry.create(settings)?;
                Ok(ProviderClient::new(provider, completion)
                    .with_retry(config.retry.clone())
                    .with_correction_attempts(config.correction_attempts)
                    .with_cache(cache.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            clients,
            Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The breaker key of the entry at `position`: `<position>#<provider>:<model>`.
    pub fn circuit_key(&self, position: usize) -> Option<&str> {
        self.circuit_keys.get(position).map(String::as_str)
    }

    /// Ask every provider whether it can serve requests, in chain order.
    pub async fn health_check(&self) -> Vec<ProviderHealth> {
        let checks = self.clients.iter().map(|client| async move {
            ProviderHealth {
                provider: client.provider_name().to_string(),
                model: client.model().to_string(),
                healthy: client.health_check().await,
            }
        });
        futures::future::join_all(checks).await
    }

    /// Return the first valid result, trying providers in order.
    pub async fn execute<T: StructuredOutput>(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Served<T>, FallbackError> {
        if self.clients.is_empty() {
            return Err(FallbackError::NoProviderConfigured);
        }

        let mut failures = Vec::new();

        for (client, circuit) in self.clients.iter().zip(&self.circuit_keys) {
            let provider = client.provider_name();

            if self.breaker.is_open(circuit) {
                warn!(provider, circuit = %circuit, "Circuit open, skipping provider");
                failures.push(ProviderFailure {
                    provider: provider.to_string(),
                    model: client.model().to_string(),
                    reason: FailureReason::CircuitOpen,
                });
                continue;
            }

            match client.call::<T>(messages).await {
                Ok(validated) => {
                    self.breaker.record_success(circuit);
                    if !failures.is_empty() {
                        info!(provider, skipped = failures.len(), "Served by fallback provider");
                    }
                    return Ok(Served {
                        value: validated.value,
                        provider: provider.to_string(),
                        model: validated.model,
                        usage: validated.usage,
                        failures,
                    });
                }
                Err(err) => {
                    match &err {
                        CallError::Fatal(e) => {
                            self.breaker.record_failure(circuit);
                            error!(provider, error = %e, "Fatal provider failure, falling back");
                        }
                        CallError::Transient { attempts, source } => {
                            self.breaker.record_failure(circuit);
                            warn!(provider, attempts, error = %source, "Retries exhausted, falling back");
                        }
                        CallError::SchemaViolation(v) => {
                            warn!(provider, error = %v, "Schema violation, falling back");
                        }
                    }

                    failures.push(ProviderFailure {
                        provider: provider.to_string(),
                        model: client.model().to_string(),
                        reason: err.into(),
                    });
                }
            }
        }

        Err(FallbackError::AllProvidersExhausted { failures })
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("clients", &self.clients)
            .finish()
    }
}

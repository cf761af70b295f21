//! Provider client: one provider, one stage contract, validated output.
//!
//! A call goes through three layers:
//!
//! 1. **Retry**: transient provider errors are retried with exponential
//!    backoff, up to the policy's attempt ceiling
//! 2. **Validation**: the response is coerced and checked against the
//!    stage's JSON Schema
//! 3. **Correction**: invalid output is sent back to the same provider with
//!    the list of violations, a bounded number of times
//!
//! Callers receive either a typed value or a [`CallError`] saying which of
//! the three layers gave up.

use backon::Retryable;
use legaldoc_core::schema::{extract_json, validate};
use legaldoc_core::{SchemaViolation, StructuredOutput};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    StructuredRequest, TokenUsage,
};
use crate::resilience::RetryPolicy;

/// Why a single provider could not produce a valid result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// Transient failures outlasted the retry policy
    #[error("Transient failure after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The provider answered, but not in the required shape
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    /// The provider cannot serve this request (auth, configuration, bad request)
    #[error("Fatal provider error: {0}")]
    Fatal(#[source] ProviderError),
}

/// A validated stage result from one provider.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub value: T,

    /// Model that produced the value, as reported by the provider
    pub model: String,

    /// Tokens spent, including correction rounds; zero for cache hits
    pub usage: TokenUsage,

    pub cached: bool,
}

/// Calls one provider with retry, validation and correction.
pub struct ProviderClient {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    retry: RetryPolicy,
    correction_attempts: u32,
    cache: Option<ResponseCache>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self {
            provider,
            completion,
            retry: RetryPolicy::default(),
            correction_attempts: 1,
            cache: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Number of times invalid output is sent back for correction.
    pub fn with_correction_attempts(mut self, attempts: u32) -> Self {
        self.correction_attempts = attempts;
        self
    }

    pub fn with_cache(mut self, cache: Option<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Configured model name.
    pub fn model(&self) -> &str {
        &self.completion.model
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }

    /// Run one structured call and return a value satisfying `T`'s contract.
    pub async fn call<T: StructuredOutput>(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Validated<T>, CallError> {
        let key = CacheKey::new(self.provider_name(), self.model(), T::SCHEMA, messages);

        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&key).await {
                match validate::<T>(&raw) {
                    Ok(value) => {
                        debug!(provider = self.provider_name(), schema = %T::SCHEMA, "Cache hit");
                        return Ok(Validated {
                            value,
                            model: self.completion.model.clone(),
                            usage: TokenUsage::default(),
                            cached: true,
                        });
                    }
                    Err(_) => cache.invalidate(&key).await,
                }
            }
        }

        let mut request = StructuredRequest::new(messages.to_vec(), T::SCHEMA);
        let mut usage = TokenUsage::default();
        let mut corrections = 0;

        loop {
            let response = self.complete_with_retry(&request).await?;
            usage.accumulate(&response.usage);

            let violation = match extract_json(&response.content, T::SCHEMA) {
                Ok(raw) => match validate::<T>(&raw) {
                    Ok(value) => {
                        if let Some(cache) = &self.cache {
                            cache.insert(key, raw).await;
                        }
                        return Ok(Validated {
                            value,
                            model: response.model,
                            usage,
                            cached: false,
                        });
                    }
                    Err(violation) => violation,
                },
                Err(violation) => violation,
            };

            if corrections >= self.correction_attempts || !self.provider.supports_correction() {
                return Err(CallError::SchemaViolation(violation));
            }
            corrections += 1;

            warn!(
                provider = self.provider_name(),
                schema = %T::SCHEMA,
                violations = violation.violations.len(),
                correction = corrections,
                "Invalid structured output, requesting correction"
            );
            request.messages.push(ChatMessage::assistant(response.content));
            request.messages.push(ChatMessage::user(correction_prompt(&violation)));
        }
    }

    /// Send one request, retrying transient failures.
    async fn complete_with_retry(
        &self,
        request: &StructuredRequest,
    ) -> Result<CompletionResponse, CallError> {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let provider = &self.provider;
        let completion = &self.completion;
        let name = self.provider_name();

        let result = (move || async move {
            counter.fetch_add(1, Ordering::Relaxed);
            provider.complete(request, completion).await
        })
        .retry(self.retry.backoff())
        .sleep(tokio::time::sleep)
        .when(ProviderError::is_transient)
        .notify(|err: &ProviderError, delay: Duration| {
            warn!(
                provider = name,
                attempt = counter.load(Ordering::Relaxed),
                error = %err,
                ?delay,
                "Transient provider failure, retrying"
            );
        })
        .await;

        result.map_err(|source| {
            if source.is_transient() {
                CallError::Transient {
                    attempts: attempts.load(Ordering::Relaxed),
                    source,
                }
            } else {
                CallError::Fatal(source)
            }
        })
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &self.provider_name())
            .field("model", &self.completion.model)
            .field("retry", &self.retry)
            .field("correction_attempts", &self.correction_attempts)
            .finish()
    }
}

fn correction_prompt(violation: &SchemaViolation) -> String {
    format!(
        "Your previous response did not match the required {} format:\n{}\n\n\
         Respond again with only the corrected JSON object.",
        violation.schema,
        violation.describe()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use legaldoc_core::schema::ClassificationOutput;
    use legaldoc_core::Category;

    const VALID: &str = r#"{"category": "Notices", "confidence": 0.92, "reasoning": "Addresses for notice."}"#;
    const INVALID: &str = r#"{"category": "Pizza", "confidence": 0.5}"#;

    fn client(provider: &Arc<ScriptedProvider>, retry: RetryPolicy) -> ProviderClient {
        ProviderClient::new(provider.clone(), CompletionConfig::new("scripted-model")).with_retry(retry)
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("Classify."), ChatMessage::user("All notices in writing.")]
    }

    fn retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_valid_response_on_first_attempt() {
        let provider = Arc::new(ScriptedProvider::new("primary", vec![Ok(VALID.to_string())]));

        let result = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap();

        assert_eq!(result.value.category, Category::Notices);
        assert!(!result.cached);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_stop_at_attempt_ceiling() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Err(ProviderError::Timeout(Duration::from_secs(60))); 5],
        ));

        let err = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Transient { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![
                Err(ProviderError::RateLimited { retry_after: None }),
                Err(ProviderError::from_status(503, "unavailable", None)),
                Ok(VALID.to_string()),
            ],
        ));

        let result = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap();

        assert_eq!(result.value.category, Category::Notices);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Err(ProviderError::AuthError("invalid key".into())), Ok(VALID.to_string())],
        ));

        let err = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Fatal(ProviderError::AuthError(_))));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_correction_round_recovers() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Ok(INVALID.to_string()), Ok(VALID.to_string())],
        ));

        let result = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap();
        assert_eq!(result.value.category, Category::Notices);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let followup = &requests[1].messages;
        assert_eq!(followup.len(), 4);
        assert_eq!(followup[2], ChatMessage::assistant(INVALID));
        assert!(followup[3].content.contains("/category"));
    }

    #[tokio::test]
    async fn test_schema_violation_after_corrections() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Ok(INVALID.to_string()), Ok("not json at all".to_string())],
        ));

        let err = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::SchemaViolation(_)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_correction_when_unsupported() {
        let provider = Arc::new(
            ScriptedProvider::new("primary", vec![Ok(INVALID.to_string()), Ok(VALID.to_string())])
                .without_correction(),
        );

        let err = client(&provider, retry(3))
            .call::<ClassificationOutput>(&messages())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::SchemaViolation(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new("primary", vec![Ok(VALID.to_string())]));
        let client = client(&provider, retry(1)).with_cache(Some(ResponseCache::default()));

        let first = client.call::<ClassificationOutput>(&messages()).await.unwrap();
        let second = client.call::<ClassificationOutput>(&messages()).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.usage, TokenUsage::default());
        assert_eq!(second.value, first.value);
        assert_eq!(provider.calls(), 1);
    }
}

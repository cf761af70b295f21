//! Scripted providers for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use legaldoc_core::{Clause, Document, DocumentMetadata, DocumentType, Party};

use crate::client::ProviderClient;
use crate::providers::{
    CompletionConfig, CompletionResponse, LlmProvider, ProviderError, StructuredRequest,
    TokenUsage,
};
use crate::resilience::{CircuitBreaker, ProviderChain, RetryPolicy};

type Responder = Box<dyn Fn(&StructuredRequest) -> Result<String, ProviderError> + Send + Sync>;
type Delay = Box<dyn Fn(&StructuredRequest) -> Duration + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<String, ProviderError>>>),
    Responder(Responder),
}

/// A provider that answers from a script and records every request.
pub struct ScriptedProvider {
    name: String,
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<StructuredRequest>>,
    supports_correction: bool,
    healthy: bool,
    delay: Option<Delay>,
}

impl ScriptedProvider {
    /// Answer with queued responses in order; fails with an API error once
    /// the queue is empty.
    pub fn new(name: impl Into<String>, responses: Vec<Result<String, ProviderError>>) -> Self {
        Self::with_script(name, Script::Queue(Mutex::new(responses.into())))
    }

    /// Answer each request by calling `responder`.
    pub fn responding(
        name: impl Into<String>,
        responder: impl Fn(&StructuredRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_script(name, Script::Responder(Box::new(responder)))
    }

    fn with_script(name: impl Into<String>, script: Script) -> Self {
        Self {
            name: name.into(),
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            supports_correction: true,
            healthy: true,
            delay: None,
        }
    }

    pub fn without_correction(mut self) -> Self {
        self.supports_correction = false;
        self
    }

    /// Fail health checks.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Sleep before answering, for how long `delay` says.
    pub fn with_delay(
        mut self,
        delay: impl Fn(&StructuredRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        request: &StructuredRequest,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }

        let content = match &self.script {
            Script::Queue(queue) => queue.lock().pop_front().unwrap_or_else(|| {
                Err(ProviderError::ApiError {
                    status: 400,
                    message: "script exhausted".to_string(),
                })
            }),
            Script::Responder(responder) => responder(request),
        }?;

        Ok(CompletionResponse {
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: (content.len() / 4) as u32,
                ..Default::default()
            },
            content,
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_correction(&self) -> bool {
        self.supports_correction
    }
}

/// A single-provider chain without retries.
pub fn chain_of(provider: &Arc<ScriptedProvider>) -> Arc<ProviderChain> {
    Arc::new(ProviderChain::new(
        vec![ProviderClient::new(provider.clone(), CompletionConfig::new("scripted-model"))
            .with_retry(RetryPolicy::no_retry())],
        Arc::new(CircuitBreaker::default()),
    ))
}

/// An analyzed mutual NDA.
pub fn sample_document(text: &str) -> Document {
    Document::new(
        text,
        DocumentMetadata {
            document_type: DocumentType::MutualNda,
            parties: vec![
                Party {
                    name: "Acme Corp".to_string(),
                    role: "Party".to_string(),
                },
                Party {
                    name: "Beta LLC".to_string(),
                    role: "Party".to_string(),
                },
            ],
            effective_date: None,
            summary: "Mutual NDA for a proposed partnership.".to_string(),
            key_observations: Vec::new(),
        },
    )
}

pub fn clause(index: usize, title: &str, text: &str) -> Clause {
    Clause {
        index,
        id: format!("clause_{}", index + 1),
        number: Some((index + 1).to_string()),
        title: title.to_string(),
        text: text.to_string(),
        span: None,
    }
}

/// The last user message of a request.
pub fn user_prompt(request: &StructuredRequest) -> &str {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

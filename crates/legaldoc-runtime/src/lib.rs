//! # legaldoc-runtime
//!
//! LLM-backed orchestration for LegalDoc NDA analysis.
//!
//! This crate runs a document through four model-driven stages and hands
//! the typed stage results to `legaldoc-core` for assembly:
//!
//! 1. **Document analyzer**: type, parties and summary
//! 2. **Clause splitter**: operative clauses in document order
//! 3. **Clause classifier**: one category per clause
//! 4. **Risk detector**: severity, findings and recommendations per clause
//!
//! Every call goes through a [`ProviderChain`]: retry with backoff on
//! transient failures, schema correction on malformed output, then
//! fallback to the next configured provider. A stage succeeds only when
//! some provider returns output that validates against its contract.
//!
//! ## Example
//!
//! ```rust,ignore
//! use legaldoc_runtime::{PipelineConfig, PipelineOrchestrator};
//!
//! let config = PipelineConfig::from_file("legaldoc.yaml")?;
//! let orchestrator = PipelineOrchestrator::from_config(&config)?;
//!
//! let result = orchestrator.analyze(&nda_text).await?;
//! for (clause, risk) in result.high_risk_clauses() {
//!     println!("{}: {:?}", clause.title, risk.recommendations);
//! }
//! ```

pub mod agents;
pub mod cache;
pub mod client;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(test)]
mod test_support;

pub use agents::{StageError, StageErrorKind};
pub use cache::{CacheKey, ResponseCache};
pub use client::{CallError, ProviderClient, Validated};
pub use config::{CacheSettings, ConfigError, PipelineConfig, ProviderSettings};
pub use orchestrator::{PipelineError, PipelineOrchestrator, PipelineOrchestratorBuilder, PipelineState};
pub use prompts::{BuiltinPrompts, DirectoryPrompts, PromptError, PromptSource, PromptTemplate};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry, StructuredRequest, TokenUsage,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, FallbackError, ProviderChain, ProviderFailure,
    ProviderHealth, RetryPolicy,
};

// The data model lives in legaldoc-core
pub use legaldoc_core::{AnalysisResult, Category, Clause, Severity, Stage};

//! Pipeline orchestrator for NDA analysis.
//!
//! The orchestrator drives a single document through the stages in order:
//!
//! ```text
//! Init -> Analyzed -> Split -> Classified -> Scored -> Done
//! ```
//!
//! Any stage failure or cancellation moves the run to `Failed` and aborts
//! it; there are no partial results. A run can be cancelled through a
//! [`CancellationToken`], which is checked at every stage boundary and
//! raced against the running stage.

use legaldoc_core::{AnalysisParts, AnalysisResult, AssemblyError, ResultAssembler};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::agents::{
    ClauseClassifier, ClauseSplitter, DocumentAnalyzer, RiskDetector, RunLedger, StageError,
};
use crate::config::{ConfigError, PipelineConfig};
use crate::prompts::{BuiltinPrompts, DirectoryPrompts, PromptSource};
use crate::providers::ProviderRegistry;
use crate::resilience::{CircuitBreaker, ProviderChain, ProviderHealth};

/// Where a pipeline run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Init,
    Analyzed,
    Split,
    Classified,
    Scored,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "init",
            PipelineState::Analyzed => "analyzed",
            PipelineState::Split => "split",
            PipelineState::Classified => "classified",
            PipelineState::Scored => "scored",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors from a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Document is empty")]
    EmptyDocument,

    #[error("No provider configured")]
    NoProviderConfigured,

    #[error("No healthy provider among: {}", .providers.join(", "))]
    NoHealthyProvider { providers: Vec<String> },

    /// A stage failed; `state` is the last state reached
    #[error("Pipeline failed after reaching '{state}': {source}")]
    StageFailure {
        state: PipelineState,
        #[source]
        source: StageError,
    },

    #[error("Pipeline cancelled in state '{state}'")]
    Cancelled { state: PipelineState },

    #[error("Result assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Runs documents through the analysis stages.
///
/// Holds only shared, read-only pieces (plus the internally synchronized
/// circuit breaker and cache), so one orchestrator can analyze many
/// documents concurrently.
pub struct PipelineOrchestrator {
    chain: Arc<ProviderChain>,
    analyzer: DocumentAnalyzer,
    splitter: ClauseSplitter,
    classifier: ClauseClassifier,
    risk_detector: RiskDetector,
    assembler: ResultAssembler,
}

impl PipelineOrchestrator {
    /// Create an orchestrator over a provider chain.
    pub fn new(chain: ProviderChain, prompts: Arc<dyn PromptSource>, clause_concurrency: usize) -> Self {
        let chain = Arc::new(chain);

        Self {
            analyzer: DocumentAnalyzer::new(prompts.clone(), chain.clone()),
            splitter: ClauseSplitter::new(prompts.clone(), chain.clone()),
            classifier: ClauseClassifier::new(prompts.clone(), chain.clone(), clause_concurrency),
            risk_detector: RiskDetector::new(prompts, chain.clone(), clause_concurrency),
            assembler: ResultAssembler::new(),
            chain,
        }
    }

    pub fn builder() -> PipelineOrchestratorBuilder {
        PipelineOrchestratorBuilder::new()
    }

    /// Build from configuration with every provider compiled into this build.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_registry(config, &ProviderRegistry::with_defaults())
    }

    /// Build from configuration with a custom provider registry.
    pub fn from_config_with_registry(
        config: &PipelineConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let prompts: Arc<dyn PromptSource> = match &config.prompt_dir {
            Some(dir) => Arc::new(DirectoryPrompts::new(dir)),
            None => Arc::new(BuiltinPrompts),
        };

        Ok(Self::new(
            ProviderChain::from_config(config, registry)?,
            prompts,
            config.clause_concurrency,
        ))
    }

    /// The circuit breaker shared by all runs.
    pub fn breaker(&self) -> &CircuitBreaker {
        self.chain.breaker()
    }

    /// Health of every provider in the chain, in fallback order.
    pub async fn health_check(&self) -> Vec<ProviderHealth> {
        self.chain.health_check().await
    }

    /// Analyze a document.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisResult, PipelineError> {
        self.analyze_with_cancellation(text, CancellationToken::new())
            .await
    }

    /// Analyze a document, stopping early if `cancel` fires.
    pub async fn analyze_with_cancellation(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        if self.chain.is_empty() {
            return Err(PipelineError::NoProviderConfigured);
        }

        let health = self.chain.health_check().await;
        for unhealthy in health.iter().filter(|h| !h.healthy) {
            tracing::warn!(
                provider = %unhealthy.provider,
                model = %unhealthy.model,
                "Provider failed health check"
            );
        }
        if !health.iter().any(|h| h.healthy) {
            return Err(PipelineError::NoHealthyProvider {
                providers: health
                    .into_iter()
                    .map(|h| format!("{} ({})", h.provider, h.model))
                    .collect(),
            });
        }

        let ledger = RunLedger::new();
        let mut state = PipelineState::Init;
        tracing::info!(state = %state, chars = text.len(), "Pipeline started");

        let document = step(&cancel, &mut state, PipelineState::Analyzed, async {
            self.analyzer.analyze(text, &ledger).await
        })
        .await?;

        let clauses = step(&cancel, &mut state, PipelineState::Split, async {
            self.splitter.split(&document, &ledger).await
        })
        .await?;

        let classifications = step(&cancel, &mut state, PipelineState::Classified, async {
            self.classifier.classify(&document, &clauses, &ledger).await
        })
        .await?;

        let risk_assessments = step(&cancel, &mut state, PipelineState::Scored, async {
            self.risk_detector
                .assess(&document, &clauses, &classifications, &ledger)
                .await
        })
        .await?;

        let result = self
            .assembler
            .assemble(AnalysisParts {
                document,
                clauses,
                classifications,
                risk_assessments,
                provenance: ledger.provenance(),
                usage: ledger.usage(),
            })
            .map_err(|e| {
                let reached = fail(&mut state);
                tracing::error!(state = %reached, error = %e, "Pipeline failed during assembly");
                PipelineError::from(e)
            })?;

        advance(&mut state, PipelineState::Done);
        tracing::info!(
            state = %state,
            clauses = result.totals.total_clauses,
            high = result.totals.high,
            llm_calls = result.usage.llm_calls,
            "Pipeline complete"
        );
        Ok(result)
    }

    /// Analyze a document on a private current-thread runtime.
    ///
    /// Must not be called from within an async context.
    pub fn analyze_blocking(&self, text: &str) -> Result<AnalysisResult, PipelineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.analyze(text))
    }
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("chain", &self.chain)
            .finish()
    }
}

/// Run one stage, racing it against cancellation, and advance the state.
///
/// On failure or cancellation `state` becomes `Failed`; the error carries
/// the last state reached.
async fn step<T>(
    cancel: &CancellationToken,
    state: &mut PipelineState,
    next: PipelineState,
    stage: impl Future<Output = Result<T, StageError>>,
) -> Result<T, PipelineError> {
    if cancel.is_cancelled() {
        let reached = fail(state);
        tracing::warn!(state = %reached, "Pipeline cancelled");
        return Err(PipelineError::Cancelled { state: reached });
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = stage => Some(result),
    };

    match outcome {
        None => {
            let reached = fail(state);
            tracing::warn!(state = %reached, "Pipeline cancelled");
            Err(PipelineError::Cancelled { state: reached })
        }
        Some(Err(source)) => {
            let reached = fail(state);
            tracing::error!(
                state = %reached,
                to = %state,
                stage = %source.stage,
                error = %source,
                "Pipeline failed"
            );
            Err(PipelineError::StageFailure {
                state: reached,
                source,
            })
        }
        Some(Ok(value)) => {
            advance(state, next);
            Ok(value)
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug_assert!(!state.is_terminal(), "no transition out of '{}'", state);
    tracing::info!(from = %state, to = %next, "Pipeline state transition");
    *state = next;
}

/// Move to `Failed`, returning the state the run had reached.
fn fail(state: &mut PipelineState) -> PipelineState {
    debug_assert!(!state.is_terminal(), "'{}' cannot fail", state);
    std::mem::replace(state, PipelineState::Failed)
}

/// Builder for PipelineOrchestrator.
pub struct PipelineOrchestratorBuilder {
    chain: Option<ProviderChain>,
    prompts: Arc<dyn PromptSource>,
    clause_concurrency: usize,
}

impl PipelineOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            chain: None,
            prompts: Arc::new(BuiltinPrompts),
            clause_concurrency: PipelineConfig::default().clause_concurrency,
        }
    }

    /// Set the provider chain.
    pub fn chain(mut self, chain: ProviderChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set the prompt source.
    pub fn prompts(mut self, prompts: Arc<dyn PromptSource>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn clause_concurrency(mut self, concurrency: usize) -> Self {
        self.clause_concurrency = concurrency;
        self
    }

    /// Build the orchestrator.
    ///
    /// Without a chain every run fails with `NoProviderConfigured`.
    pub fn build(self) -> PipelineOrchestrator {
        let chain = self
            .chain
            .unwrap_or_else(|| ProviderChain::new(Vec::new(), Arc::new(CircuitBreaker::default())));

        PipelineOrchestrator::new(chain, self.prompts, self.clause_concurrency)
    }
}

impl Default for PipelineOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

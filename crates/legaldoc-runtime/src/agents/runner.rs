//! Shared machinery for the stage agents.

use legaldoc_core::{Stage, StageProvenance, StructuredOutput, UsageSummary};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::StageError;
use crate::prompts::PromptSource;
use crate::providers::{ChatMessage, TokenUsage};
use crate::resilience::{ProviderChain, UsageTracker};

/// Usage and provenance collected over one pipeline run.
///
/// Shared by the concurrent per-clause calls of a stage.
#[derive(Debug)]
pub struct RunLedger {
    usage: UsageTracker,
    provenance: Mutex<BTreeMap<Stage, StageProvenance>>,
}

impl RunLedger {
    pub fn new() -> Self {
        let provenance = Stage::ALL
            .iter()
            .map(|&stage| (stage, StageProvenance::new(stage)))
            .collect();

        Self {
            usage: UsageTracker::new(),
            provenance: Mutex::new(provenance),
        }
    }

    /// Record one successful structured call.
    pub fn record(
        &self,
        stage: Stage,
        provider: &str,
        model: &str,
        usage: &TokenUsage,
        prior_failures: usize,
    ) {
        self.usage.record(usage, model);
        self.provenance
            .lock()
            .entry(stage)
            .or_insert_with(|| StageProvenance::new(stage))
            .record(provider, model, prior_failures);
    }

    pub fn usage(&self) -> UsageSummary {
        self.usage.summary()
    }

    /// Provenance for every stage, in execution order.
    pub fn provenance(&self) -> Vec<StageProvenance> {
        self.provenance.lock().values().cloned().collect()
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders a stage's prompt and runs it through the provider chain.
pub struct StageRunner<T> {
    stage: Stage,
    prompts: Arc<dyn PromptSource>,
    chain: Arc<ProviderChain>,
    _output: PhantomData<fn() -> T>,
}

impl<T: StructuredOutput> StageRunner<T> {
    pub fn new(stage: Stage, prompts: Arc<dyn PromptSource>, chain: Arc<ProviderChain>) -> Self {
        Self {
            stage,
            prompts,
            chain,
            _output: PhantomData,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// System and user messages for one call.
    pub fn messages(&self, vars: &[(&str, &str)]) -> Result<Vec<ChatMessage>, StageError> {
        let system = self
            .prompts
            .system_prompt(self.stage)
            .map_err(|e| StageError::new(self.stage, e))?;
        let template = self
            .prompts
            .template(self.stage)
            .map_err(|e| StageError::new(self.stage, e))?;

        Ok(vec![
            ChatMessage::system(system),
            ChatMessage::user(template.render(vars)),
        ])
    }

    /// Run one call and record who served it.
    pub async fn run(&self, vars: &[(&str, &str)], ledger: &RunLedger) -> Result<T, StageError> {
        let messages = self.messages(vars)?;

        let served = self
            .chain
            .execute::<T>(&messages)
            .await
            .map_err(|e| StageError::new(self.stage, e))?;

        ledger.record(
            self.stage,
            &served.provider,
            &served.model,
            &served.usage,
            served.failures.len(),
        );
        Ok(served.value)
    }
}

impl<T> std::fmt::Debug for StageRunner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("stage", &self.stage)
            .field("chain", &self.chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProviderClient;
    use crate::prompts::{BuiltinPrompts, DirectoryPrompts};
    use crate::providers::CompletionConfig;
    use crate::resilience::CircuitBreaker;
    use crate::test_support::ScriptedProvider;
    use legaldoc_core::schema::ClassificationOutput;

    fn chain(provider: &Arc<ScriptedProvider>) -> Arc<ProviderChain> {
        Arc::new(ProviderChain::new(
            vec![ProviderClient::new(provider.clone(), CompletionConfig::new("scripted-model"))],
            Arc::new(CircuitBreaker::default()),
        ))
    }

    #[tokio::test]
    async fn test_run_records_provenance_and_usage() {
        let provider = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Ok(r#"{"category": "Notices", "confidence": 0.8}"#.to_string())],
        ));
        let runner: StageRunner<ClassificationOutput> =
            StageRunner::new(Stage::ClauseClassifier, Arc::new(BuiltinPrompts), chain(&provider));
        let ledger = RunLedger::new();

        runner
            .run(&[("clause_text", "Notices must be in writing.")], &ledger)
            .await
            .unwrap();

        let request = &provider.requests()[0];
        assert!(request.messages[0].is_system());
        assert!(request.messages[1].content.contains("Notices must be in writing."));

        let provenance = ledger.provenance();
        assert_eq!(provenance.len(), 4);
        let classifier = &provenance[2];
        assert_eq!(classifier.stage, Stage::ClauseClassifier);
        assert_eq!(classifier.served_by[0].provider, "primary");
        assert_eq!(classifier.served_by[0].model, "scripted-model");
        assert_eq!(ledger.usage().llm_calls, 1);
    }

    #[tokio::test]
    async fn test_prompt_failure_makes_no_call() {
        let provider = Arc::new(ScriptedProvider::new("primary", vec![]));
        let dir = std::env::temp_dir().join(format!("legaldoc-runner-empty-{}", std::process::id()));
        let runner: StageRunner<ClassificationOutput> = StageRunner::new(
            Stage::ClauseClassifier,
            Arc::new(DirectoryPrompts::new(dir)),
            chain(&provider),
        );

        let err = runner.run(&[], &RunLedger::new()).await.unwrap_err();
        assert_eq!(err.stage, Stage::ClauseClassifier);
        assert!(matches!(err.kind, crate::agents::StageErrorKind::Prompt(_)));
        assert_eq!(provider.calls(), 0);
    }
}

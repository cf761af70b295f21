//! Clause splitter: ordered operative clauses.

use legaldoc_core::schema::SplitterOutput;
use legaldoc_core::{finalize_clauses, Clause, Document, Stage};
use std::sync::Arc;

use super::{RunLedger, StageError, StageRunner};
use crate::prompts::PromptSource;
use crate::resilience::ProviderChain;

/// Second stage: document in, clauses out.
///
/// Non-operative entries (preamble, recitals, signature blocks) are dropped
/// before indices and ids are assigned.
#[derive(Debug)]
pub struct ClauseSplitter {
    runner: StageRunner<SplitterOutput>,
}

impl ClauseSplitter {
    pub fn new(prompts: Arc<dyn PromptSource>, chain: Arc<ProviderChain>) -> Self {
        Self {
            runner: StageRunner::new(Stage::ClauseSplitter, prompts, chain),
        }
    }

    pub async fn split(&self, document: &Document, ledger: &RunLedger) -> Result<Vec<Clause>, StageError> {
        let summary = document.context_summary();
        let output = self
            .runner
            .run(
                &[("document_text", document.text.as_str()), ("document_summary", summary.as_str())],
                ledger,
            )
            .await?;

        let extracted = output.clauses.len();
        let clauses = finalize_clauses(&document.text, output.clauses);
        tracing::debug!(extracted, kept = clauses.len(), "Clauses split");

        Ok(clauses)
    }
}

//! Clause classifier: one category per clause.

use futures::{stream, StreamExt, TryStreamExt};
use legaldoc_core::schema::ClassificationOutput;
use legaldoc_core::{Classification, Clause, Document, Stage};
use std::sync::Arc;

use super::{RunLedger, StageError, StageRunner};
use crate::prompts::PromptSource;
use crate::resilience::ProviderChain;

/// Third stage: one call per clause, up to `concurrency` in flight.
#[derive(Debug)]
pub struct ClauseClassifier {
    runner: StageRunner<ClassificationOutput>,
    concurrency: usize,
}

impl ClauseClassifier {
    pub fn new(prompts: Arc<dyn PromptSource>, chain: Arc<ProviderChain>, concurrency: usize) -> Self {
        Self {
            runner: StageRunner::new(Stage::ClauseClassifier, prompts, chain),
            concurrency: concurrency.max(1),
        }
    }

    /// Classify every clause; the result is in clause order.
    ///
    /// The first failure aborts the stage and drops the calls still in flight.
    pub async fn classify(
        &self,
        document: &Document,
        clauses: &[Clause],
        ledger: &RunLedger,
    ) -> Result<Vec<Classification>, StageError> {
        let summary = document.context_summary();
        let summary = summary.as_str();

        let mut classifications: Vec<Classification> = stream::iter(clauses)
            .map(|clause| async move {
                let output = self
                    .runner
                    .run(
                        &[
                            ("document_summary", summary),
                            ("clause_id", clause.id.as_str()),
                            ("clause_title", clause.title.as_str()),
                            ("clause_text", clause.text.as_str()),
                        ],
                        ledger,
                    )
                    .await?;
                Ok::<_, StageError>(output.into_classification(clause))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        classifications.sort_by_key(|c| c.clause_index);
        Ok(classifications)
    }
}

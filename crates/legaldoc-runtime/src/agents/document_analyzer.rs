//! Document analyzer: type, parties and summary of the whole agreement.

use legaldoc_core::{Document, DocumentMetadata, Stage};
use std::sync::Arc;

use super::{RunLedger, StageError, StageRunner};
use crate::prompts::PromptSource;
use crate::resilience::ProviderChain;

/// First stage: raw text in, `Document` out.
#[derive(Debug)]
pub struct DocumentAnalyzer {
    runner: StageRunner<DocumentMetadata>,
}

impl DocumentAnalyzer {
    pub fn new(prompts: Arc<dyn PromptSource>, chain: Arc<ProviderChain>) -> Self {
        Self {
            runner: StageRunner::new(Stage::DocumentAnalyzer, prompts, chain),
        }
    }

    pub async fn analyze(&self, text: &str, ledger: &RunLedger) -> Result<Document, StageError> {
        let metadata = self.runner.run(&[("document_text", text)], ledger).await?;

        tracing::debug!(
            document_type = %metadata.document_type.label(),
            parties = metadata.parties.len(),
            "Document analyzed"
        );
        Ok(Document::new(text, metadata))
    }
}

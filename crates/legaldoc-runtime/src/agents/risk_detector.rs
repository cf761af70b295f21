//! Risk detector: severity, findings and recommendations per clause.

use futures::{stream, StreamExt, TryStreamExt};
use legaldoc_core::schema::RiskOutput;
use legaldoc_core::{Classification, Clause, Document, RiskAssessment, Stage};
use std::sync::Arc;

use super::{RunLedger, StageError, StageErrorKind, StageRunner};
use crate::prompts::PromptSource;
use crate::resilience::ProviderChain;

/// Fourth stage: one call per clause and its classification.
#[derive(Debug)]
pub struct RiskDetector {
    runner: StageRunner<RiskOutput>,
    concurrency: usize,
}

impl RiskDetector {
    pub fn new(prompts: Arc<dyn PromptSource>, chain: Arc<ProviderChain>, concurrency: usize) -> Self {
        Self {
            runner: StageRunner::new(Stage::RiskDetector, prompts, chain),
            concurrency: concurrency.max(1),
        }
    }

    /// Assess every clause; the result is in clause order.
    ///
    /// `classifications` must be aligned with `clauses`; misaligned input is
    /// rejected before any call is made.
    pub async fn assess(
        &self,
        document: &Document,
        clauses: &[Clause],
        classifications: &[Classification],
        ledger: &RunLedger,
    ) -> Result<Vec<RiskAssessment>, StageError> {
        check_alignment(clauses, classifications)?;

        let summary = document.context_summary();
        let summary = summary.as_str();

        let mut assessments: Vec<RiskAssessment> = stream::iter(clauses.iter().zip(classifications))
            .map(|(clause, classification)| async move {
                let output = self
                    .runner
                    .run(
                        &[
                            ("document_summary", summary),
                            ("clause_id", clause.id.as_str()),
                            ("clause_title", clause.title.as_str()),
                            ("clause_text", clause.text.as_str()),
                            ("clause_category", classification.category.label()),
                        ],
                        ledger,
                    )
                    .await?;
                Ok::<_, StageError>(output.into_assessment(clause))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        assessments.sort_by_key(|a| a.clause_index);
        Ok(assessments)
    }
}

fn check_alignment(clauses: &[Clause], classifications: &[Classification]) -> Result<(), StageError> {
    if clauses.len() != classifications.len() {
        return Err(StageError::new(
            Stage::RiskDetector,
            StageErrorKind::LengthMismatch {
                expected: clauses.len(),
                actual: classifications.len(),
            },
        ));
    }

    match clauses
        .iter()
        .zip(classifications)
        .position(|(clause, classification)| clause.index != classification.clause_index)
    {
        Some(position) => Err(StageError::new(
            Stage::RiskDetector,
            StageErrorKind::Misaligned {
                position,
                clause_index: classifications[position].clause_index,
            },
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::BuiltinPrompts;
    use crate::test_support::{chain_of, clause, sample_document, user_prompt, ScriptedProvider};
    use legaldoc_core::{Category, Severity};

    fn classification(clause_index: usize, category: Category) -> Classification {
        Classification {
            clause_index,
            clause_id: format!("clause_{}", clause_index + 1),
            category,
            subcategory: None,
            confidence: 0.9,
            reasoning: String::new(),
        }
    }

    fn detector(provider: &Arc<ScriptedProvider>) -> RiskDetector {
        RiskDetector::new(Arc::new(BuiltinPrompts), chain_of(provider), 4)
    }

    #[tokio::test]
    async fn test_assess_passes_category_and_keeps_order() {
        let provider = Arc::new(ScriptedProvider::responding("primary", |request| {
            if user_prompt(request).contains("perpetuity") {
                Ok(r#"{"risk_level": "high", "identified_risks": [
                    {"risk_type": "Unbounded duration", "description": "No end date."}
                ], "recommendations": ["Cap the term at three years."]}"#
                    .to_string())
            } else {
                Ok(r#"{"severity": "NONE"}"#.to_string())
            }
        }));
        let clauses = vec![
            clause(0, "Notices", "Notices by email."),
            clause(1, "Term", "Obligations survive in perpetuity."),
        ];
        let classifications = vec![
            classification(0, Category::Notices),
            classification(1, Category::TermAndDuration),
        ];

        let assessments = detector(&provider)
            .assess(&sample_document("..."), &clauses, &classifications, &RunLedger::new())
            .await
            .unwrap();

        assert_eq!(assessments[0].severity, Severity::Low);
        assert_eq!(assessments[1].severity, Severity::High);
        assert_eq!(assessments[1].clause_index, 1);
        assert_eq!(assessments[1].findings[0].label, "Unbounded duration");
        assert_eq!(assessments[1].recommendations.len(), 1);

        let prompts: Vec<_> = provider
            .requests()
            .iter()
            .map(|r| user_prompt(r).to_string())
            .collect();
        assert!(prompts.iter().any(|p| p.contains("Category: Term and Duration")));
    }

    #[tokio::test]
    async fn test_length_mismatch_is_rejected_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new("primary", vec![]));
        let clauses = vec![clause(0, "Notices", "Notices by email."), clause(1, "Term", "Two years.")];

        let err = detector(&provider)
            .assess(
                &sample_document("..."),
                &clauses,
                &[classification(0, Category::Notices)],
                &RunLedger::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.kind,
            StageErrorKind::LengthMismatch { expected: 2, actual: 1 }
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_misaligned_classifications_are_rejected() {
        let provider = Arc::new(ScriptedProvider::new("primary", vec![]));
        let clauses = vec![clause(0, "Notices", "Notices by email."), clause(1, "Term", "Two years.")];
        let swapped = vec![
            classification(1, Category::TermAndDuration),
            classification(0, Category::Notices),
        ];

        let err = detector(&provider)
            .assess(&sample_document("..."), &clauses, &swapped, &RunLedger::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.kind,
            StageErrorKind::Misaligned { position: 0, clause_index: 1 }
        ));
        assert_eq!(provider.calls(), 0);
    }
}

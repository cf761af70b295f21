//! Assembler: builds the final `AnalysisResult` from stage outputs.
//!
//! Assembly re-checks the alignment that every stage is meant to preserve:
//! clause `i` sits at position `i`, and classification `i` and risk
//! assessment `i` both refer to clause `i`. A misaligned set of outputs is
//! an error, never a partial result.

use chrono::Utc;
use thiserror::Error;

use crate::types::{
    AnalysisResult, AnalysisTotals, Classification, Clause, Document, RiskAssessment, Severity,
    SeverityBuckets, Stage, StageProvenance, UsageSummary,
};

/// Stage outputs collected by a pipeline run.
#[derive(Debug, Clone)]
pub struct AnalysisParts {
    pub document: Document,
    pub clauses: Vec<Clause>,
    pub classifications: Vec<Classification>,
    pub risk_assessments: Vec<RiskAssessment>,
    pub provenance: Vec<StageProvenance>,
    pub usage: UsageSummary,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("{stage} produced {actual} results for {expected} clauses")]
    LengthMismatch {
        stage: Stage,
        expected: usize,
        actual: usize,
    },

    #[error("{stage} result at position {position} refers to clause {clause_index}")]
    Misaligned {
        stage: Stage,
        position: usize,
        clause_index: usize,
    },

    #[error("Clause at position {position} has index {index}")]
    ClauseIndex { position: usize, index: usize },
}

/// Aggregates stage outputs into an `AnalysisResult`.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Check alignment and build the result.
    pub fn assemble(&self, parts: AnalysisParts) -> Result<AnalysisResult, AssemblyError> {
        self.check_alignment(&parts)?;

        let severity_buckets = self.bucket(&parts.risk_assessments);
        let totals = AnalysisTotals {
            total_clauses: parts.clauses.len(),
            high: severity_buckets.high.len(),
            medium: severity_buckets.medium.len(),
            low: severity_buckets.low.len(),
        };

        Ok(AnalysisResult {
            document: parts.document,
            clauses: parts.clauses,
            classifications: parts.classifications,
            risk_assessments: parts.risk_assessments,
            severity_buckets,
            totals,
            provenance: parts.provenance,
            usage: parts.usage,
            analyzed_at: Utc::now(),
        })
    }

    fn check_alignment(&self, parts: &AnalysisParts) -> Result<(), AssemblyError> {
        let expected = parts.clauses.len();

        if let Some((position, clause)) = parts
            .clauses
            .iter()
            .enumerate()
            .find(|(position, clause)| clause.index != *position)
        {
            return Err(AssemblyError::ClauseIndex {
                position,
                index: clause.index,
            });
        }

        check_stage(
            Stage::ClauseClassifier,
            expected,
            parts.classifications.iter().map(|c| c.clause_index),
        )?;
        check_stage(
            Stage::RiskDetector,
            expected,
            parts.risk_assessments.iter().map(|r| r.clause_index),
        )?;

        Ok(())
    }

    /// Group clause indices by severity, each list in clause order.
    fn bucket(&self, assessments: &[RiskAssessment]) -> SeverityBuckets {
        let mut buckets = SeverityBuckets::default();
        for assessment in assessments {
            let bucket = match assessment.severity {
                Severity::High => &mut buckets.high,
                Severity::Medium => &mut buckets.medium,
                Severity::Low => &mut buckets.low,
            };
            bucket.push(assessment.clause_index);
        }
        buckets
    }
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn check_stage(
    stage: Stage,
    expected: usize,
    indices: impl ExactSizeIterator<Item = usize>,
) -> Result<(), AssemblyError> {
    if indices.len() != expected {
        return Err(AssemblyError::LengthMismatch {
            stage,
            expected,
            actual: indices.len(),
        });
    }

    for (position, clause_index) in indices.enumerate() {
        if clause_index != position {
            return Err(AssemblyError::Misaligned {
                stage,
                position,
                clause_index,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, DocumentMetadata, DocumentType};
    use proptest::prelude::*;

    fn document() -> Document {
        Document::new(
            "text",
            DocumentMetadata {
                document_type: DocumentType::MutualNda,
                parties: vec![],
                effective_date: None,
                summary: "Test".to_string(),
                key_observations: vec![],
            },
        )
    }

    fn clause(index: usize) -> Clause {
        Clause {
            index,
            id: format!("clause_{}", index + 1),
            number: None,
            title: format!("Clause {}", index + 1),
            text: "Text".to_string(),
            span: None,
        }
    }

    fn classification(index: usize) -> Classification {
        Classification {
            clause_index: index,
            clause_id: format!("clause_{}", index + 1),
            category: Category::Miscellaneous,
            subcategory: None,
            confidence: 0.5,
            reasoning: String::new(),
        }
    }

    fn assessment(index: usize, severity: Severity) -> RiskAssessment {
        RiskAssessment {
            clause_index: index,
            clause_id: format!("clause_{}", index + 1),
            severity,
            risk_score: None,
            findings: vec![],
            recommendations: vec![],
            overall_assessment: None,
        }
    }

    fn parts(severities: &[Severity]) -> AnalysisParts {
        AnalysisParts {
            document: document(),
            clauses: (0..severities.len()).map(clause).collect(),
            classifications: (0..severities.len()).map(classification).collect(),
            risk_assessments: severities
                .iter()
                .enumerate()
                .map(|(i, s)| assessment(i, *s))
                .collect(),
            provenance: vec![],
            usage: UsageSummary::default(),
        }
    }

    #[test]
    fn test_buckets_and_totals() {
        let result = ResultAssembler::new()
            .assemble(parts(&[Severity::Low, Severity::High, Severity::Medium, Severity::High]))
            .unwrap();

        assert_eq!(result.severity_buckets.high, vec![1, 3]);
        assert_eq!(result.severity_buckets.medium, vec![2]);
        assert_eq!(result.severity_buckets.low, vec![0]);
        assert_eq!(result.totals.total_clauses, 4);
        assert_eq!(result.totals.high, 2);
        assert_eq!(result.high_risk_clauses().len(), 2);
    }

    #[test]
    fn test_empty_clause_list_assembles() {
        let result = ResultAssembler::new().assemble(parts(&[])).unwrap();
        assert_eq!(result.totals, AnalysisTotals::default());
    }

    #[test]
    fn test_missing_assessment_is_rejected() {
        let mut p = parts(&[Severity::Low, Severity::Low]);
        p.risk_assessments.pop();

        let err = ResultAssembler::new().assemble(p).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::LengthMismatch {
                stage: Stage::RiskDetector,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_swapped_classifications_are_rejected() {
        let mut p = parts(&[Severity::Low, Severity::Low]);
        p.classifications.swap(0, 1);

        let err = ResultAssembler::new().assemble(p).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Misaligned {
                stage: Stage::ClauseClassifier,
                position: 0,
                clause_index: 1
            }
        ));
    }

    #[test]
    fn test_clause_index_gap_is_rejected() {
        let mut p = parts(&[Severity::Low, Severity::Low]);
        p.clauses[1].index = 5;

        let err = ResultAssembler::new().assemble(p).unwrap_err();
        assert_eq!(err, AssemblyError::ClauseIndex { position: 1, index: 5 });
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop_oneof![Just(Severity::Low), Just(Severity::Medium), Just(Severity::High)]
    }

    proptest! {
        #[test]
        fn prop_buckets_partition_clauses(severities in prop::collection::vec(severity(), 0..40)) {
            let result = ResultAssembler::new().assemble(parts(&severities)).unwrap();

            let total = result.totals.high + result.totals.medium + result.totals.low;
            prop_assert_eq!(total, severities.len());
            prop_assert_eq!(result.classifications.len(), result.clauses.len());
            prop_assert_eq!(result.risk_assessments.len(), result.clauses.len());

            for sev in [Severity::Low, Severity::Medium, Severity::High] {
                let bucket = result.severity_buckets.get(sev);
                prop_assert!(bucket.windows(2).all(|w| w[0] < w[1]));
                for &i in bucket {
                    prop_assert_eq!(result.risk_assessments[i].severity, sev);
                }
            }
        }

        #[test]
        fn prop_any_dropped_result_is_rejected(
            severities in prop::collection::vec(severity(), 1..20),
            drop_at in any::<prop::sample::Index>(),
        ) {
            let mut p = parts(&severities);
            p.classifications.remove(drop_at.index(severities.len()));
            prop_assert!(ResultAssembler::new().assemble(p).is_err());
        }
    }
}

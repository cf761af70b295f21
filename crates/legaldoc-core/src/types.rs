//! Data model shared by every pipeline stage.
//!
//! All sequences produced after clause splitting are index-aligned with the
//! clause sequence: `classifications[i]` and `risk_assessments[i]` describe
//! `clauses[i]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A model-backed pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Infers document type, parties, and summary
    DocumentAnalyzer,

    /// Extracts operative clauses
    ClauseSplitter,

    /// Assigns a category to each clause
    ClauseClassifier,

    /// Scores the risk of each clause
    RiskDetector,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::DocumentAnalyzer,
        Stage::ClauseSplitter,
        Stage::ClauseClassifier,
        Stage::RiskDetector,
    ];

    /// Stable name, used for prompt lookup and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DocumentAnalyzer => "document_analyzer",
            Stage::ClauseSplitter => "clause_splitter",
            Stage::ClauseClassifier => "clause_classifier",
            Stage::RiskDetector => "risk_detector",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of agreement the document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Mutual_NDA")]
    MutualNda,

    #[serde(rename = "Unilateral_NDA")]
    UnilateralNda,

    #[serde(rename = "Other", alias = "Unknown")]
    Other,
}

impl DocumentType {
    /// Every spelling the schema accepts.
    pub const LABELS: &'static [&'static str] = &["Mutual_NDA", "Unilateral_NDA", "Other", "Unknown"];

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::MutualNda => "Mutual_NDA",
            DocumentType::UnilateralNda => "Unilateral_NDA",
            DocumentType::Other => "Other",
        }
    }
}

/// A party named in the agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// Name as stated in the document
    pub name: String,

    /// Role, e.g. "Disclosing Party"
    pub role: String,
}

/// Metadata inferred by the document analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_type: DocumentType,

    #[serde(default)]
    pub parties: Vec<Party>,

    #[serde(default)]
    pub effective_date: Option<String>,

    /// One-paragraph summary of purpose and scope
    pub summary: String,

    /// Notable structural or substantive observations
    #[serde(default)]
    pub key_observations: Vec<String>,
}

/// The analyzed document: raw text plus inferred metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Short context block injected into downstream prompts.
    pub fn context_summary(&self) -> String {
        let parties = if self.metadata.parties.is_empty() {
            "Unknown".to_string()
        } else {
            self.metadata
                .parties
                .iter()
                .map(|p| format!("{} ({})", p.name, p.role))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "Document Type: {}\nParties: {}\nSummary: {}",
            self.metadata.document_type.label(),
            parties,
            self.metadata.summary
        )
    }
}

/// Byte range into the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

/// A contiguous span of operative text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Position in the clause sequence (0-based, fixed after splitting)
    pub index: usize,

    /// Stable identifier, e.g. "clause_1"
    pub id: String,

    /// Section number as printed in the document, e.g. "2.1"
    #[serde(default)]
    pub number: Option<String>,

    pub title: String,

    /// Verbatim clause text
    pub text: String,

    /// Where the text was found in the document, if it could be located
    #[serde(default)]
    pub span: Option<TextSpan>,
}

/// Closed set of clause categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Definitions,
    Confidentiality,
    #[serde(rename = "Permitted Disclosures")]
    PermittedDisclosures,
    Obligations,
    #[serde(rename = "Term and Duration")]
    TermAndDuration,
    Termination,
    #[serde(rename = "Return of Materials")]
    ReturnOfMaterials,
    Remedies,
    Indemnification,
    #[serde(rename = "Non-Compete")]
    NonCompete,
    #[serde(rename = "Non-Solicitation")]
    NonSolicitation,
    #[serde(rename = "Governing Law")]
    GoverningLaw,
    #[serde(rename = "Dispute Resolution")]
    DisputeResolution,
    Notices,
    Assignment,
    Amendments,
    Severability,
    #[serde(rename = "Entire Agreement")]
    EntireAgreement,
    Waiver,
    Recitals,
    Execution,
    Miscellaneous,
}

impl Category {
    /// Schema labels, in declaration order.
    pub const LABELS: &'static [&'static str] = &[
        "Definitions",
        "Confidentiality",
        "Permitted Disclosures",
        "Obligations",
        "Term and Duration",
        "Termination",
        "Return of Materials",
        "Remedies",
        "Indemnification",
        "Non-Compete",
        "Non-Solicitation",
        "Governing Law",
        "Dispute Resolution",
        "Notices",
        "Assignment",
        "Amendments",
        "Severability",
        "Entire Agreement",
        "Waiver",
        "Recitals",
        "Execution",
        "Miscellaneous",
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Definitions => "Definitions",
            Category::Confidentiality => "Confidentiality",
            Category::PermittedDisclosures => "Permitted Disclosures",
            Category::Obligations => "Obligations",
            Category::TermAndDuration => "Term and Duration",
            Category::Termination => "Termination",
            Category::ReturnOfMaterials => "Return of Materials",
            Category::Remedies => "Remedies",
            Category::Indemnification => "Indemnification",
            Category::NonCompete => "Non-Compete",
            Category::NonSolicitation => "Non-Solicitation",
            Category::GoverningLaw => "Governing Law",
            Category::DisputeResolution => "Dispute Resolution",
            Category::Notices => "Notices",
            Category::Assignment => "Assignment",
            Category::Amendments => "Amendments",
            Category::Severability => "Severability",
            Category::EntireAgreement => "Entire Agreement",
            Category::Waiver => "Waiver",
            Category::Recitals => "Recitals",
            Category::Execution => "Execution",
            Category::Miscellaneous => "Miscellaneous",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category assigned to one clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub clause_index: usize,
    pub clause_id: String,
    pub category: Category,

    #[serde(default)]
    pub subcategory: Option<String>,

    /// Model confidence in [0.0, 1.0]
    pub confidence: f64,

    #[serde(default)]
    pub reasoning: String,
}

/// Risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const LABELS: &'static [&'static str] = &["LOW", "MEDIUM", "HIGH"];

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single named risk identified in a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub label: String,
    pub explanation: String,

    #[serde(default)]
    pub severity: Option<Severity>,

    /// Potential impact on the parties
    #[serde(default)]
    pub impact: Option<String>,
}

/// Risk assessment for one clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub clause_index: usize,
    pub clause_id: String,
    pub severity: Severity,

    #[serde(default)]
    pub risk_score: Option<f64>,

    #[serde(default)]
    pub findings: Vec<RiskFinding>,

    #[serde(default)]
    pub recommendations: Vec<String>,

    #[serde(default)]
    pub overall_assessment: Option<String>,
}

/// Clause indices grouped by severity, each list in clause order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBuckets {
    pub high: Vec<usize>,
    pub medium: Vec<usize>,
    pub low: Vec<usize>,
}

impl SeverityBuckets {
    pub fn get(&self, severity: Severity) -> &[usize] {
        match severity {
            Severity::High => &self.high,
            Severity::Medium => &self.medium,
            Severity::Low => &self.low,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTotals {
    pub total_clauses: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// One provider/model pair that served calls for a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedBy {
    pub provider: String,
    pub model: String,
    pub calls: usize,
}

/// Which providers produced a stage's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProvenance {
    pub stage: Stage,

    /// Serving providers, in order of first use
    pub served_by: Vec<ServedBy>,

    /// Provider failures that preceded a successful call
    pub fallback_failures: usize,
}

impl StageProvenance {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            served_by: Vec::new(),
            fallback_failures: 0,
        }
    }

    /// Record one successful call.
    pub fn record(&mut self, provider: &str, model: &str, prior_failures: usize) {
        self.fallback_failures += prior_failures;
        match self
            .served_by
            .iter_mut()
            .find(|s| s.provider == provider && s.model == model)
        {
            Some(entry) => entry.calls += 1,
            None => self.served_by.push(ServedBy {
                provider: provider.to_string(),
                model: model.to_string(),
                calls: 1,
            }),
        }
    }

    /// Total successful calls for the stage.
    pub fn calls(&self) -> usize {
        self.served_by.iter().map(|s| s.calls).sum()
    }
}

/// Token usage for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub llm_calls: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

/// The consolidated result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document: Document,
    pub clauses: Vec<Clause>,
    pub classifications: Vec<Classification>,
    pub risk_assessments: Vec<RiskAssessment>,
    pub severity_buckets: SeverityBuckets,
    pub totals: AnalysisTotals,
    pub provenance: Vec<StageProvenance>,
    pub usage: UsageSummary,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Clauses rated HIGH, paired with their assessment.
    pub fn high_risk_clauses(&self) -> Vec<(&Clause, &RiskAssessment)> {
        self.severity_buckets
            .high
            .iter()
            .map(|&i| (&self.clauses[i], &self.risk_assessments[i]))
            .collect()
    }

    pub fn provenance_for(&self, stage: Stage) -> Option<&StageProvenance> {
        self.provenance.iter().find(|p| p.stage == stage)
    }
}

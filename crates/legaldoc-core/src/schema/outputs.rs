//! Typed stage outputs as returned by a model, before pipeline bookkeeping.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::coerce::{
    boolean_field, canonical_label, canonicalize_field, numeric_field, rename_key, string_field,
};
use super::{SchemaId, StructuredOutput};
use crate::types::{
    Category, Classification, Clause, DocumentMetadata, DocumentType, RiskAssessment,
    RiskFinding, Severity,
};

impl StructuredOutput for DocumentMetadata {
    const SCHEMA: SchemaId = SchemaId::DocumentAnalysis;

    fn coerce(raw: &mut JsonValue) {
        if let Some(obj) = raw.as_object_mut() {
            canonicalize_field(obj, "document_type", DocumentType::LABELS);
        }
    }
}

/// One entry of the splitter's clause list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedClause {
    #[serde(default)]
    pub clause_number: Option<String>,

    pub clause_title: String,

    pub clause_text: String,

    /// False when the model judged the span to be preamble, recitals, or signatures
    #[serde(default = "default_operative")]
    pub operative: bool,
}

fn default_operative() -> bool {
    true
}

/// Clause splitter output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitterOutput {
    pub clauses: Vec<ExtractedClause>,
}

impl StructuredOutput for SplitterOutput {
    const SCHEMA: SchemaId = SchemaId::ClauseSplit;

    fn coerce(raw: &mut JsonValue) {
        let Some(clauses) = raw.get_mut("clauses").and_then(JsonValue::as_array_mut) else {
            return;
        };

        for clause in clauses.iter_mut().filter_map(JsonValue::as_object_mut) {
            rename_key(clause, "title", "clause_title");
            rename_key(clause, "text", "clause_text");
            string_field(clause, "clause_number");
            boolean_field(clause, "operative");
        }
    }
}

/// Clause classifier output for a single clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    #[serde(default)]
    pub clause_id: Option<String>,

    pub category: Category,

    #[serde(default)]
    pub subcategory: Option<String>,

    pub confidence: f64,

    #[serde(default)]
    pub reasoning: String,
}

impl StructuredOutput for ClassificationOutput {
    const SCHEMA: SchemaId = SchemaId::Classification;

    fn coerce(raw: &mut JsonValue) {
        if let Some(obj) = raw.as_object_mut() {
            canonicalize_field(obj, "category", Category::LABELS);
            numeric_field(obj, "confidence");
        }
    }
}

impl ClassificationOutput {
    /// Attach the output to the clause it was produced for.
    ///
    /// The clause index always comes from the input clause, never the model.
    pub fn into_classification(self, clause: &Clause) -> Classification {
        if let Some(reported) = self.clause_id.as_deref() {
            if reported != clause.id {
                tracing::debug!(
                    expected = %clause.id,
                    reported,
                    "Classifier reported a different clause id"
                );
            }
        }

        Classification {
            clause_index: clause.index,
            clause_id: clause.id.clone(),
            category: self.category,
            subcategory: self.subcategory,
            confidence: self.confidence,
            reasoning: self.reasoning,
        }
    }
}

/// Risk detector output for a single clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOutput {
    #[serde(default)]
    pub clause_id: Option<String>,

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

/// Canonicalize a severity field, reading "NONE" as LOW.
fn coerce_severity(obj: &mut serde_json::Map<String, JsonValue>, key: &str) {
    let is_none = obj
        .get(key)
        .and_then(JsonValue::as_str)
        .is_some_and(|s| canonical_label(s, &["NONE"]).is_some());

    if is_none {
        obj.insert(key.to_string(), JsonValue::String(Severity::Low.label().to_string()));
    }
    canonicalize_field(obj, key, Severity::LABELS);
}

impl StructuredOutput for RiskOutput {
    const SCHEMA: SchemaId = SchemaId::RiskAssessment;

    fn coerce(raw: &mut JsonValue) {
        let Some(obj) = raw.as_object_mut() else {
            return;
        };

        rename_key(obj, "risk_level", "severity");
        rename_key(obj, "identified_risks", "findings");
        coerce_severity(obj, "severity");
        numeric_field(obj, "risk_score");

        if let Some(findings) = obj.get_mut("findings").and_then(JsonValue::as_array_mut) {
            for finding in findings.iter_mut().filter_map(JsonValue::as_object_mut) {
                rename_key(finding, "risk_type", "label");
                rename_key(finding, "description", "explanation");
                coerce_severity(finding, "severity");
            }
        }
    }
}

impl RiskOutput {
    /// Attach the output to the clause it was produced for.
    pub fn into_assessment(self, clause: &Clause) -> RiskAssessment {
        RiskAssessment {
            clause_index: clause.index,
            clause_id: clause.id.clone(),
            severity: self.severity,
            risk_score: self.risk_score,
            findings: self.findings,
            recommendations: self.recommendations,
            overall_assessment: self.overall_assessment,
        }
    }
}

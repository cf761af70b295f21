//! Structured output contracts for every model-backed stage.
//!
//! Raw model output never reaches downstream code directly. Each stage's
//! result type implements [`StructuredOutput`] and goes through three steps:
//!
//! 1. stage-specific coercion (enum spellings, numeric strings, alias keys)
//! 2. JSON Schema validation against the embedded `schemas/*.schema.json`
//! 3. typed deserialization
//!
//! Any failure is reported as a [`SchemaViolation`] naming every offending
//! field and the constraint it broke.

mod coerce;
mod outputs;
mod registry;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

pub use coerce::extract_json;
pub use outputs::{ClassificationOutput, ExtractedClause, RiskOutput, SplitterOutput};
pub use registry::{json_schema, SchemaId};

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// JSON pointer to the field ("" for the document root, "$" for unparseable text)
    pub field: String,

    /// The violated constraint, in words
    pub constraint: String,
}

/// Model output that could not be coerced into its stage contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub schema: SchemaId,
    pub violations: Vec<FieldViolation>,
}

impl SchemaViolation {
    /// A violation with a single offending field.
    pub fn single(schema: SchemaId, field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            schema,
            violations: vec![FieldViolation {
                field: field.into(),
                constraint: constraint.into(),
            }],
        }
    }

    /// Human-readable list used when asking a model to correct itself.
    pub fn describe(&self) -> String {
        self.violations
            .iter()
            .map(|v| {
                let field = if v.field.is_empty() { "<root>" } else { v.field.as_str() };
                format!("- {}: {}", field, v.constraint)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} output violates its schema", self.schema)?;
        for (i, v) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{} ({})", sep, v.constraint, v.field)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaViolation {}

/// A stage result with a closed, validated shape.
pub trait StructuredOutput: DeserializeOwned + Send + Sized + 'static {
    /// Embedded schema this type is validated against.
    const SCHEMA: SchemaId;

    /// Normalize common model deviations in place before validation.
    fn coerce(_raw: &mut JsonValue) {}
}

/// Validate a raw JSON value against `T`'s contract.
///
/// Pure: the input is not modified, coercion works on a copy.
pub fn validate<T: StructuredOutput>(raw: &JsonValue) -> Result<T, SchemaViolation> {
    let mut value = raw.clone();
    T::coerce(&mut value);
    registry::check(T::SCHEMA, &value)?;

    serde_json::from_value(value)
        .map_err(|e| SchemaViolation::single(T::SCHEMA, "", e.to_string()))
}

/// Extract JSON from model text and validate it against `T`'s contract.
pub fn parse_response<T: StructuredOutput>(text: &str) -> Result<T, SchemaViolation> {
    let raw = extract_json(text, T::SCHEMA)?;
    validate(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, DocumentMetadata, DocumentType, Severity};
    use serde_json::json;

    #[test]
    fn test_valid_document_analysis() {
        let raw = json!({
            "document_type": "Mutual_NDA",
            "parties": [{ "name": "Acme Corp", "role": "Disclosing Party" }],
            "summary": "Mutual NDA covering product roadmaps."
        });

        let metadata: DocumentMetadata = validate(&raw).unwrap();
        assert_eq!(metadata.document_type, DocumentType::MutualNda);
        assert_eq!(metadata.parties.len(), 1);
        assert!(metadata.key_observations.is_empty());
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let raw = json!({ "document_type": "Mutual_NDA" });

        let err = validate::<DocumentMetadata>(&raw).unwrap_err();
        assert_eq!(err.schema, SchemaId::DocumentAnalysis);
        assert!(err.violations.iter().any(|v| v.constraint.contains("summary")));
    }

    #[test]
    fn test_out_of_range_confidence_is_reported_with_field() {
        let raw = json!({
            "category": "Confidentiality",
            "confidence": 1.7,
            "reasoning": "Defines confidential information."
        });

        let err = validate::<ClassificationOutput>(&raw).unwrap_err();
        assert!(err.violations.iter().any(|v| v.field == "/confidence"));
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let raw = json!({ "category": "Pizza", "confidence": 0.4 });

        let err = validate::<ClassificationOutput>(&raw).unwrap_err();
        assert!(err.violations.iter().any(|v| v.field == "/category"));
    }

    #[test]
    fn test_mistyped_field_is_rejected() {
        let raw = json!({ "clauses": "one, two, three" });

        let err = validate::<SplitterOutput>(&raw).unwrap_err();
        assert_eq!(err.schema, SchemaId::ClauseSplit);
        assert!(err.violations.iter().any(|v| v.field == "/clauses"));
    }

    #[test]
    fn test_coercion_fixes_casing_and_numeric_strings() {
        let raw = json!({
            "category": "term and duration",
            "confidence": "0.85",
            "reasoning": "Sets the agreement term."
        });

        let output: ClassificationOutput = validate(&raw).unwrap();
        assert_eq!(output.category, Category::TermAndDuration);
        assert!((output.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_does_not_mutate_input() {
        let raw = json!({ "category": "confidentiality", "confidence": 0.9 });
        let before = raw.clone();
        let _ = validate::<ClassificationOutput>(&raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_parse_response_accepts_fenced_json() {
        let text = "Here is the assessment:\n```json\n{\"severity\": \"high\", \"findings\": []}\n```";

        let output: RiskOutput = parse_response(text).unwrap();
        assert_eq!(output.severity, Severity::High);
    }

    #[test]
    fn test_parse_response_rejects_prose() {
        let err = parse_response::<RiskOutput>("I could not assess this clause.").unwrap_err();
        assert_eq!(err.violations[0].field, "$");
    }

    #[test]
    fn test_describe_lists_every_violation() {
        let raw = json!({ "category": "Pizza", "confidence": 3 });
        let err = validate::<ClassificationOutput>(&raw).unwrap_err();

        let described = err.describe();
        assert!(described.contains("/category"));
        assert!(described.contains("/confidence"));
    }
}

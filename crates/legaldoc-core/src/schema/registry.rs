//! Embedded JSON Schemas, compiled once and reused.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::OnceLock;

use super::{FieldViolation, SchemaViolation};

const DOCUMENT_ANALYSIS_SCHEMA: &str = include_str!("../../schemas/document_analysis.schema.json");
const CLAUSE_SPLIT_SCHEMA: &str = include_str!("../../schemas/clause_split.schema.json");
const CLASSIFICATION_SCHEMA: &str = include_str!("../../schemas/classification.schema.json");
const RISK_ASSESSMENT_SCHEMA: &str = include_str!("../../schemas/risk_assessment.schema.json");

/// Identifies one stage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaId {
    DocumentAnalysis,
    ClauseSplit,
    Classification,
    RiskAssessment,
}

impl SchemaId {
    pub const ALL: [SchemaId; 4] = [
        SchemaId::DocumentAnalysis,
        SchemaId::ClauseSplit,
        SchemaId::Classification,
        SchemaId::RiskAssessment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchemaId::DocumentAnalysis => "document_analysis",
            SchemaId::ClauseSplit => "clause_split",
            SchemaId::Classification => "classification",
            SchemaId::RiskAssessment => "risk_assessment",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            SchemaId::DocumentAnalysis => DOCUMENT_ANALYSIS_SCHEMA,
            SchemaId::ClauseSplit => CLAUSE_SPLIT_SCHEMA,
            SchemaId::Classification => CLASSIFICATION_SCHEMA,
            SchemaId::RiskAssessment => RISK_ASSESSMENT_SCHEMA,
        }
    }

    fn slot(&self) -> usize {
        match self {
            SchemaId::DocumentAnalysis => 0,
            SchemaId::ClauseSplit => 1,
            SchemaId::Classification => 2,
            SchemaId::RiskAssessment => 3,
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static DOCUMENTS: [OnceLock<Result<JsonValue, String>>; 4] =
    [OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new()];

static VALIDATORS: [OnceLock<Result<jsonschema::Validator, String>>; 4] =
    [OnceLock::new(), OnceLock::new(), OnceLock::new(), OnceLock::new()];

fn document(id: SchemaId) -> Result<&'static JsonValue, String> {
    DOCUMENTS[id.slot()]
        .get_or_init(|| {
            serde_json::from_str(id.source())
                .map_err(|e| format!("Invalid schema JSON for {}: {}", id, e))
        })
        .as_ref()
        .map_err(Clone::clone)
}

fn validator(id: SchemaId) -> Result<&'static jsonschema::Validator, String> {
    VALIDATORS[id.slot()]
        .get_or_init(|| {
            let schema = document(id)?;
            jsonschema::options()
                .build(schema)
                .map_err(|e| format!("Failed to compile schema {}: {}", id, e))
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// The JSON Schema document for a stage contract.
///
/// Providers that support native structured output send this with the request.
pub fn json_schema(id: SchemaId) -> Option<&'static JsonValue> {
    document(id).ok()
}

/// Check a value against a schema, collecting every violation.
pub(crate) fn check(id: SchemaId, value: &JsonValue) -> Result<(), SchemaViolation> {
    let validator =
        validator(id).map_err(|e| SchemaViolation::single(id, "$schema", e))?;

    let violations: Vec<FieldViolation> = validator
        .iter_errors(value)
        .map(|e| FieldViolation {
            field: e.instance_path.to_string(),
            constraint: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaViolation {
            schema: id,
            violations,
        })
    }
}

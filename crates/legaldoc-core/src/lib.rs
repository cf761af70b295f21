//! # legaldoc-core
//!
//! Typed stage contracts and deterministic result assembly for LegalDoc.
//!
//! This crate holds everything in the NDA analysis pipeline that does not
//! talk to a language model:
//! - The data model (`Document`, `Clause`, `Classification`, `RiskAssessment`, `AnalysisResult`)
//! - The schema layer that turns raw model output into validated, typed stage results
//! - Clause finalization (non-operative filtering, id assignment, span location)
//! - Result assembly with alignment checks
//!
//! ## Key Guarantees
//!
//! 1. **No LLM calls**: Model interaction lives in `legaldoc-runtime`
//! 2. **Closed contracts**: Every stage result is validated against an embedded JSON Schema
//! 3. **Aligned output**: `classifications[i]` and `risk_assessments[i]` always describe `clauses[i]`
//!
//! ## Example
//!
//! ```rust,ignore
//! use legaldoc_core::schema::{parse_response, RiskOutput};
//!
//! let output: RiskOutput = parse_response(model_text)?;
//! let assessment = output.into_assessment(&clause);
//! ```

pub mod assembler;
pub mod clauses;
pub mod schema;
pub mod types;

// Re-export main types at crate root
pub use assembler::{AnalysisParts, AssemblyError, ResultAssembler};
pub use clauses::{finalize_clauses, is_introduction, is_operative, locate_span, SpanLocator};
pub use schema::{
    parse_response, validate, FieldViolation, SchemaId, SchemaViolation, StructuredOutput,
};
pub use types::{
    AnalysisResult, AnalysisTotals, Category, Classification, Clause, Document,
    DocumentMetadata, DocumentType, Party, RiskAssessment, RiskFinding, ServedBy, Severity,
    SeverityBuckets, Stage, StageProvenance, TextSpan, UsageSummary,
};

//! Stage agents for the NDA analysis pipeline.
//!
//! Each agent wraps a [`StageRunner`] for its stage contract. Agents hold
//! no per-run state; usage and provenance go to the [`RunLedger`] passed
//! into every call.

mod clause_classifier;
mod clause_splitter;
mod document_analyzer;
mod error;
mod risk_detector;
mod runner;

pub use clause_classifier::ClauseClassifier;
pub use clause_splitter::ClauseSplitter;
pub use document_analyzer::DocumentAnalyzer;
pub use error::{StageError, StageErrorKind};
pub use risk_detector::RiskDetector;
pub use runner::{RunLedger, StageRunner};

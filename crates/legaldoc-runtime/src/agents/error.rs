//! Stage agent errors.

use legaldoc_core::Stage;
use thiserror::Error;

use crate::prompts::PromptError;
use crate::resilience::FallbackError;

/// A stage could not produce its output.
#[derive(Error, Debug)]
#[error("{stage} failed: {kind}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub kind: StageErrorKind,
}

#[derive(Error, Debug)]
pub enum StageErrorKind {
    /// No provider produced a valid result
    #[error(transparent)]
    Provider(#[from] FallbackError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("received {actual} classifications for {expected} clauses")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("classification at position {position} refers to clause {clause_index}")]
    Misaligned { position: usize, clause_index: usize },
}

impl StageError {
    pub fn new(stage: Stage, kind: impl Into<StageErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    /// The fallback failure behind this error, if any.
    pub fn fallback(&self) -> Option<&FallbackError> {
        match &self.kind {
            StageErrorKind::Provider(e) => Some(e),
            _ => None,
        }
    }
}

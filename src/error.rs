//! Crate-level error taxonomy
//!
//! Individual trial failures are local and never abort a study; only
//! persistence errors and sustained evaluator unavailability escalate.

use thiserror::Error;

use crate::objective::EvalError;
use crate::safety::SafetyRejection;
use crate::space::SpaceError;
use crate::storage::StorageError;

/// Top-level error for engine operations
#[derive(Debug, Error)]
pub enum AfinarError {
    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Safety(#[from] SafetyRejection),

    #[error("trial evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("study {study_id} aborted after {consecutive_failures} consecutive evaluator failures")]
    StudyAborted {
        study_id: String,
        consecutive_failures: usize,
    },

    #[error("study not found: {0}")]
    StudyNotFound(String),

    #[error("no completed trials in study {0}")]
    NoCompletedTrials(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AfinarError>;

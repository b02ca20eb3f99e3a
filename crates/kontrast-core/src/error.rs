// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Kontrast.

use thiserror::Error;

use crate::types::TaskId;

/// Top-level error type for all Kontrast operations.
#[derive(Debug, Error)]
pub enum KontrastError {
    // -- Input validation --
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // -- Pipeline --
    #[error("stage '{stage}' failed: {reason}")]
    StageFailure { stage: String, reason: String },

    // -- Task orchestration --
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} was evicted before completion was observed")]
    Stale(TaskId),

    #[error("timed out waiting for task {0}")]
    Timeout(TaskId),

    // -- Collaborators --
    #[error("image codec error: {0}")]
    Codec(String),

    #[error("history log error: {0}")]
    History(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KontrastError {
    /// Build a `StageFailure` for the named pipeline stage.
    pub fn stage(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// Re-label an error as a failure of `stage`, keeping the original message.
    ///
    /// Errors that already name a stage are left untouched so the innermost
    /// stage is the one reported.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            Self::StageFailure { .. } => self,
            other => Self::stage(stage, other),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KontrastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_stage_keeps_innermost_stage() {
        let inner = KontrastError::stage("statistics", "empty buffer");
        let relabelled = inner.in_stage("noise_reduction");
        assert_eq!(
            relabelled.to_string(),
            "stage 'statistics' failed: empty buffer"
        );
    }

    #[test]
    fn in_stage_wraps_other_errors() {
        let err = KontrastError::InvalidInput("zero width".into()).in_stage("resize");
        match err {
            KontrastError::StageFailure { stage, reason } => {
                assert_eq!(stage, "resize");
                assert!(reason.contains("zero width"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

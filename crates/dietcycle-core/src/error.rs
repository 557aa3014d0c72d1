//! Error type shared by every engine operation.

use crate::recommend::RecommendError;

/// Result alias for engine operations.
pub type CycleResult<T> = std::result::Result<T, CycleError>;

/// Failures surfaced by the lifecycle engine.
///
/// `Validation` and `NotFound` are caller mistakes; `ExhaustedRecipes` and
/// `Upstream` come from the regeneration step and never undo writes that
/// were already committed before it ran.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error(
        "no new recipes available: every recipe the engine can offer has already been served \
         to this user; adjust preferences or meal type to widen the catalog"
    )]
    ExhaustedRecipes,

    #[error("recommendation engine failed: {0}")]
    Upstream(#[from] RecommendError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CycleError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

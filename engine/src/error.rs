//! Error types for the Quay engine.

use crate::ModelName;
use thiserror::Error;

/// All possible errors from the reconciliation core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("batch is scoped to model '{expected}' but contains '{got}'")]
    MixedBatch { expected: ModelName, got: ModelName },

    #[error("invalid payload for model '{model_id}': {reason}")]
    InvalidPayload { model_id: String, reason: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MixedBatch {
            expected: "Post".into(),
            got: "Comment".into(),
        };
        assert_eq!(
            err.to_string(),
            "batch is scoped to model 'Post' but contains 'Comment'"
        );

        let err = Error::InvalidPayload {
            model_id: "post-1".into(),
            reason: "payload must be a JSON object".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid payload for model 'post-1': payload must be a JSON object"
        );
    }
}

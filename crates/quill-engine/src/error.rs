use quill_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ExerciseError {
    /// Blank input, stage target out of range, self-pairing.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Student not on the roster, or name mismatch.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Roster is empty or otherwise unusable.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ExerciseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ExerciseError::NotFound(what),
            other => ExerciseError::Store(other),
        }
    }
}

impl ExerciseError {
    /// Short, stable classification used by callers and logs.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config",
            Self::Store(e) if e.is_conflict() => "conflict",
            Self::Store(_) => "store",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    /// True for errors caused by the caller rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Permission(_) | Self::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExerciseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: ExerciseError = StoreError::NotFound("session sess_x".into()).into();
        assert!(matches!(err, ExerciseError::NotFound(_)));
        assert_eq!(err.error_kind(), "not_found");
        assert!(err.is_client_error());
    }

    #[test]
    fn conflict_is_classified() {
        let err: ExerciseError = StoreError::Conflict {
            key: "sess_x".into(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(err.is_conflict());
        assert_eq!(err.error_kind(), "conflict");
        assert!(!err.is_client_error());
    }

    #[test]
    fn other_store_errors_stay_wrapped() {
        let err: ExerciseError = StoreError::Database("locked".into()).into();
        assert_eq!(err.error_kind(), "store");
        assert!(err.to_string().contains("locked"));
    }
}

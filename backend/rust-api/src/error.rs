use thiserror::Error;

/// Error kinds surfaced by the attempt engine and its collaborators.
///
/// `Exhausted` is not a failure: it marks the end of question iteration and
/// callers translate it into a normal "finished" result.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("no more questions")]
    Exhausted,

    #[error("{effect} failed")]
    DependencyFailure {
        effect: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0}")]
    Validation(String),

    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CoreError::InvalidState(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        CoreError::Forbidden(message.into())
    }

    pub fn dependency(effect: &'static str, source: impl Into<anyhow::Error>) -> Self {
        CoreError::DependencyFailure {
            effect,
            source: source.into(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, CoreError::Exhausted)
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidState(_) => "invalid_state",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::Exhausted => "exhausted",
            CoreError::DependencyFailure { .. } => "dependency_failure",
            CoreError::Validation(_) => "validation_error",
            CoreError::Storage(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Storage(err)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_hide_their_detail() {
        let err = CoreError::from(anyhow::anyhow!("connection refused on 10.0.0.5"));
        assert_eq!(err.to_string(), "storage failure");
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn exhausted_is_distinguished() {
        assert!(CoreError::Exhausted.is_exhausted());
        assert!(!CoreError::not_found("attempt").is_exhausted());
        assert_eq!(CoreError::not_found("attempt").to_string(), "attempt not found");
    }
}

use thiserror::Error;

/// Errors surfaced synchronously to callers of the service layer.
///
/// Validation and authorization failures are hard-rejected before any
/// mutation; infrastructure failures are wrapped as `Other`.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("not authorized")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Wrap a connection-pool or other infrastructure failure.
    pub fn db(err: impl std::fmt::Display) -> Self {
        DomainError::Other(anyhow::anyhow!("database error: {}", err))
    }
}

impl From<diesel::result::Error> for DomainError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => DomainError::NotFound,
            other => DomainError::Other(other.into()),
        }
    }
}

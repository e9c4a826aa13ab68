//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::exception::ApiException;
use crate::handler::Caught;

/// Boxed error used for opaque collaborator failures (list sources, foreign errors)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// `InvalidInput` marks programmer errors raised while building feedback,
/// exceptions or responses. `OutOfRange` is the only client-input error: it
/// carries the 416 [`ApiException`] that should replace the response being built.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Malformed feedback, status, name or message collection
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid `page` / `per_page` request argument (416)
    #[error("Out of range: {0}")]
    OutOfRange(Box<ApiException>),

    /// A lazy list source failed to count or fetch its items
    #[error("List source error: {0}")]
    Source(BoxError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tracing subscriber could not be installed
    #[error("Observability error: {0}")]
    Observability(String),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// HTTP status this error renders with
    pub fn status(&self) -> StatusCode {
        match self {
            Error::OutOfRange(exception) => exception.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error was caused by the client's request arguments
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::OutOfRange(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        Caught::from(self).into_response()
    }
}

// Manual From implementation for the boxed configuration error
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackMode;

    #[test]
    fn test_invalid_input_is_server_error() {
        let error = Error::invalid("name cannot be empty");
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.is_client_error());
        assert_eq!(error.to_string(), "Invalid input: name cannot be empty");
    }

    #[test]
    fn test_out_of_range_keeps_exception_status() {
        let exception = ApiException::abort(
            FeedbackMode::Feedback,
            &Default::default(),
            416,
            "invalid page argument, min:1 max:3",
        )
        .unwrap();
        let error = Error::OutOfRange(Box::new(exception));
        assert_eq!(error.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(error.is_client_error());
    }
}

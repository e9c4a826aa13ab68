//! Structured API errors
//!
//! An [`ApiException`] is what every failure turns into before it is sent:
//! an error status, a primary message, and optional per-field secondary
//! messages. It serializes to the failure envelope body:
//!
//! ```json
//! {
//!   "status": 422,
//!   "error": {"type": "error", "message": "validation failed", "description": "..."},
//!   "errors": {"email": [{"type": "error", "message": "...", "description": "..."}]}
//! }
//! ```

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::config::ErrorCatalog;
use crate::error::{Error, Result};
use crate::exceptions::{Exception, ExceptionKind, API_EXCEPTION};
use crate::feedback::{Feedback, FeedbackMode, Message, Messages};
use crate::handler::Caught;

/// An error ready to be rendered as an API failure
#[derive(Debug)]
pub struct ApiException {
    status: StatusCode,
    error: Message,
    errors: Option<Messages>,
    mode: FeedbackMode,
    source: Option<Box<dyn Exception>>,
}

impl ApiException {
    /// Create an exception with an error status (400 to 599)
    ///
    /// In [`FeedbackMode::Feedback`] `error` must be a [`Feedback`]; in plain
    /// mode a feedback is reduced to its message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a status outside `400..600` or an
    /// `error` that does not fit `mode`.
    pub fn new(mode: FeedbackMode, status: u16, error: impl Into<Message>) -> Result<Self> {
        if !(400..600).contains(&status) {
            return Err(Error::invalid(format!(
                "status must be an error code (400 to 599), got {status}"
            )));
        }
        let status = StatusCode::from_u16(status)
            .map_err(|_| Error::invalid(format!("invalid status {status}")))?;

        Ok(Self {
            status,
            error: mode.coerce(error.into())?,
            errors: None,
            mode,
            source: None,
        })
    }

    /// Wrap a plain message into an error feedback with the generic description
    ///
    /// # Errors
    ///
    /// Same as [`ApiException::new`], plus an empty `message`.
    pub fn abort(
        mode: FeedbackMode,
        catalog: &ErrorCatalog,
        status: u16,
        message: impl Into<String>,
    ) -> Result<Self> {
        let feedback = Feedback::error(message, catalog.generic.as_str())?;
        Self::new(mode, status, feedback)
    }

    /// 500 internal server error
    pub fn internal(mode: FeedbackMode, catalog: &ErrorCatalog) -> Self {
        let feedback = Feedback::internal(&catalog.generic);
        let error = match mode {
            FeedbackMode::Feedback => Message::Feedback(feedback),
            FeedbackMode::Plain => Message::Text(feedback.message().to_string()),
        };

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
            errors: None,
            mode,
            source: None,
        }
    }

    /// Attach secondary messages; empty lists are dropped
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a message does not fit the mode.
    pub fn with_errors(mut self, errors: Messages) -> Result<Self> {
        self.errors = errors.normalize(self.mode)?;
        Ok(self)
    }

    /// Chain the exception this one was produced from
    #[must_use]
    pub fn with_source(self, source: impl Exception) -> Self {
        self.with_boxed_source(Box::new(source))
    }

    #[must_use]
    pub fn with_boxed_source(mut self, source: Box<dyn Exception>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error(&self) -> &Message {
        &self.error
    }

    pub fn errors(&self) -> Option<&Messages> {
        self.errors.as_ref()
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    /// The exception this one was produced from, if any
    pub fn cause(&self) -> Option<&dyn Exception> {
        self.source.as_deref()
    }

    pub fn take_cause(&mut self) -> Option<Box<dyn Exception>> {
        self.source.take()
    }

    /// `{status, error, errors}` as JSON
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for ApiException {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiException", 3)?;
        state.serialize_field("status", &self.status.as_u16())?;
        state.serialize_field("error", &self.error)?;
        state.serialize_field("errors", &self.errors)?;
        state.end()
    }
}

impl fmt::Display for ApiException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.error.text())
    }
}

impl std::error::Error for ApiException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source.as_error() as &(dyn std::error::Error + 'static))
    }
}

impl Exception for ApiException {
    fn kind(&self) -> &'static ExceptionKind {
        &API_EXCEPTION
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}

/// Rendered by the `catch_exceptions` middleware with the configured envelope
impl IntoResponse for ApiException {
    fn into_response(self) -> Response {
        Caught::from(self).into_response()
    }
}

//! Integration with axum
//!
//! - [`Envelope`] is the composition root: configuration plus the selected
//!   [`ExceptionWrapper`]. Share it as router state.
//! - Handlers return `Result<_, Caught>`; `?` turns any [`Exception`],
//!   crate [`Error`] or `anyhow::Error` into a [`Caught`].
//! - The [`catch_exceptions`] middleware renders caught exceptions: the JSON
//!   envelope for API requests, a plain-text status line for the rest.
//!
//! # Example
//!
//! ```rust,no_run
//! use acton_envelope::prelude::*;
//! use axum::{extract::{Path, State}, middleware::from_fn_with_state, routing::get, Router};
//! use serde_json::json;
//!
//! struct User;
//!
//! async fn show_user(
//!     State(envelope): State<Envelope>,
//!     Path(id): Path<u64>,
//! ) -> std::result::Result<ApiResponse, Caught> {
//!     if id != 1 {
//!         return Err(ModelNotFoundException::of::<User>().with_ids([id]).into());
//!     }
//!     Ok(envelope.success(200, "user", json!({"id": 1}), None, Default::default())?)
//! }
//!
//! # async fn run() -> acton_envelope::error::Result<()> {
//! let envelope = Envelope::load()?;
//! let handler = ExceptionHandler::new(envelope.clone());
//!
//! let app: Router = Router::new()
//!     .route("/api/users/{id}", get(show_user))
//!     .layer(from_fn_with_state(handler, catch_exceptions))
//!     .with_state(envelope);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::config::EnvelopeConfig;
use crate::error::{BoxError, Error, Result};
use crate::exception::ApiException;
use crate::exceptions::{self, Exception, UnhandledException};
use crate::feedback::Messages;
use crate::pagination::PageRequest;
use crate::response::{ApiResponse, Payload};
use crate::wrapper::{ExceptionWrapper, RegistryWrapper};

/// Configuration and exception wrapper, shared by every request
#[derive(Clone)]
pub struct Envelope {
    config: Arc<EnvelopeConfig>,
    wrapper: Arc<dyn ExceptionWrapper>,
}

impl Envelope {
    /// Envelope with the built-in wrapper
    pub fn new(config: EnvelopeConfig) -> Self {
        Self::builder(config).build()
    }

    /// Envelope from the configuration files and environment
    pub fn load() -> Result<Self> {
        Ok(Self::new(EnvelopeConfig::load()?))
    }

    pub fn builder(config: EnvelopeConfig) -> EnvelopeBuilder {
        EnvelopeBuilder {
            config,
            wrapper: None,
            named: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    pub fn shared_config(&self) -> Arc<EnvelopeConfig> {
        Arc::clone(&self.config)
    }

    /// See [`ApiResponse::success`]
    pub fn success(
        &self,
        status: u16,
        name: impl Into<String>,
        data: impl Into<Payload>,
        feedback: Option<Messages>,
        metadata: Map<String, Value>,
    ) -> Result<ApiResponse> {
        ApiResponse::success(
            self.shared_config(),
            status,
            name,
            data,
            feedback,
            metadata,
        )
    }

    /// See [`ApiResponse::success_paginated`]
    pub fn success_paginated(
        &self,
        status: u16,
        name: impl Into<String>,
        data: impl Into<Payload>,
        feedback: Option<Messages>,
        metadata: Map<String, Value>,
        request: PageRequest,
    ) -> Result<ApiResponse> {
        ApiResponse::success_paginated(
            self.shared_config(),
            status,
            name,
            data,
            feedback,
            metadata,
            request,
        )
    }

    pub fn failure(&self, exception: ApiException) -> ApiResponse {
        ApiResponse::failure(self.shared_config(), exception)
    }

    pub fn wrap(&self, exception: Box<dyn Exception>) -> ApiException {
        self.wrapper.wrap(exception, &self.config)
    }

    /// Wrap `exception` and build its failure response
    pub fn respond(&self, exception: Box<dyn Exception>) -> ApiResponse {
        self.failure(self.wrap(exception))
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(EnvelopeConfig::default())
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Envelope`]
///
/// Wrappers registered under a name can be selected with the
/// `exception_wrapper` configuration key.
pub struct EnvelopeBuilder {
    config: EnvelopeConfig,
    wrapper: Option<Arc<dyn ExceptionWrapper>>,
    named: HashMap<String, Arc<dyn ExceptionWrapper>>,
}

impl EnvelopeBuilder {
    /// Replace the built-in wrapper
    #[must_use]
    pub fn wrapper(mut self, wrapper: impl ExceptionWrapper + 'static) -> Self {
        self.wrapper = Some(Arc::new(wrapper));
        self
    }

    /// Make a wrapper selectable by name
    #[must_use]
    pub fn named_wrapper(
        mut self,
        name: impl Into<String>,
        wrapper: impl ExceptionWrapper + 'static,
    ) -> Self {
        self.named.insert(name.into(), Arc::new(wrapper));
        self
    }

    pub fn build(mut self) -> Envelope {
        let default = self
            .wrapper
            .take()
            .unwrap_or_else(|| Arc::new(RegistryWrapper::new()));

        let wrapper = match &self.config.exception_wrapper {
            Some(name) => match self.named.remove(name) {
                Some(wrapper) => {
                    tracing::info!(wrapper = %name, "Using configured exception wrapper");
                    wrapper
                }
                None => {
                    tracing::warn!(
                        wrapper = %name,
                        "Unknown exception wrapper, using the default one"
                    );
                    default
                }
            },
            None => default,
        };

        Envelope {
            config: Arc::new(self.config),
            wrapper,
        }
    }
}

/// Decides whether a request is an API request
pub type ApiPredicate = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Renders exceptions that reached the API boundary
#[derive(Clone)]
pub struct ExceptionHandler {
    envelope: Envelope,
    is_api: ApiPredicate,
}

impl ExceptionHandler {
    /// Handler treating [`expects_json`] requests as API requests
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            is_api: Arc::new(expects_json),
        }
    }

    #[must_use]
    pub fn with_predicate<F>(mut self, is_api: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        self.is_api = Arc::new(is_api);
        self
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn is_api_request(&self, parts: &Parts) -> bool {
        (self.is_api)(parts)
    }

    /// Wrap the exception and render the failure envelope
    pub fn render_api_error(&self, exception: Box<dyn Exception>) -> Response {
        self.envelope.respond(exception).into_response()
    }

    /// Render for the request: envelope for API requests, plain text otherwise
    pub fn render(&self, parts: &Parts, exception: Box<dyn Exception>) -> Response {
        self.render_for(self.is_api_request(parts), exception)
    }

    fn render_for(&self, api: bool, exception: Box<dyn Exception>) -> Response {
        if api {
            return self.render_api_error(exception);
        }

        let status = self.envelope.wrap(exception).status();
        let text = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
    }
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandler")
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

/// Requests under `/api` or accepting JSON
pub fn expects_json(parts: &Parts) -> bool {
    let path = parts.uri.path();
    if path == "/api" || path.starts_with("/api/") {
        return true;
    }

    parts
        .headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("json"))
}

/// Middleware rendering exceptions returned through [`Caught`]
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/users", get(list_users))
///     .layer(from_fn_with_state(handler, catch_exceptions));
/// ```
pub async fn catch_exceptions(
    State(handler): State<ExceptionHandler>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let api = handler.is_api_request(&parts);

    let mut response = next.run(Request::from_parts(parts, body)).await;

    match response
        .extensions_mut()
        .remove::<PendingException>()
        .and_then(PendingException::take)
    {
        Some(exception) => handler.render_for(api, exception),
        None => response,
    }
}

/// Exception parked in response extensions until [`catch_exceptions`] renders it
#[derive(Clone)]
struct PendingException(Arc<Mutex<Option<Box<dyn Exception>>>>);

impl PendingException {
    fn new(exception: Box<dyn Exception>) -> Self {
        Self(Arc::new(Mutex::new(Some(exception))))
    }

    fn take(self) -> Option<Box<dyn Exception>> {
        let mut slot = self.0.lock().ok()?;
        slot.take()
    }
}

/// Error type for handlers
///
/// Without the [`catch_exceptions`] middleware only the status is sent.
#[derive(Debug)]
pub struct Caught(Box<dyn Exception>);

impl Caught {
    pub fn new(exception: impl Exception) -> Self {
        Self(Box::new(exception))
    }

    /// Recover a built-in exception from an opaque error
    pub fn from_error(error: BoxError) -> Self {
        Self(exceptions::from_error(error))
    }

    pub fn exception(&self) -> &dyn Exception {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn Exception> {
        self.0
    }
}

impl<E: Exception> From<E> for Caught {
    fn from(exception: E) -> Self {
        Self(Box::new(exception))
    }
}

impl From<Box<dyn Exception>> for Caught {
    fn from(exception: Box<dyn Exception>) -> Self {
        Self(exception)
    }
}

impl From<Error> for Caught {
    fn from(err: Error) -> Self {
        match err {
            Error::OutOfRange(exception) => Self(exception),
            other => {
                tracing::debug!(error = %other, "Crate error reached the API boundary");
                Self(Box::new(UnhandledException::new(other)))
            }
        }
    }
}

impl From<anyhow::Error> for Caught {
    fn from(err: anyhow::Error) -> Self {
        Self(exceptions::from_anyhow(err))
    }
}

impl IntoResponse for Caught {
    fn into_response(self) -> Response {
        let status = self
            .0
            .status_code()
            .filter(|status| status.is_client_error() || status.is_server_error())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = status.into_response();
        response
            .extensions_mut()
            .insert(PendingException::new(self.0));
        response
    }
}

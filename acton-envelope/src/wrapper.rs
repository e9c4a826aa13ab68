//! Mapping of caught exceptions to [`ApiException`]s
//!
//! [`RegistryWrapper`] keeps an ordered list of `(kind, handler)` pairs. An
//! exception is resolved to the handler registered for its exact kind, or
//! else to the registered supertype with the smallest ancestor distance. When
//! two supertypes are equally close, the earlier registration wins. Nothing
//! matching means the fallback handler (500 by default).
//!
//! # Example
//!
//! ```rust
//! use acton_envelope::config::EnvelopeConfig;
//! use acton_envelope::exceptions::{AuthenticationException, AUTHENTICATION_EXCEPTION};
//! use acton_envelope::wrapper::{ExceptionWrapper, RegistryWrapper};
//! use axum::http::StatusCode;
//!
//! let wrapper = RegistryWrapper::new().register(&AUTHENTICATION_EXCEPTION, |_, context| {
//!     context.error(StatusCode::FORBIDDEN, "session expired")
//! });
//!
//! let config = EnvelopeConfig::default();
//! let exception = wrapper.wrap(Box::new(AuthenticationException::default()), &config);
//! assert_eq!(exception.status(), StatusCode::FORBIDDEN);
//! ```

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::case::snake_case;
use crate::config::{EnvelopeConfig, ErrorCatalog};
use crate::error::Result;
use crate::exception::ApiException;
use crate::exceptions::{
    Exception, ExceptionKind, AUTHENTICATION_EXCEPTION, HTTP_EXCEPTION, HTTP_RESPONSE_EXCEPTION,
    MODEL_NOT_FOUND_EXCEPTION, NOT_FOUND_HTTP_EXCEPTION, VALIDATION_EXCEPTION,
};
use crate::feedback::{Feedback, FeedbackMode, Messages};

/// Turns any caught exception into an [`ApiException`]
///
/// Implementations never fail: whatever cannot be mapped becomes a 500.
pub trait ExceptionWrapper: Send + Sync {
    fn wrap(&self, exception: Box<dyn Exception>, config: &EnvelopeConfig) -> ApiException;
}

/// What a handler needs from the configuration
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    config: &'a EnvelopeConfig,
}

impl<'a> HandlerContext<'a> {
    pub fn new(config: &'a EnvelopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'a EnvelopeConfig {
        self.config
    }

    pub fn mode(&self) -> FeedbackMode {
        self.config.feedback_mode()
    }

    pub fn catalog(&self) -> &'a ErrorCatalog {
        &self.config.messages
    }

    /// Exception with an error feedback pairing `message` with the catalog
    /// line for `status`
    ///
    /// # Errors
    ///
    /// Fails when `status` is not an error status or `message` is empty.
    pub fn error(&self, status: StatusCode, message: impl Into<String>) -> Result<ApiException> {
        let feedback = Feedback::error(message, self.catalog().for_status(status))?;
        ApiException::new(self.mode(), status.as_u16(), feedback)
    }
}

/// Maps one exception to an [`ApiException`]
pub type Handler =
    Arc<dyn Fn(&dyn Exception, &HandlerContext<'_>) -> Result<ApiException> + Send + Sync>;

/// Ordered `(kind, handler)` registry with best-match resolution
#[derive(Clone)]
pub struct RegistryWrapper {
    handlers: Vec<(&'static ExceptionKind, Handler)>,
    fallback: Handler,
}

impl RegistryWrapper {
    /// Registry holding the built-in handlers
    pub fn new() -> Self {
        Self::empty()
            .register(&HTTP_EXCEPTION, http_status)
            .register(&NOT_FOUND_HTTP_EXCEPTION, route_not_found)
            .register(&HTTP_RESPONSE_EXCEPTION, http_status)
            .register(&MODEL_NOT_FOUND_EXCEPTION, model_not_found)
            .register(&AUTHENTICATION_EXCEPTION, unauthenticated)
            .register(&VALIDATION_EXCEPTION, validation_failed)
    }

    /// Registry with no handlers; everything goes to the fallback
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
            fallback: Arc::new(internal_error),
        }
    }

    /// Register `handler` for `kind` and its subtypes
    ///
    /// A handler already registered for `kind` is replaced in place;
    /// otherwise the new entry goes last.
    #[must_use]
    pub fn register<F>(mut self, kind: &'static ExceptionKind, handler: F) -> Self
    where
        F: Fn(&dyn Exception, &HandlerContext<'_>) -> Result<ApiException> + Send + Sync + 'static,
    {
        self.insert(kind, Arc::new(handler));
        self
    }

    pub fn insert(&mut self, kind: &'static ExceptionKind, handler: Handler) {
        match self.handlers.iter_mut().find(|(existing, _)| *existing == kind) {
            Some((_, slot)) => *slot = handler,
            None => self.handlers.push((kind, handler)),
        }
    }

    /// Replace the handler used when nothing matches
    #[must_use]
    pub fn fallback<F>(mut self, handler: F) -> Self
    where
        F: Fn(&dyn Exception, &HandlerContext<'_>) -> Result<ApiException> + Send + Sync + 'static,
    {
        self.fallback = Arc::new(handler);
        self
    }

    /// Registered kinds, in resolution order
    pub fn kinds(&self) -> impl Iterator<Item = &'static ExceptionKind> + '_ {
        self.handlers.iter().map(|(kind, _)| *kind)
    }

    /// Most specific registered kind for `kind`, with its handler
    pub fn resolve(&self, kind: &ExceptionKind) -> Option<(&'static ExceptionKind, &Handler)> {
        let mut best: Option<(usize, &(&'static ExceptionKind, Handler))> = None;
        for entry in &self.handlers {
            if let Some(distance) = kind.distance_to(entry.0) {
                if best.map_or(true, |(closest, _)| distance < closest) {
                    best = Some((distance, entry));
                }
            }
        }
        best.map(|(_, (registered, handler))| (*registered, handler))
    }

    fn run_fallback(&self, exception: &dyn Exception, context: &HandlerContext<'_>) -> ApiException {
        (self.fallback)(exception, context).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Fallback exception handler failed");
            ApiException::internal(context.mode(), context.catalog())
        })
    }
}

impl Default for RegistryWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegistryWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryWrapper")
            .field("handlers", &self.kinds().map(ExceptionKind::name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ExceptionWrapper for RegistryWrapper {
    fn wrap(&self, exception: Box<dyn Exception>, config: &EnvelopeConfig) -> ApiException {
        let exception = match exception.downcast::<ApiException>() {
            Ok(api_exception) => return *api_exception,
            Err(other) => other,
        };

        let context = HandlerContext::new(config);
        let wrapped = match self.resolve(exception.kind()) {
            Some((registered, handler)) => {
                tracing::debug!(
                    exception = exception.kind().name(),
                    handler = registered.name(),
                    "Resolved exception handler"
                );
                handler(exception.as_ref(), &context).unwrap_or_else(|err| {
                    tracing::warn!(
                        exception = exception.kind().name(),
                        handler = registered.name(),
                        error = %err,
                        "Exception handler failed, using fallback"
                    );
                    self.run_fallback(exception.as_ref(), &context)
                })
            }
            None => self.run_fallback(exception.as_ref(), &context),
        };

        if wrapped.status().is_server_error() {
            tracing::error!(
                exception = exception.kind().name(),
                error = %exception,
                "Unhandled exception"
            );
        }

        wrapped.with_boxed_source(exception)
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "error".to_string())
}

fn http_status(exception: &dyn Exception, context: &HandlerContext<'_>) -> Result<ApiException> {
    let status = exception
        .status_code()
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    context.error(status, reason_phrase(status))
}

fn route_not_found(_: &dyn Exception, context: &HandlerContext<'_>) -> Result<ApiException> {
    context.error(StatusCode::NOT_FOUND, "not found")
}

fn model_not_found(exception: &dyn Exception, context: &HandlerContext<'_>) -> Result<ApiException> {
    let model = exception
        .model()
        .map(snake_case)
        .unwrap_or_else(|| "resource".to_string());
    context.error(StatusCode::NOT_FOUND, format!("{model} not found"))
}

fn unauthenticated(_: &dyn Exception, context: &HandlerContext<'_>) -> Result<ApiException> {
    context.error(StatusCode::UNAUTHORIZED, "unauthorized")
}

fn validation_failed(
    exception: &dyn Exception,
    context: &HandlerContext<'_>,
) -> Result<ApiException> {
    let mut errors = Messages::new();
    if let Some(violations) = exception.violations() {
        for (field, failures) in violations.iter() {
            for failure in failures {
                let message = format!("{field} field {} rule failed", failure.describe());
                let description = match failure.message.as_str() {
                    "" => context.catalog().validation.as_str(),
                    text => text,
                };
                errors.push(field, Feedback::error(message, description)?);
            }
        }
    }

    context
        .error(StatusCode::UNPROCESSABLE_ENTITY, "validation failed")?
        .with_errors(errors)
}

fn internal_error(_: &dyn Exception, context: &HandlerContext<'_>) -> Result<ApiException> {
    Ok(ApiException::internal(context.mode(), context.catalog()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::{
        AuthenticationException, HttpException, HttpResponseException, ModelNotFoundException,
        NotFoundHttpException, RuleFailure, UnhandledException, ValidationException, Violations,
        EXCEPTION,
    };
    use crate::feedback::Message;
    use serde_json::json;
    use std::error::Error as _;

    static INVOICE_MISSING: ExceptionKind =
        ExceptionKind::extends("InvoiceMissing", &MODEL_NOT_FOUND_EXCEPTION);
    static GONE: ExceptionKind = ExceptionKind::extends("Gone", &NOT_FOUND_HTTP_EXCEPTION);

    #[derive(Debug, thiserror::Error)]
    #[error("invoice {0} is missing")]
    struct InvoiceMissing(u64);

    impl Exception for InvoiceMissing {
        fn kind(&self) -> &'static ExceptionKind {
            &INVOICE_MISSING
        }

        fn model(&self) -> Option<&str> {
            Some("InvoiceLine")
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("gone")]
    struct Gone;

    impl Exception for Gone {
        fn kind(&self) -> &'static ExceptionKind {
            &GONE
        }
    }

    fn wrap(wrapper: &RegistryWrapper, exception: impl Exception) -> ApiException {
        wrapper.wrap(Box::new(exception), &EnvelopeConfig::default())
    }

    fn message(exception: &ApiException) -> &str {
        exception.error().text()
    }

    #[test]
    fn test_api_exception_passes_through_unchanged() {
        let original = ApiException::new(FeedbackMode::Plain, 409, "already exists").unwrap();
        let wrapped = wrap(&RegistryWrapper::new(), original);
        assert_eq!(wrapped.status(), StatusCode::CONFLICT);
        assert_eq!(message(&wrapped), "already exists");
        assert!(wrapped.cause().is_none());
    }

    #[test]
    fn test_http_exception_uses_reason_phrase() {
        let wrapped = wrap(
            &RegistryWrapper::new(),
            HttpException::new(StatusCode::METHOD_NOT_ALLOWED),
        );
        assert_eq!(wrapped.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(message(&wrapped), "method not allowed");
        assert_eq!(
            wrapped.error().as_feedback().unwrap().description(),
            ErrorCatalog::default().generic
        );
    }

    #[test]
    fn test_unknown_reason_phrase() {
        let status = StatusCode::from_u16(499).unwrap();
        let wrapped = wrap(&RegistryWrapper::new(), HttpException::new(status));
        assert_eq!(message(&wrapped), "error");
    }

    #[test]
    fn test_route_not_found() {
        let wrapped = wrap(&RegistryWrapper::new(), NotFoundHttpException::for_path("/nope"));
        assert_eq!(wrapped.status(), StatusCode::NOT_FOUND);
        assert_eq!(message(&wrapped), "not found");
        assert_eq!(
            wrapped.error().as_feedback().unwrap().description(),
            ErrorCatalog::default().not_found
        );
    }

    #[test]
    fn test_response_exception_keeps_status() {
        let wrapped = wrap(
            &RegistryWrapper::new(),
            HttpResponseException::new(StatusCode::TOO_MANY_REQUESTS),
        );
        assert_eq!(wrapped.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_model_not_found() {
        let wrapped = wrap(&RegistryWrapper::new(), ModelNotFoundException::new("BlogPost"));
        assert_eq!(wrapped.status(), StatusCode::NOT_FOUND);
        assert_eq!(message(&wrapped), "blog_post not found");
    }

    #[test]
    fn test_subtype_resolves_to_nearest_registered_ancestor() {
        let wrapped = wrap(&RegistryWrapper::new(), InvoiceMissing(7));
        assert_eq!(wrapped.status(), StatusCode::NOT_FOUND);
        assert_eq!(message(&wrapped), "invoice_line not found");

        // NotFoundHttpException (distance 1) beats HttpException (distance 2)
        let wrapped = wrap(&RegistryWrapper::new(), Gone);
        assert_eq!(message(&wrapped), "not found");
    }

    #[test]
    fn test_exact_registration_beats_ancestor() {
        let wrapper = RegistryWrapper::new().register(&INVOICE_MISSING, |_, context| {
            context.error(StatusCode::GONE, "invoice archived")
        });
        let wrapped = wrap(&wrapper, InvoiceMissing(7));
        assert_eq!(wrapped.status(), StatusCode::GONE);
        assert_eq!(message(&wrapped), "invoice archived");
    }

    #[test]
    fn test_nearest_ancestor_wins_over_registration_order() {
        static LEFT: ExceptionKind = ExceptionKind::extends("Left", &EXCEPTION);
        static LEFT_CHILD: ExceptionKind = ExceptionKind::extends("LeftChild", &LEFT);

        #[derive(Debug, thiserror::Error)]
        #[error("left child")]
        struct LeftChild;

        impl Exception for LeftChild {
            fn kind(&self) -> &'static ExceptionKind {
                &LEFT_CHILD
            }
        }

        let wrapper = RegistryWrapper::empty()
            .register(&EXCEPTION, |_, context| context.error(StatusCode::CONFLICT, "root"))
            .register(&LEFT, |_, context| context.error(StatusCode::BAD_REQUEST, "left"));
        assert_eq!(message(&wrap(&wrapper, LeftChild)), "left");
    }

    #[test]
    fn test_override_replaces_default_in_place() {
        let wrapper = RegistryWrapper::new().register(&AUTHENTICATION_EXCEPTION, |_, context| {
            context.error(StatusCode::FORBIDDEN, "forbidden")
        });
        let kinds: Vec<_> = wrapper.kinds().map(ExceptionKind::name).collect();
        assert_eq!(
            kinds,
            [
                "HttpException",
                "NotFoundHttpException",
                "HttpResponseException",
                "ModelNotFoundException",
                "AuthenticationException",
                "ValidationException",
            ]
        );
        let wrapped = wrap(&wrapper, AuthenticationException::default());
        assert_eq!(wrapped.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_authentication() {
        let wrapped = wrap(&RegistryWrapper::new(), AuthenticationException::default());
        assert_eq!(wrapped.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(&wrapped), "unauthorized");
        assert_eq!(
            wrapped.error().as_feedback().unwrap().description(),
            ErrorCatalog::default().authentication
        );
    }

    #[test]
    fn test_validation_errors_per_field_and_rule() {
        let violations = Violations::new()
            .with(
                "email",
                RuleFailure::new("Required", "The email field is required."),
            )
            .with(
                "age",
                RuleFailure::new("Between", "The age must be between 18 and 99.")
                    .with_params(["18", "99"]),
            );

        let wrapped = wrap(&RegistryWrapper::new(), ValidationException::new(violations));
        assert_eq!(wrapped.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message(&wrapped), "validation failed");
        assert_eq!(
            serde_json::to_value(wrapped.errors().unwrap()).unwrap(),
            json!({
                "email": [{
                    "type": "error",
                    "message": "email field required rule failed",
                    "description": "The email field is required."
                }],
                "age": [{
                    "type": "error",
                    "message": "age field between:18,99 rule failed",
                    "description": "The age must be between 18 and 99."
                }]
            })
        );
    }

    #[test]
    fn test_validation_plain_mode() {
        let config = EnvelopeConfig {
            use_feedback: false,
            ..EnvelopeConfig::default()
        };
        let violations =
            Violations::new().with("email", RuleFailure::new("required", "Email is required."));
        let wrapped = RegistryWrapper::new().wrap(
            Box::new(ValidationException::new(violations)),
            &config,
        );

        assert_eq!(wrapped.error(), &Message::from("validation failed"));
        assert_eq!(
            wrapped.errors().unwrap().get("email").unwrap(),
            [Message::from("email field required rule failed")]
        );
    }

    #[test]
    fn test_unregistered_falls_back_to_internal_error() {
        let wrapped = wrap(
            &RegistryWrapper::new(),
            UnhandledException::new(std::io::Error::other("connection reset")),
        );
        assert_eq!(wrapped.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message(&wrapped), "internal server error");
        assert_eq!(wrapped.source().unwrap().to_string(), "connection reset");
    }

    #[test]
    fn test_failing_handler_uses_fallback() {
        // a 3xx status cannot become an ApiException
        let wrapped = wrap(
            &RegistryWrapper::new(),
            HttpException::new(StatusCode::FOUND),
        );
        assert_eq!(wrapped.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_custom_fallback() {
        let wrapper = RegistryWrapper::empty().fallback(|exception, context| {
            context.error(StatusCode::SERVICE_UNAVAILABLE, exception.to_string())
        });
        let wrapped = wrap(&wrapper, AuthenticationException::new("try later"));
        assert_eq!(wrapped.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message(&wrapped), "try later");
    }
}

//! Exception types understood by the exception wrapper
//!
//! Every error that may reach the API boundary implements [`Exception`]. Its
//! [`ExceptionKind`] places it in a closed supertype hierarchy declared with
//! `static`s, which the [`RegistryWrapper`](crate::wrapper::RegistryWrapper)
//! walks to find the most specific registered handler.
//!
//! ```text
//! Exception
//! ├── ApiException
//! ├── HttpException
//! │   └── NotFoundHttpException
//! ├── HttpResponseException
//! ├── ModelNotFoundException
//! ├── AuthenticationException
//! └── ValidationException
//! ```
//!
//! Application exceptions declare their own kind below any of these:
//!
//! ```rust
//! use acton_envelope::exceptions::{Exception, ExceptionKind, MODEL_NOT_FOUND_EXCEPTION};
//!
//! static INVOICE_MISSING: ExceptionKind =
//!     ExceptionKind::extends("InvoiceMissing", &MODEL_NOT_FOUND_EXCEPTION);
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("invoice {0} does not exist")]
//! struct InvoiceMissing(u64);
//!
//! impl Exception for InvoiceMissing {
//!     fn kind(&self) -> &'static ExceptionKind {
//!         &INVOICE_MISSING
//!     }
//!
//!     fn model(&self) -> Option<&str> {
//!         Some("Invoice")
//!     }
//! }
//!
//! assert_eq!(INVOICE_MISSING.distance_to(&MODEL_NOT_FOUND_EXCEPTION), Some(1));
//! ```

use std::any::Any;
use std::fmt;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
};

use crate::case::class_basename;
use crate::error::BoxError;
use crate::exception::ApiException;

/// Position of an exception type in the supertype hierarchy
///
/// Kinds compare by name, so names must be unique within a process.
#[derive(Debug)]
pub struct ExceptionKind {
    name: &'static str,
    parent: Option<&'static ExceptionKind>,
}

impl ExceptionKind {
    /// A kind with no supertype
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// A kind directly below `parent`
    pub const fn extends(name: &'static str, parent: &'static ExceptionKind) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static ExceptionKind> {
        self.parent
    }

    /// This kind followed by each of its supertypes, nearest first
    pub fn lineage(&self) -> impl Iterator<Item = &ExceptionKind> {
        std::iter::successors(Some(self), |kind| kind.parent.map(|parent| parent as &ExceptionKind))
    }

    /// Number of parent hops from this kind up to `ancestor`
    ///
    /// `Some(0)` for the kind itself, `None` when `ancestor` is not a supertype.
    pub fn distance_to(&self, ancestor: &ExceptionKind) -> Option<usize> {
        self.lineage().position(|kind| kind == ancestor)
    }

    /// Whether this kind is `other` or one of its subtypes
    pub fn is_a(&self, other: &ExceptionKind) -> bool {
        self.distance_to(other).is_some()
    }
}

impl PartialEq for ExceptionKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ExceptionKind {}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub static EXCEPTION: ExceptionKind = ExceptionKind::root("Exception");
pub static API_EXCEPTION: ExceptionKind = ExceptionKind::extends("ApiException", &EXCEPTION);
pub static HTTP_EXCEPTION: ExceptionKind = ExceptionKind::extends("HttpException", &EXCEPTION);
pub static NOT_FOUND_HTTP_EXCEPTION: ExceptionKind =
    ExceptionKind::extends("NotFoundHttpException", &HTTP_EXCEPTION);
pub static HTTP_RESPONSE_EXCEPTION: ExceptionKind =
    ExceptionKind::extends("HttpResponseException", &EXCEPTION);
pub static MODEL_NOT_FOUND_EXCEPTION: ExceptionKind =
    ExceptionKind::extends("ModelNotFoundException", &EXCEPTION);
pub static AUTHENTICATION_EXCEPTION: ExceptionKind =
    ExceptionKind::extends("AuthenticationException", &EXCEPTION);
pub static VALIDATION_EXCEPTION: ExceptionKind =
    ExceptionKind::extends("ValidationException", &EXCEPTION);

/// Type-erasure helpers, implemented for every sized error type
pub trait ErasedException: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static);
}

impl<T> ErasedException for T
where
    T: std::error::Error + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }
}

/// An error that can be turned into an [`ApiException`]
///
/// The accessors expose what the built-in handlers read; subtypes of a
/// built-in kind override the ones their parent handler needs.
pub trait Exception: std::error::Error + ErasedException {
    fn kind(&self) -> &'static ExceptionKind;

    /// HTTP status carried by the exception, if any
    fn status_code(&self) -> Option<StatusCode> {
        None
    }

    /// Type name of the resource that could not be found
    fn model(&self) -> Option<&str> {
        None
    }

    /// Validator output
    fn violations(&self) -> Option<&Violations> {
        None
    }
}

impl<'a> dyn Exception + 'a {
    pub fn is<T: Exception>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Exception>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Move the concrete exception out, or get the box back unchanged
    pub fn downcast<T: Exception>(self: Box<Self>) -> Result<Box<T>, Box<Self>> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.into_any().downcast::<T>() {
            Ok(concrete) => Ok(concrete),
            Err(_) => unreachable!("concrete type checked above"),
        }
    }
}

/// Generic exception carrying an HTTP status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpException {
    status: StatusCode,
    message: Option<String>,
}

impl HttpException {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.status, message),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for HttpException {}

impl Exception for HttpException {
    fn kind(&self) -> &'static ExceptionKind {
        &HTTP_EXCEPTION
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}

/// No route matched the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotFoundHttpException {
    path: Option<String>,
}

impl NotFoundHttpException {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for NotFoundHttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "No route found for {path}"),
            None => f.write_str("No route found"),
        }
    }
}

impl std::error::Error for NotFoundHttpException {}

impl Exception for NotFoundHttpException {
    fn kind(&self) -> &'static ExceptionKind {
        &NOT_FOUND_HTTP_EXCEPTION
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(StatusCode::NOT_FOUND)
    }
}

/// A response was already built upstream; only its status is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseException {
    status: StatusCode,
}

impl HttpResponseException {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

impl fmt::Display for HttpResponseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response already built with status {}", self.status)
    }
}

impl std::error::Error for HttpResponseException {}

impl Exception for HttpResponseException {
    fn kind(&self) -> &'static ExceptionKind {
        &HTTP_RESPONSE_EXCEPTION
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}

/// A lookup for a single resource found nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNotFoundException {
    model: String,
    ids: Vec<String>,
}

impl ModelNotFoundException {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ids: Vec::new(),
        }
    }

    /// Use the short name of `T` as the model name
    pub fn of<T: ?Sized>() -> Self {
        Self::new(class_basename(std::any::type_name::<T>()))
    }

    #[must_use]
    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.ids = ids.into_iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl fmt::Display for ModelNotFoundException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No query results for model [{}]", self.model)?;
        if !self.ids.is_empty() {
            write!(f, " {}", self.ids.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ModelNotFoundException {}

impl Exception for ModelNotFoundException {
    fn kind(&self) -> &'static ExceptionKind {
        &MODEL_NOT_FOUND_EXCEPTION
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

/// The request is not authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationException {
    message: String,
}

impl AuthenticationException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for AuthenticationException {
    fn default() -> Self {
        Self::new("Unauthenticated.")
    }
}

impl fmt::Display for AuthenticationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AuthenticationException {}

impl Exception for AuthenticationException {
    fn kind(&self) -> &'static ExceptionKind {
        &AUTHENTICATION_EXCEPTION
    }
}

/// One failed rule for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule: String,
    pub params: Vec<String>,
    pub message: String,
}

impl RuleFailure {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            params: Vec::new(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// `rule` lower-cased, followed by `:param,param` when there are parameters
    pub fn describe(&self) -> String {
        let rule = self.rule.to_lowercase();
        if self.params.is_empty() {
            rule
        } else {
            format!("{rule}:{}", self.params.join(","))
        }
    }
}

/// Validator output: failing fields in evaluation order, each with its failed rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations {
    fields: Vec<(String, Vec<RuleFailure>)>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, failure: RuleFailure) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, failures)) => failures.push(failure),
            None => self.fields.push((field, vec![failure])),
        }
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, failure: RuleFailure) -> Self {
        self.add(field, failure);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RuleFailure])> {
        self.fields
            .iter()
            .map(|(field, failures)| (field.as_str(), failures.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Request data failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationException {
    violations: Violations,
}

impl ValidationException {
    pub fn new(violations: Violations) -> Self {
        Self { violations }
    }
}

impl fmt::Display for ValidationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The given data was invalid ({} field(s))",
            self.violations.len()
        )
    }
}

impl std::error::Error for ValidationException {}

impl Exception for ValidationException {
    fn kind(&self) -> &'static ExceptionKind {
        &VALIDATION_EXCEPTION
    }

    fn violations(&self) -> Option<&Violations> {
        Some(&self.violations)
    }
}

/// Any other error; only the fallback handler matches it
#[derive(Debug)]
pub struct UnhandledException(BoxError);

impl UnhandledException {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(error.into())
    }

    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

impl fmt::Display for UnhandledException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for UnhandledException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl Exception for UnhandledException {
    fn kind(&self) -> &'static ExceptionKind {
        &EXCEPTION
    }
}

impl Exception for JsonRejection {
    fn kind(&self) -> &'static ExceptionKind {
        &HTTP_EXCEPTION
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status())
    }
}

impl Exception for QueryRejection {
    fn kind(&self) -> &'static ExceptionKind {
        &HTTP_EXCEPTION
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status())
    }
}

type Recover = fn(BoxError) -> Result<Box<dyn Exception>, BoxError>;

fn recover<T: Exception>(error: BoxError) -> Result<Box<dyn Exception>, BoxError> {
    error
        .downcast::<T>()
        .map(|exception| exception as Box<dyn Exception>)
}

const KNOWN: [Recover; 9] = [
    recover::<ApiException>,
    recover::<HttpException>,
    recover::<NotFoundHttpException>,
    recover::<HttpResponseException>,
    recover::<ModelNotFoundException>,
    recover::<AuthenticationException>,
    recover::<ValidationException>,
    recover::<JsonRejection>,
    recover::<QueryRejection>,
];

/// Recover a built-in exception from an opaque error
///
/// Errors of any other type become an [`UnhandledException`].
pub fn from_error(error: BoxError) -> Box<dyn Exception> {
    let mut error = error;
    for attempt in KNOWN {
        match attempt(error) {
            Ok(exception) => return exception,
            Err(other) => error = other,
        }
    }
    Box::new(UnhandledException(error))
}

type RecoverAnyhow = fn(anyhow::Error) -> Result<Box<dyn Exception>, anyhow::Error>;

fn recover_anyhow<T: Exception>(error: anyhow::Error) -> Result<Box<dyn Exception>, anyhow::Error> {
    error
        .downcast::<T>()
        .map(|exception| Box::new(exception) as Box<dyn Exception>)
}

const KNOWN_ANYHOW: [RecoverAnyhow; 9] = [
    recover_anyhow::<ApiException>,
    recover_anyhow::<HttpException>,
    recover_anyhow::<NotFoundHttpException>,
    recover_anyhow::<HttpResponseException>,
    recover_anyhow::<ModelNotFoundException>,
    recover_anyhow::<AuthenticationException>,
    recover_anyhow::<ValidationException>,
    recover_anyhow::<JsonRejection>,
    recover_anyhow::<QueryRejection>,
];

/// [`from_error`] for `anyhow` errors, which hide their concrete type once boxed
pub fn from_anyhow(error: anyhow::Error) -> Box<dyn Exception> {
    let mut error = error;
    for attempt in KNOWN_ANYHOW {
        match attempt(error) {
            Ok(exception) => return exception,
            Err(other) => error = other,
        }
    }
    Box::new(UnhandledException(error.into()))
}

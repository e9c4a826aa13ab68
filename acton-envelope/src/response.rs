//! JSON envelope for success and failure responses
//!
//! Success:
//!
//! ```json
//! {"status": 200, "<name>": <data>, "feedback": {...} | null, "metadata": {"name": "<name>", ...}}
//! ```
//!
//! Failure (the [`ApiException`] body):
//!
//! ```json
//! {"status": 404, "error": {...}, "errors": {...} | null}
//! ```
//!
//! Every setter rebuilds the body immediately, so an [`ApiResponse`] is always
//! ready to be sent. A setter that fails leaves the response unchanged.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use acton_envelope::config::EnvelopeConfig;
//! use acton_envelope::response::ApiResponse;
//! use serde_json::json;
//!
//! let config = Arc::new(EnvelopeConfig::default());
//! let response = ApiResponse::success(
//!     config,
//!     201,
//!     "user",
//!     json!({"id": 1, "name": "A"}),
//!     None,
//!     Default::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     response.to_value(),
//!     json!({
//!         "status": 201,
//!         "user": {"id": 1, "name": "A"},
//!         "feedback": null,
//!         "metadata": {"name": "user"}
//!     })
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::case::{camel_case, transform_keys};
use crate::config::EnvelopeConfig;
use crate::error::{BoxError, Error, Result};
use crate::exception::ApiException;
use crate::feedback::Messages;
use crate::pagination::{PageRequest, Pagination};

/// Payload key used when none is given
pub const DEFAULT_NAME: &str = "data";

/// Keys the envelope itself uses; a payload name cannot be one of them
pub const RESERVED_NAMES: [&str; 5] = ["status", "feedback", "metadata", "error", "errors"];

/// A list whose items are fetched on demand, such as a database query
///
/// When the response is paginated only the requested page is fetched.
pub trait ListSource: Send + Sync {
    /// Total number of items
    fn count(&self) -> std::result::Result<u64, BoxError>;

    /// Items `offset..offset + limit`
    fn slice(&self, offset: u64, limit: u64) -> std::result::Result<Vec<Value>, BoxError>;

    /// Every item
    fn all(&self) -> std::result::Result<Vec<Value>, BoxError>;
}

/// Success payload
pub enum Payload {
    /// Any JSON value; never paginated
    Value(Value),
    /// In-memory list
    List(Vec<Value>),
    /// Lazily fetched list
    Source(Box<dyn ListSource>),
}

impl Payload {
    pub fn source(source: impl ListSource + 'static) -> Self {
        Self::Source(Box::new(source))
    }

    /// Serialize any value; arrays become lists
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(serde_json::to_value(value)?.into())
    }

    pub fn is_list(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    fn count(&self) -> Result<u64> {
        match self {
            Self::Value(_) => Ok(0),
            Self::List(items) => Ok(items.len() as u64),
            Self::Source(source) => source.count().map_err(Error::Source),
        }
    }

    fn render(&self, pagination: Option<&Pagination>) -> Result<Value> {
        match (self, pagination) {
            (Self::Value(value), _) => Ok(value.clone()),
            (Self::List(items), None) => Ok(Value::Array(items.clone())),
            (Self::List(items), Some(page)) => Ok(Value::Array(
                items
                    .iter()
                    .skip(page.offset() as usize)
                    .take(page.limit() as usize)
                    .cloned()
                    .collect(),
            )),
            (Self::Source(source), None) => source.all().map(Value::Array).map_err(Error::Source),
            (Self::Source(source), Some(page)) => source
                .slice(page.offset(), page.limit())
                .map(Value::Array)
                .map_err(Error::Source),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Value(Value::Null)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items),
            other => Self::Value(other),
        }
    }
}

impl From<Vec<Value>> for Payload {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Box<dyn ListSource>> for Payload {
    fn from(source: Box<dyn ListSource>) -> Self {
        Self::Source(source)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
            Self::Source(_) => f.write_str("Source(..)"),
        }
    }
}

/// The response envelope
#[derive(Debug)]
pub struct ApiResponse {
    config: Arc<EnvelopeConfig>,
    status: StatusCode,
    name: String,
    data: Payload,
    feedback: Option<Messages>,
    metadata: Map<String, Value>,
    paginated: bool,
    page_request: PageRequest,
    pagination: Option<Pagination>,
    api_exception: Option<ApiException>,
    headers: HeaderMap,
    pretty: bool,
    body: Value,
}

impl ApiResponse {
    fn blank(config: Arc<EnvelopeConfig>) -> Self {
        Self {
            config,
            status: StatusCode::OK,
            name: DEFAULT_NAME.to_string(),
            data: Payload::default(),
            feedback: None,
            metadata: Map::new(),
            paginated: false,
            page_request: PageRequest::default(),
            pagination: None,
            api_exception: None,
            headers: HeaderMap::new(),
            pretty: false,
            body: Value::Null,
        }
    }

    /// Build a success response
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a status outside `200..400`, an
    /// empty or reserved `name`, or feedback that does not fit the configured
    /// mode. Returns [`Error::Source`] if a lazy list fails.
    ///
    /// A [`Payload::Source`] is read in full here; use
    /// [`ApiResponse::success_paginated`] to fetch a single page.
    pub fn success(
        config: Arc<EnvelopeConfig>,
        status: u16,
        name: impl Into<String>,
        data: impl Into<Payload>,
        feedback: Option<Messages>,
        metadata: Map<String, Value>,
    ) -> Result<Self> {
        Self::build(config, status, name.into(), data.into(), feedback, metadata, None)
    }

    /// Build a paginated success response
    ///
    /// The envelope is built once, so a lazy source only has the requested
    /// page fetched.
    ///
    /// # Errors
    ///
    /// Same as [`ApiResponse::success`], plus [`Error::InvalidInput`] if the
    /// payload is not a list and [`Error::OutOfRange`] for invalid `page` /
    /// `per_page` values.
    pub fn success_paginated(
        config: Arc<EnvelopeConfig>,
        status: u16,
        name: impl Into<String>,
        data: impl Into<Payload>,
        feedback: Option<Messages>,
        metadata: Map<String, Value>,
        request: PageRequest,
    ) -> Result<Self> {
        Self::build(
            config,
            status,
            name.into(),
            data.into(),
            feedback,
            metadata,
            Some(request),
        )
    }

    fn build(
        config: Arc<EnvelopeConfig>,
        status: u16,
        name: String,
        data: Payload,
        feedback: Option<Messages>,
        metadata: Map<String, Value>,
        request: Option<PageRequest>,
    ) -> Result<Self> {
        let mut response = Self::blank(config);
        response.status = response.checked_status(status)?;
        response.name = checked_name(name)?;
        response.data = data;
        response.feedback = response.normalize_feedback(feedback)?;
        response.metadata = metadata;
        if let Some(request) = request {
            if !response.data.is_list() {
                return Err(Error::invalid("pagination requires a list"));
            }
            response.page_request = request;
            response.paginated = true;
        }
        response.rebuild()?;
        Ok(response)
    }

    /// Build a failure response; the status is taken from the exception
    pub fn failure(config: Arc<EnvelopeConfig>, exception: ApiException) -> Self {
        let mut response = Self::blank(config);
        response.status = exception.status();
        response.body = response.transform(failure_body(&exception));
        response.api_exception = Some(exception);
        response
    }

    /// Enable pagination with the request's arguments
    ///
    /// The envelope was already built once without pagination, so a lazy
    /// source has been read in full; prefer [`ApiResponse::success_paginated`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the payload is not a list and
    /// [`Error::OutOfRange`] for invalid `page` / `per_page` values.
    pub fn paginate(mut self, request: PageRequest) -> Result<Self> {
        if !self.data.is_list() {
            return Err(Error::invalid("pagination requires a list"));
        }
        self.page_request = request;
        self.paginated = true;
        self.rebuild()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Change the status; a failure response only accepts its exception's status
    pub fn set_status(&mut self, status: u16) -> Result<&mut Self> {
        let status = self.checked_status(status)?;
        let previous = std::mem::replace(&mut self.status, status);
        self.commit(move |response| response.status = previous)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<&mut Self> {
        let name = checked_name(name.into())?;
        let previous = std::mem::replace(&mut self.name, name);
        self.commit(move |response| response.name = previous)
    }

    /// Replace the payload; pagination stays on only for a list
    pub fn set_data(&mut self, data: impl Into<Payload>) -> Result<&mut Self> {
        let previous = std::mem::replace(&mut self.data, data.into());
        let was_paginated = self.paginated;
        self.paginated = self.paginated && self.data.is_list();
        self.commit(move |response| {
            response.data = previous;
            response.paginated = was_paginated;
        })
    }

    /// Replace the feedback; empty lists are dropped
    pub fn set_feedback(&mut self, feedback: Option<Messages>) -> Result<&mut Self> {
        let feedback = self.normalize_feedback(feedback)?;
        let previous = std::mem::replace(&mut self.feedback, feedback);
        self.commit(move |response| response.feedback = previous)
    }

    pub fn set_metadata(&mut self, metadata: Map<String, Value>) -> Result<&mut Self> {
        let previous = std::mem::replace(&mut self.metadata, metadata);
        self.commit(move |response| response.metadata = previous)
    }

    pub fn set_paginated(&mut self, paginated: bool) -> Result<&mut Self> {
        if paginated && !self.data.is_list() {
            return Err(Error::invalid("pagination requires a list"));
        }
        let previous = std::mem::replace(&mut self.paginated, paginated);
        self.commit(move |response| response.paginated = previous)
    }

    pub fn set_page_request(&mut self, request: PageRequest) -> Result<&mut Self> {
        let previous = std::mem::replace(&mut self.page_request, request);
        self.commit(move |response| response.page_request = previous)
    }

    /// Switch to failure mode, or back to success mode with `None`
    ///
    /// Leaving failure mode resets the status to 200.
    pub fn set_api_exception(&mut self, exception: Option<ApiException>) -> Result<&mut Self> {
        let previous_status = self.status;
        match &exception {
            Some(exception) => self.status = exception.status(),
            None if !is_success_status(self.status) => self.status = StatusCode::OK,
            None => {}
        }
        let previous = std::mem::replace(&mut self.api_exception, exception);
        self.commit(move |response| {
            response.status = previous_status;
            response.api_exception = previous;
        })
    }

    pub fn set_pretty(&mut self, pretty: bool) -> &mut Self {
        self.pretty = pretty;
        self
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn feedback(&self) -> Option<&Messages> {
        self.feedback.as_ref()
    }

    /// Caller-supplied metadata, without the computed keys
    pub fn user_metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Metadata as emitted: caller keys, `name`, and pagination keys
    pub fn metadata(&self) -> Map<String, Value> {
        self.metadata_map(self.pagination.as_ref())
    }

    /// Whether pagination applies (enabled and the payload is a list)
    pub fn is_paginated(&self) -> bool {
        self.paginated && self.data.is_list()
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    pub fn page_request(&self) -> &PageRequest {
        &self.page_request
    }

    pub fn api_exception(&self) -> Option<&ApiException> {
        self.api_exception.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.api_exception.is_none()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// The envelope as built by the last change
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn to_value(&self) -> Value {
        self.body.clone()
    }

    /// The envelope as JSON text, pretty-printed if enabled
    pub fn to_json(&self) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(&self.body)?
        } else {
            serde_json::to_string(&self.body)?
        };
        Ok(json)
    }

    fn checked_status(&self, status: u16) -> Result<StatusCode> {
        let code = StatusCode::from_u16(status)
            .map_err(|_| Error::invalid(format!("invalid status {status}")))?;

        match &self.api_exception {
            None if is_success_status(code) => Ok(code),
            None => Err(Error::invalid(format!(
                "invalid status {status} for success response"
            ))),
            Some(exception) if exception.status() == code => Ok(code),
            Some(exception) => Err(Error::invalid(format!(
                "invalid status {status} for failure response carrying {}",
                exception.status().as_u16()
            ))),
        }
    }

    fn normalize_feedback(&self, feedback: Option<Messages>) -> Result<Option<Messages>> {
        match feedback {
            Some(feedback) => feedback.normalize(self.config.feedback_mode()),
            None => Ok(None),
        }
    }

    fn commit(&mut self, undo: impl FnOnce(&mut Self)) -> Result<&mut Self> {
        match self.rebuild() {
            Ok(()) => Ok(self),
            Err(err) => {
                undo(self);
                Err(err)
            }
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        let (body, pagination) = match &self.api_exception {
            Some(exception) => (failure_body(exception), None),
            None => self.success_body()?,
        };
        self.pagination = pagination;
        self.body = self.transform(body);
        Ok(())
    }

    fn success_body(&self) -> Result<(Value, Option<Pagination>)> {
        let pagination = if self.is_paginated() {
            let count = self.data.count()?;
            Some(Pagination::resolve(
                count,
                &self.page_request,
                &self.config.page_bounds(),
                self.config.feedback_mode(),
                &self.config.messages,
            )?)
        } else {
            None
        };

        let mut body = Map::new();
        body.insert("status".to_string(), self.status.as_u16().into());
        body.insert(self.name.clone(), self.data.render(pagination.as_ref())?);
        body.insert("feedback".to_string(), serde_json::to_value(&self.feedback)?);
        body.insert(
            "metadata".to_string(),
            Value::Object(self.metadata_map(pagination.as_ref())),
        );

        Ok((Value::Object(body), pagination))
    }

    fn metadata_map(&self, pagination: Option<&Pagination>) -> Map<String, Value> {
        let mut metadata = self.metadata.clone();
        metadata.insert("name".to_string(), Value::String(self.name.clone()));

        if let Some(pagination) = pagination {
            let computed = [
                ("count", pagination.count),
                ("page_count", pagination.page_count),
                ("page", pagination.page),
                ("per_page", pagination.per_page),
            ];
            for (key, value) in computed {
                metadata.entry(key).or_insert(Value::from(value));
            }
        }

        metadata
    }

    fn transform(&self, body: Value) -> Value {
        if self.config.camel_case {
            transform_keys(body, &camel_case)
        } else {
            body
        }
    }
}

fn is_success_status(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

fn checked_name(name: String) -> Result<String> {
    if name.is_empty() {
        return Err(Error::invalid("name cannot be empty"));
    }
    if RESERVED_NAMES.contains(&name.as_str()) {
        return Err(Error::invalid(format!("{name} is a reserved name")));
    }
    Ok(name)
}

fn failure_body(exception: &ApiException) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), exception.status().as_u16().into());
    body.insert(
        "error".to_string(),
        serde_json::to_value(exception.error()).unwrap_or(Value::Null),
    );
    body.insert(
        "errors".to_string(),
        serde_json::to_value(exception.errors()).unwrap_or(Value::Null),
    );
    Value::Object(body)
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let body = match self.to_json() {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize response envelope");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut response = (self.status, body).into_response();
        response.headers_mut().extend(self.headers);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

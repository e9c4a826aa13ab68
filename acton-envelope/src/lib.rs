//! # acton-envelope
//!
//! Consistent JSON envelopes for axum APIs.
//!
//! ## Features
//!
//! - **Envelope**: `{status, <name>, feedback, metadata}` for success, `{status, error, errors}` for failure
//! - **Feedback**: typed messages pairing an internal message with a user-facing description
//! - **Exception mapping**: any error reaching a handler boundary becomes a structured 4xx/5xx error,
//!   resolved to the most specific registered handler
//! - **Pagination**: `page` / `per_page` query arguments, bounded and validated, pushed down to lazy lists
//! - **Configuration**: figment-based, from files and `ACTON_ENVELOPE_*` variables
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_envelope::prelude::*;
//! use axum::{extract::State, middleware::from_fn_with_state, routing::get, Router};
//! use serde_json::json;
//!
//! async fn list_items(
//!     State(envelope): State<Envelope>,
//!     page: PageRequest,
//! ) -> std::result::Result<ApiResponse, Caught> {
//!     let items: Vec<serde_json::Value> = (1..=42).map(|id| json!({"id": id})).collect();
//!     Ok(envelope.success_paginated(200, "items", items, None, Default::default(), page)?)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = EnvelopeConfig::load()?;
//!     init_tracing(&config)?;
//!
//!     let envelope = Envelope::new(config);
//!     let handler = ExceptionHandler::new(envelope.clone());
//!
//!     let app: Router = Router::new()
//!         .route("/api/items", get(list_items))
//!         .layer(from_fn_with_state(handler, catch_exceptions))
//!         .with_state(envelope);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//!     Ok(())
//! }
//! ```

pub mod case;
pub mod config;
pub mod error;
pub mod exception;
pub mod exceptions;
pub mod feedback;
pub mod handler;
pub mod observability;
pub mod pagination;
pub mod response;
pub mod wrapper;

pub mod prelude {
    pub use crate::config::{EnvelopeConfig, ErrorCatalog};
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::exception::ApiException;
    pub use crate::exceptions::{
        AuthenticationException, Exception, ExceptionKind, HttpException, HttpResponseException,
        ModelNotFoundException, NotFoundHttpException, RuleFailure, UnhandledException,
        ValidationException, Violations,
    };
    pub use crate::feedback::{Feedback, FeedbackMode, FeedbackType, Message, Messages};
    pub use crate::handler::{catch_exceptions, Caught, Envelope, ExceptionHandler};
    pub use crate::observability::init_tracing;
    pub use crate::pagination::{PageBounds, PageRequest, Pagination};
    pub use crate::response::{ApiResponse, ListSource, Payload};
    pub use crate::wrapper::{ExceptionWrapper, HandlerContext, RegistryWrapper};
}

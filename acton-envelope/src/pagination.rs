//! Pagination of list payloads
//!
//! Request arguments arrive as a [`PageRequest`] (raw `page` / `per_page`
//! values, already read from the query string). [`Pagination::resolve`]
//! checks them against the item count and the configured [`PageBounds`]:
//!
//! - `per_page` defaults to the configured default, must be positive, and is
//!   clamped into `[min, max]` (`min` wins if the bounds disagree)
//! - `page_count = ceil(count / per_page)`, or `1` for an empty list
//! - `page` defaults to 1 and must lie in `[1, page_count]`
//!
//! Invalid arguments produce a 416 [`ApiException`].
//!
//! # Example
//!
//! ```rust
//! use acton_envelope::pagination::{PageBounds, PageRequest, Pagination};
//! use acton_envelope::config::ErrorCatalog;
//! use acton_envelope::feedback::FeedbackMode;
//!
//! let request = PageRequest::new(Some(3), Some(10));
//! let pagination = Pagination::resolve(
//!     25,
//!     &request,
//!     &PageBounds::default(),
//!     FeedbackMode::Feedback,
//!     &ErrorCatalog::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(pagination.page_count, 3);
//! assert_eq!(pagination.offset(), 20);
//! ```

use std::collections::HashMap;

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};

use crate::config::{EnvelopeConfig, ErrorCatalog};
use crate::error::{Error, Result};
use crate::exception::ApiException;
use crate::feedback::FeedbackMode;
use crate::handler::Envelope;

/// HTTP status used for invalid pagination arguments
pub const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Raw pagination arguments of a request
///
/// `None` means the argument was absent. Values are kept signed so that
/// `page=0` or `per_page=-5` can be reported instead of silently wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageRequest {
    pub const fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self { page, per_page }
    }

    /// Read `page` and `per_page` from decoded query parameters
    ///
    /// Parameter names follow `camel_case` (`perPage`). Values are read as
    /// their leading integer (`2abc` is 2, `1.5` is 1); a value with no leading
    /// digits reads as `0` and is later rejected as out of range.
    pub fn from_params(params: &HashMap<String, String>, config: &EnvelopeConfig) -> Self {
        let read = |field: &str| {
            params
                .get(&config.query_field(field))
                .map(|raw| leading_int(raw))
        };

        Self {
            page: read("page"),
            per_page: read("per_page"),
        }
    }
}

impl<S> FromRequestParts<S> for PageRequest
where
    S: Send + Sync,
    Envelope: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let envelope = Envelope::from_ref(state);
        let params = match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
            Ok(Query(params)) => params,
            Err(rejection) => {
                tracing::debug!(
                    error = %rejection,
                    "Ignoring undecodable query string, using default pagination"
                );
                HashMap::new()
            }
        };

        Ok(Self::from_params(&params, envelope.config()))
    }
}

/// Leading integer of `raw`, saturating at the `i64` bounds
fn leading_int(raw: &str) -> i64 {
    let raw = raw.trim_start();
    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    let mut value: i64 = 0;
    for digit in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(digit - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Configured `per_page` limits, each at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub min: u64,
    pub max: u64,
    pub default: u64,
}

impl PageBounds {
    #[must_use]
    pub fn new(min: u64, max: u64, default: u64) -> Self {
        Self {
            min: min.max(1),
            max: max.max(1),
            default: default.max(1),
        }
    }

    /// Clamp a positive `per_page` into the bounds
    #[must_use]
    pub fn clamp(&self, per_page: u64) -> u64 {
        let mut per_page = per_page;
        if per_page > self.max {
            per_page = self.max;
        }
        if per_page < self.min {
            per_page = self.min;
        }
        per_page
    }
}

impl Default for PageBounds {
    fn default() -> Self {
        Self::new(10, 100, 10)
    }
}

/// Resolved pagination of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Total number of items in the list
    pub count: u64,
    /// Total number of pages (at least 1)
    pub page_count: u64,
    /// Current page (1-indexed)
    pub page: u64,
    /// Items per page
    pub per_page: u64,
}

impl Pagination {
    /// Validate request arguments against `count` items
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] carrying a 416 [`ApiException`] when
    /// `per_page <= 0`, `page <= 0` or `page > page_count`.
    pub fn resolve(
        count: u64,
        request: &PageRequest,
        bounds: &PageBounds,
        mode: FeedbackMode,
        catalog: &ErrorCatalog,
    ) -> Result<Self> {
        let requested = request
            .per_page
            .unwrap_or_else(|| i64::try_from(bounds.default).unwrap_or(i64::MAX));
        if requested <= 0 {
            return Err(out_of_range(
                mode,
                catalog,
                format!(
                    "invalid per_page argument, min:{} max:{}",
                    bounds.min, bounds.max
                ),
            ));
        }
        let per_page = bounds.clamp(requested as u64);

        let page_count = page_count(count, per_page);

        let page = request.page.unwrap_or(1);
        if page <= 0 || page as u64 > page_count {
            return Err(out_of_range(
                mode,
                catalog,
                format!("invalid page argument, min:1 max:{page_count}"),
            ));
        }

        Ok(Self {
            count,
            page_count,
            page: page as u64,
            per_page,
        })
    }

    /// Number of items to skip
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.per_page
    }

    /// Number of items to take
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

/// Number of pages for `count` items, rounding up; an empty list has one page
#[must_use]
pub fn page_count(count: u64, per_page: u64) -> u64 {
    if count == 0 {
        return 1;
    }
    let per_page = per_page.max(1);
    count.div_ceil(per_page)
}

fn out_of_range(mode: FeedbackMode, catalog: &ErrorCatalog, message: String) -> Error {
    tracing::debug!("Rejecting pagination arguments: {}", message);
    match ApiException::abort(mode, catalog, RANGE_NOT_SATISFIABLE, message) {
        Ok(exception) => Error::OutOfRange(Box::new(exception)),
        Err(err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn resolve(count: u64, page: Option<i64>, per_page: Option<i64>) -> Result<Pagination> {
        Pagination::resolve(
            count,
            &PageRequest::new(page, per_page),
            &PageBounds::default(),
            FeedbackMode::Feedback,
            &ErrorCatalog::default(),
        )
    }

    fn rejected_message(result: Result<Pagination>) -> String {
        match result {
            Err(Error::OutOfRange(exception)) => {
                assert_eq!(exception.status(), StatusCode::RANGE_NOT_SATISFIABLE);
                exception.error().text().to_string()
            }
            other => panic!("expected out of range, got {other:?}"),
        }
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(25, 10), 3);
        assert_eq!(page_count(20, 10), 2);
        assert_eq!(page_count(1, 10), 1);
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(0, 100), 1);
    }

    #[test]
    fn test_defaults() {
        let pagination = resolve(25, None, None).unwrap();
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.per_page, 10);
        assert_eq!(pagination.page_count, 3);
        assert_eq!(pagination.offset(), 0);
        assert_eq!(pagination.limit(), 10);
    }

    #[test]
    fn test_last_page_offset() {
        let pagination = resolve(25, Some(3), None).unwrap();
        assert_eq!(pagination.offset(), 20);
    }

    #[test]
    fn test_page_out_of_range() {
        assert_eq!(
            rejected_message(resolve(25, Some(0), None)),
            "invalid page argument, min:1 max:3"
        );
        assert_eq!(
            rejected_message(resolve(25, Some(4), None)),
            "invalid page argument, min:1 max:3"
        );
    }

    #[test]
    fn test_empty_list_has_one_page() {
        let pagination = resolve(0, Some(1), Some(50)).unwrap();
        assert_eq!(pagination.page_count, 1);
        assert!(resolve(0, Some(2), None).is_err());
    }

    #[test]
    fn test_per_page_clamped() {
        assert_eq!(resolve(500, None, Some(1000)).unwrap().per_page, 100);
        assert_eq!(resolve(500, None, Some(3)).unwrap().per_page, 10);
    }

    #[test]
    fn test_per_page_must_be_positive() {
        assert_eq!(
            rejected_message(resolve(25, None, Some(0))),
            "invalid per_page argument, min:10 max:100"
        );
        assert!(resolve(25, None, Some(-5)).is_err());
    }

    #[test]
    fn test_bad_per_page_reported_before_bad_page() {
        let message = rejected_message(resolve(25, Some(99), Some(0)));
        assert!(message.starts_with("invalid per_page"));
    }

    #[test]
    fn test_bounds_floor_and_min_wins() {
        let bounds = PageBounds::new(0, 0, 0);
        assert_eq!((bounds.min, bounds.max, bounds.default), (1, 1, 1));

        let inverted = PageBounds::new(50, 20, 10);
        assert_eq!(inverted.clamp(30), 50);
        assert_eq!(inverted.clamp(5), 50);
    }

    #[test]
    fn test_from_params() {
        let config = EnvelopeConfig::default();
        let params = HashMap::from([
            ("page".to_string(), "2".to_string()),
            ("per_page".to_string(), "25".to_string()),
        ]);
        assert_eq!(
            PageRequest::from_params(&params, &config),
            PageRequest::new(Some(2), Some(25))
        );

        let garbage = HashMap::from([("page".to_string(), "two".to_string())]);
        assert_eq!(
            PageRequest::from_params(&garbage, &config),
            PageRequest::new(Some(0), None)
        );
    }

    #[test]
    fn test_from_params_reads_leading_integer() {
        let config = EnvelopeConfig::default();
        let params = HashMap::from([
            ("page".to_string(), "2abc".to_string()),
            ("per_page".to_string(), "1.5".to_string()),
        ]);
        assert_eq!(
            PageRequest::from_params(&params, &config),
            PageRequest::new(Some(2), Some(1))
        );
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int(" 42"), 42);
        assert_eq!(leading_int("-5x"), -5);
        assert_eq!(leading_int("+7"), 7);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int(""), 0);
        assert_eq!(leading_int("-"), 0);
        assert_eq!(leading_int("99999999999999999999"), i64::MAX);
        assert_eq!(leading_int("-99999999999999999999"), i64::MIN);
    }

    #[test]
    fn test_huge_default_per_page_is_clamped() {
        let bounds = PageBounds::new(10, 100, u64::MAX);
        let pagination = Pagination::resolve(
            250,
            &PageRequest::default(),
            &bounds,
            FeedbackMode::Feedback,
            &ErrorCatalog::default(),
        )
        .unwrap();
        assert_eq!(pagination.per_page, 100);
        assert_eq!(pagination.page_count, 3);
    }

    #[tokio::test]
    async fn test_extractor_reads_query() {
        let envelope = Envelope::default();

        let (mut parts, _) = axum::http::Request::builder()
            .uri("/api/users?page=3&per_page=20")
            .body(())
            .unwrap()
            .into_parts();
        let request = PageRequest::from_request_parts(&mut parts, &envelope)
            .await
            .unwrap();
        assert_eq!(request, PageRequest::new(Some(3), Some(20)));

        let (mut parts, _) = axum::http::Request::builder()
            .uri("/api/users")
            .body(())
            .unwrap()
            .into_parts();
        let request = PageRequest::from_request_parts(&mut parts, &envelope)
            .await
            .unwrap();
        assert_eq!(request, PageRequest::default());
    }

    #[test]
    fn test_from_params_camel_case() {
        let config = EnvelopeConfig {
            camel_case: true,
            ..EnvelopeConfig::default()
        };
        let params = HashMap::from([
            ("perPage".to_string(), "30".to_string()),
            ("per_page".to_string(), "99".to_string()),
        ]);
        assert_eq!(
            PageRequest::from_params(&params, &config),
            PageRequest::new(None, Some(30))
        );
    }
}

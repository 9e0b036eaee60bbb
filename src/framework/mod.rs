//! # Host Framework
//!
//! A small synchronous web framework that the validation layer plugs into:
//! named routes with method predicates, views registered per route, and
//! exception views that turn raised errors into responses.
//!
//! Handlers return `Result<Response, HttpError>`. Both outcomes are
//! responses as far as response validation is concerned; an `HttpError` is
//! rendered first and validated afterwards.

mod request;
mod response;
mod router;

pub use request::{MatchedRoute, Request, DEFAULT_APPLICATION_URL};
pub use response::{status_reason, HttpError, Response};
pub use router::{canonical_pattern, captured_params, path_to_regex, Route, Router};

use crate::errors::{RequestValidationError, ResponseValidationError};
use http::Method;
use std::fmt;
use std::sync::Arc;

/// User handler: sees the request read-only, including validated data.
pub type Handler = Arc<dyn Fn(&Request) -> Result<Response, HttpError> + Send + Sync>;

/// A handler after view derivation. May mutate request-scoped state.
pub type View = Arc<dyn Fn(&mut Request) -> Result<Response, ViewError> + Send + Sync>;

/// Renders a raised error into a response.
pub type ExceptionView = Arc<dyn Fn(&Request, &ViewError) -> Response + Send + Sync>;

/// Root factory: derives the request context for routes that name it.
pub type RootFactory = Arc<dyn Fn(&Request) -> serde_json::Value + Send + Sync>;

/// Authorization policy consulted for views with a permission.
pub type AuthorizationPolicy = Arc<dyn Fn(&Request, &str) -> bool + Send + Sync>;

/// Everything a view can raise.
#[derive(Debug, Clone)]
pub enum ViewError {
    Http(HttpError),
    RequestValidation(RequestValidationError),
    ResponseValidation(ResponseValidationError),
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::Http(err) => write!(f, "{err}"),
            ViewError::RequestValidation(err) => write!(f, "{err}"),
            ViewError::ResponseValidation(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ViewError {}

impl From<HttpError> for ViewError {
    fn from(err: HttpError) -> Self {
        ViewError::Http(err)
    }
}

impl From<RequestValidationError> for ViewError {
    fn from(err: RequestValidationError) -> Self {
        ViewError::RequestValidation(err)
    }
}

impl From<ResponseValidationError> for ViewError {
    fn from(err: ResponseValidationError) -> Self {
        ViewError::ResponseValidation(err)
    }
}

/// Per-view registration options.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// The view participates in OpenAPI validation.
    pub openapi: bool,
    /// Only dispatch to this view for the given method.
    pub request_method: Option<Method>,
    /// Permission checked against the authorization policy.
    pub permission: Option<String>,
    /// Per-view override of the request validation setting.
    pub validate_request: Option<bool>,
    /// Per-view override of the response validation setting.
    pub validate_response: Option<bool>,
}

impl ViewOptions {
    /// Options for a view that participates in validation.
    pub fn openapi() -> Self {
        Self {
            openapi: true,
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.request_method = Some(method);
        self
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permission = Some(permission.to_string());
        self
    }

    pub fn validate_request(mut self, enabled: bool) -> Self {
        self.validate_request = Some(enabled);
        self
    }

    pub fn validate_response(mut self, enabled: bool) -> Self {
        self.validate_response = Some(enabled);
        self
    }
}

use crate::errors::NotValidatedError;
use crate::validator::ValidatedData;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Default base URL used when the host does not provide one.
pub const DEFAULT_APPLICATION_URL: &str = "http://localhost";

/// Route that matched the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    pub name: String,
    /// Pattern as registered, e.g. `/users/{id}`.
    pub pattern: String,
}

/// Request-scoped validation state. Written by the request interceptor,
/// read by handlers and the response validation layer.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValidationState {
    pub validated: Option<ValidatedData>,
    pub validate_response: bool,
    pub request_failed: bool,
}

/// An inbound HTTP request as seen by views.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Scheme, host and optional script prefix, without trailing slash.
    pub application_url: String,
    /// Decoded path without query string.
    pub path: String,
    /// Query pairs in wire order; names may repeat.
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub(crate) matched_route: Option<MatchedRoute>,
    pub(crate) matchdict: BTreeMap<String, String>,
    pub(crate) context: Option<Value>,
    pub(crate) validation: ValidationState,
}

impl Request {
    /// Build a request from a method and a path with optional query string.
    pub fn new(method: Method, uri: &str) -> Self {
        let (raw_path, query_str) = match uri.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (uri, None),
        };
        let path = urlencoding::decode(raw_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());
        let query = query_str
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method,
            application_url: DEFAULT_APPLICATION_URL.to_string(),
            path: if path.is_empty() { "/".to_string() } else { path },
            query,
            headers: HeaderMap::new(),
            body: Vec::new(),
            matched_route: None,
            matchdict: BTreeMap::new(),
            context: None,
            validation: ValidationState::default(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn with_application_url(mut self, url: &str) -> Self {
        self.application_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Append a header. Invalid names or values are dropped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => debug!(header = name, "Dropping invalid request header"),
        }
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.headers.remove(CONTENT_TYPE);
        self.body = body.into();
        self.with_header(CONTENT_TYPE.as_str(), content_type)
    }

    pub fn with_json(self, body: &Value) -> Self {
        self.with_body("application/json", body.to_string())
    }

    /// Encode `pairs` as an `application/x-www-form-urlencoded` body.
    pub fn with_form(self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        self.with_body("application/x-www-form-urlencoded", encoded)
    }

    /// Full `Content-Type` header value, parameters included.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// All values of a query parameter, in wire order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Cookies from every `Cookie` header; names may repeat.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| {
                let mut parts = pair.trim().splitn(2, '=');
                let name = parts.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                let value = parts.next().unwrap_or("").trim();
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn matched_route(&self) -> Option<&MatchedRoute> {
        self.matched_route.as_ref()
    }

    /// Path parameters captured by the matched route.
    pub fn matchdict(&self) -> &BTreeMap<String, String> {
        &self.matchdict
    }

    /// Value produced by the route's root factory, if any.
    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    /// Type-coerced parameters and body for routes that participate in
    /// validation.
    pub fn openapi_validated(&self) -> Result<&ValidatedData, NotValidatedError> {
        self.validation.validated.as_ref().ok_or(NotValidatedError)
    }
}

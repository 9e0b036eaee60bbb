//! View derivation for routes registered with the `openapi` marker.
//!
//! The derived view validates the request before the handler runs, stores
//! the validated data on the request and records whether the response
//! should be validated on the way out.

use crate::app::AppState;
use crate::errors::RequestValidationError;
use crate::framework::{Handler, HttpError, Request, View, ViewError, ViewOptions};
use crate::validator::{RequestValidator, ValidatedData};
use crate::wrappers::openapi_request;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Wrap `handler` so it only runs on requests that pass validation.
pub fn openapi_view(state: Arc<AppState>, handler: Handler, options: &ViewOptions) -> View {
    let validate_request = options
        .validate_request
        .unwrap_or(state.settings.enable_request_validation);
    let validate_response = options
        .validate_response
        .unwrap_or(state.settings.enable_response_validation);

    Arc::new(move |request: &mut Request| {
        request.validation.validate_response = validate_response;
        if !validate_request {
            request.validation.validated = Some(ValidatedData::default());
            return handler(request).map_err(ViewError::from);
        }

        let Some(entry) = state.entry_for(request) else {
            error!(
                route = request.matched_route().map(|r| r.name.as_str()).unwrap_or_default(),
                path = %request.path,
                "No API governs this openapi route"
            );
            return Err(ViewError::Http(HttpError::status(500)));
        };

        let outcome = entry.request_validator.validate(&openapi_request(request));
        if !outcome.is_valid() {
            request.validation.request_failed = true;
            let err = RequestValidationError::new(outcome.errors);
            warn!(
                api = %entry.name,
                route = request.matched_route().map(|r| r.name.as_str()).unwrap_or_default(),
                method = %request.method,
                path = %request.path,
                status = err.status(),
                errors = err.errors.len(),
                "Request validation failed"
            );
            return Err(err.into());
        }
        debug!(api = %entry.name, path = %request.path, "Request validated");
        request.validation.validated = Some(outcome.data);
        handler(request).map_err(ViewError::from)
    })
}

/// Wrap a handler that takes no part in validation.
pub fn plain_view(handler: Handler) -> View {
    Arc::new(move |request: &mut Request| handler(request).map_err(ViewError::from))
}

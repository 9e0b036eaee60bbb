//! Response validation around the whole dispatch pipeline.
//!
//! Runs after exception rendering, so rendered `HttpError`s and rendered
//! request validation errors are validated like any other response.

use crate::app::AppState;
use crate::errors::ResponseValidationError;
use crate::framework::{Request, Response, ViewError};
use crate::validator::ResponseValidator;
use crate::wrappers::{openapi_request, openapi_response};
use tracing::{error, warn};

/// Call `downstream` and validate what it returns when the view asked for
/// response validation.
pub fn validate_response<F>(
    state: &AppState,
    request: &mut Request,
    downstream: F,
) -> Result<Response, ViewError>
where
    F: FnOnce(&mut Request) -> Result<Response, ViewError>,
{
    let response = downstream(request)?;
    if !request.validation.validate_response {
        return Ok(response);
    }
    let Some(entry) = state.entry_for(request) else {
        return Ok(response);
    };

    let errors = entry
        .response_validator
        .validate(&openapi_request(request), &openapi_response(&response));
    if errors.is_empty() {
        return Ok(response);
    }

    let route = request
        .matched_route()
        .map(|r| r.name.clone())
        .unwrap_or_default();
    if request.validation.request_failed {
        warn!(
            warning = "ImproperAPISpecificationWarning",
            route = %route,
            spec = %entry.spec.filepath().display(),
            status = response.status,
            "Discarding request validation error response: its status code is not documented in the API specification"
        );
    }
    let err = ResponseValidationError::new(errors, response);
    error!(
        api = %entry.name,
        route = %route,
        status = err.response.status,
        errors = %err,
        "Response validation failed"
    );
    let err = ViewError::ResponseValidation(err);
    match state.render_validation_error(request, &err) {
        Some(rendered) => Ok(rendered),
        None => Err(err),
    }
}

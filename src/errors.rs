//! Error taxonomy.
//!
//! Configuration and startup failures ([`ConfigurationError`],
//! [`SpecValidationError`], [`MissingEndpointsError`],
//! [`MissingResponsesError`]) abort application construction and are
//! collected under [`Error`]. Per-request failures
//! ([`RequestValidationError`], [`ResponseValidationError`]) are rendered into
//! responses by the exception views.

use crate::framework::Response;
use crate::validator::OpenApiError;
use std::fmt;
use std::path::PathBuf;

/// Invalid setup: duplicate registrations, bad routes, missing specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// One structural problem found in an OpenAPI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecIssue {
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl SpecIssue {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SpecIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SpecIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// The OpenAPI document itself is invalid. Carries every issue found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecValidationError {
    pub path: PathBuf,
    pub issues: Vec<SpecIssue>,
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OpenAPI spec validation failed for {}. {} issue(s) found:",
            self.path.display(),
            self.issues.len()
        )?;
        for issue in &self.issues {
            write!(f, "\n{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SpecValidationError {}

/// Declared paths that have no registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEndpointsError {
    pub missing: Vec<String>,
}

impl fmt::Display for MissingEndpointsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unable to find routes for endpoints: {}",
            self.missing.join(", ")
        )
    }
}

impl std::error::Error for MissingEndpointsError {}

/// Operations lacking response definitions required by the responses config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingResponsesError {
    pub errors: Vec<String>,
}

impl fmt::Display for MissingResponsesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.concat())
    }
}

impl std::error::Error for MissingResponsesError {}

/// The request did not match the specification.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestValidationError {
    pub errors: Vec<OpenApiError>,
}

impl RequestValidationError {
    pub fn new(errors: Vec<OpenApiError>) -> Self {
        Self { errors }
    }

    /// Any contained error (at any depth) is a security failure.
    pub fn is_security(&self) -> bool {
        self.errors.iter().any(OpenApiError::contains_security)
    }

    /// 401 for security failures, 400 otherwise.
    pub fn status(&self) -> u16 {
        if self.is_security() {
            401
        } else {
            400
        }
    }
}

impl fmt::Display for RequestValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        f.write_str(&detail.join("\n"))
    }
}

impl std::error::Error for RequestValidationError {}

/// The response produced for a request did not match the specification.
/// Always a server-side fault.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseValidationError {
    pub errors: Vec<OpenApiError>,
    /// The response that failed validation.
    pub response: Response,
}

impl ResponseValidationError {
    pub fn new(errors: Vec<OpenApiError>, response: Response) -> Self {
        Self { errors, response }
    }

    pub fn status(&self) -> u16 {
        500
    }
}

impl fmt::Display for ResponseValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        f.write_str(&detail.join("\n"))
    }
}

impl std::error::Error for ResponseValidationError {}

/// Validated data was requested on a route that is not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotValidatedError;

impl fmt::Display for NotValidatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "openapi_validated is only available on views registered with the openapi marker"
        )
    }
}

impl std::error::Error for NotValidatedError {}

/// Errors raised while configuring or constructing an application.
#[derive(Debug)]
pub enum Error {
    Configuration(ConfigurationError),
    SpecValidation(SpecValidationError),
    MissingEndpoints(MissingEndpointsError),
    MissingResponses(MissingResponsesError),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "{err}"),
            Error::SpecValidation(err) => write!(f, "{err}"),
            Error::MissingEndpoints(err) => write!(f, "{err}"),
            Error::MissingResponses(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Configuration(err) => Some(err),
            Error::SpecValidation(err) => Some(err),
            Error::MissingEndpoints(err) => Some(err),
            Error::MissingResponses(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::Configuration(err)
    }
}

impl From<SpecValidationError> for Error {
    fn from(err: SpecValidationError) -> Self {
        Error::SpecValidation(err)
    }
}

impl From<MissingEndpointsError> for Error {
    fn from(err: MissingEndpointsError) -> Self {
        Error::MissingEndpoints(err)
    }
}

impl From<MissingResponsesError> for Error {
    fn from(err: MissingResponsesError) -> Self {
        Error::MissingResponses(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_endpoints_message() {
        let err = MissingEndpointsError {
            missing: vec!["/foo".into(), "/bar".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unable to find routes for endpoints: /foo, /bar"
        );
    }

    #[test]
    fn test_request_validation_status() {
        let plain = RequestValidationError::new(vec![OpenApiError::MissingRequestBody]);
        assert_eq!(plain.status(), 400);
        let security = RequestValidationError::new(vec![
            OpenApiError::MissingRequestBody,
            OpenApiError::InvalidSecurity,
        ]);
        assert_eq!(security.status(), 401);
    }

    #[test]
    fn test_spec_validation_error_lists_issues() {
        let err = SpecValidationError {
            path: PathBuf::from("openapi.yaml"),
            issues: vec![
                SpecIssue::new("paths./foo.get", "MissingResponses", "no responses"),
                SpecIssue::new("info", "MissingField", "title is required"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 issue(s) found"));
        assert!(text.contains("[MissingResponses] paths./foo.get: no responses"));
        assert!(text.contains("[MissingField] info: title is required"));
    }
}

//! # Validator Module
//!
//! Request and response validation against a [`Specification`].
//!
//! The engine works on framework neutral views of a request
//! ([`OpenApiRequest`]) and a response ([`OpenApiResponse`]). Every schema
//! is compiled once when an [`Engine`] is built; validating a request never
//! recompiles anything.
//!
//! ## Request Flow
//!
//! 1. Locate the operation for the method and path pattern
//! 2. Check the security requirements (a failure stops here)
//! 3. Cast, validate and unmarshal every declared parameter
//! 4. Deserialize, validate and unmarshal the body
//!
//! All failures of steps 3 and 4 are collected, not just the first.

mod error;
mod extensions;
mod media;
mod params;
mod request;
mod response;
mod schema;
mod security;

pub use error::{OpenApiError, PathSegment, SchemaError};
pub use extensions::{Deserializer, Extensions, FormatValidator, Unmarshaller};
pub use media::{find_media_type, media_essence};
pub(crate) use media::{parse_urlencoded, push_field};
pub use request::OpenApiRequestValidator;
pub use response::OpenApiResponseValidator;
pub use schema::{value_repr, CompiledSchema, SchemaSet};

use crate::errors::SpecValidationError;
use crate::spec::Specification;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Raw parameter sources of a request.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    /// Values captured by the route pattern.
    pub path: BTreeMap<String, String>,
    /// Query pairs in wire order; names may repeat.
    pub query: Vec<(String, String)>,
    /// Header pairs; names compare case-insensitively.
    pub header: Vec<(String, String)>,
    pub cookie: Vec<(String, String)>,
}

/// Request body as seen by the validator.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Bytes exactly as received.
    Raw(Vec<u8>),
    /// Already decoded form fields. Repeated names are lists.
    Form(Map<String, Value>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Raw(bytes) => bytes.is_empty(),
            RequestBody::Form(fields) => fields.is_empty(),
        }
    }
}

/// Framework neutral request.
#[derive(Debug, Clone)]
pub struct OpenApiRequest {
    /// Uppercase or lowercase HTTP method.
    pub method: String,
    /// Application URL joined with the matched route pattern.
    pub full_url_pattern: String,
    pub host_url: String,
    /// Literal request path.
    pub path: String,
    /// Matched route pattern, or the literal path without a route.
    pub path_pattern: String,
    pub parameters: RequestParameters,
    pub body: RequestBody,
    /// Content type essence plus parameters, as sent.
    pub mimetype: String,
}

/// Framework neutral response.
#[derive(Debug, Clone)]
pub struct OpenApiResponse {
    pub data: Vec<u8>,
    pub status_code: u16,
    pub mimetype: String,
    pub headers: Vec<(String, String)>,
}

/// Parameters after casting, validation and unmarshalling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedParameters {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub header: Map<String, Value>,
    pub cookie: Map<String, Value>,
}

/// What a handler can rely on after request validation succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedData {
    pub parameters: ValidatedParameters,
    /// `None` when the operation takes no body or none was sent.
    pub body: Option<Value>,
}

/// Result of one validation run: the data that could be extracted and
/// every error found.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub data: ValidatedData,
    pub errors: Vec<OpenApiError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates requests for one document.
pub trait RequestValidator: Send + Sync {
    fn validate(&self, request: &OpenApiRequest) -> ValidationOutcome;
}

/// Validates responses for one document.
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, request: &OpenApiRequest, response: &OpenApiResponse) -> Vec<OpenApiError>;
}

/// Shared state of the validators of one document: the spec, its compiled
/// schemas and the caller extensions.
#[derive(Debug)]
pub struct Engine {
    spec: Arc<Specification>,
    schemas: SchemaSet,
    extensions: Arc<Extensions>,
}

impl Engine {
    pub fn new(
        spec: Arc<Specification>,
        extensions: Extensions,
    ) -> Result<Self, SpecValidationError> {
        let extensions = Arc::new(extensions);
        let schemas = SchemaSet::compile(&spec, Arc::clone(&extensions))?;
        Ok(Self {
            spec,
            schemas,
            extensions,
        })
    }

    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Request validator sharing this engine.
    pub fn request_validator(self: &Arc<Self>) -> OpenApiRequestValidator {
        OpenApiRequestValidator::new(Arc::clone(self))
    }

    /// Response validator sharing this engine.
    pub fn response_validator(self: &Arc<Self>) -> OpenApiResponseValidator {
        OpenApiResponseValidator::new(Arc::clone(self))
    }

    /// Validate `instance` against the compiled schema at `pointer`, then
    /// apply unmarshallers.
    pub(crate) fn check_value(&self, pointer: &str, instance: Value) -> Result<Value, ValueFailure> {
        let Some(compiled) = self.schemas.get(pointer) else {
            return Ok(instance);
        };
        let errors = compiled.validate(&instance);
        if !errors.is_empty() {
            return Err(ValueFailure::Schema(errors));
        }
        let mut unmarshal_errors = Vec::new();
        let value = extensions::unmarshal(
            instance,
            compiled.schema(),
            &self.extensions,
            self.spec.version(),
            &mut Vec::new(),
            &mut unmarshal_errors,
        );
        if unmarshal_errors.is_empty() {
            Ok(value)
        } else {
            Err(ValueFailure::Unmarshal(unmarshal_errors))
        }
    }
}

/// Why a value was rejected by [`Engine::check_value`].
#[derive(Debug)]
pub(crate) enum ValueFailure {
    /// Keyword failures, to be wrapped in `InvalidSchemaValue`.
    Schema(Vec<OpenApiError>),
    /// Unmarshaller failures, reported as they are.
    Unmarshal(Vec<OpenApiError>),
}

impl ValueFailure {
    /// Flatten into reportable errors, wrapping schema failures for `field`.
    pub(crate) fn into_errors(self, field: Option<&str>) -> Vec<OpenApiError> {
        match self {
            ValueFailure::Schema(schema_errors) => vec![OpenApiError::InvalidSchemaValue {
                field: field.map(str::to_owned),
                schema_errors,
            }],
            ValueFailure::Unmarshal(errors) => errors
                .into_iter()
                .map(|err| match err {
                    OpenApiError::FormatUnmarshalError {
                        field: None,
                        format,
                        message,
                    } => OpenApiError::FormatUnmarshalError {
                        field: field.map(str::to_owned),
                        format,
                        message,
                    },
                    other => other,
                })
                .collect(),
        }
    }
}

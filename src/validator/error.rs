use crate::spec::ParameterLocation;
use std::fmt;

/// One step of a JSON instance location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl PathSegment {
    /// Split a JSON pointer (`/a/0/b`) into segments. Numeric segments
    /// become indices.
    pub fn parse_pointer(pointer: &str) -> Vec<PathSegment> {
        pointer
            .split('/')
            .skip(1)
            .map(|raw| {
                let key = raw.replace("~1", "/").replace("~0", "~");
                match key.parse::<usize>() {
                    Ok(idx) => PathSegment::Index(idx),
                    Err(_) => PathSegment::Key(key),
                }
            })
            .collect()
    }
}

/// A single JSON-Schema keyword failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub message: String,
    /// The failing keyword, e.g. `minLength`.
    pub keyword: String,
    /// Location of the offending value inside the validated instance.
    pub path: Vec<PathSegment>,
    /// Name of the absent property for `required` failures.
    pub missing_property: Option<String>,
}

/// Raw error produced by the validation engine.
///
/// The set of kinds is closed; [`OpenApiError::kind`] is the stable name API
/// consumers match on. Wrapping kinds carry their children in
/// [`OpenApiError::schema_errors`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpenApiError {
    MissingRequiredParameter {
        name: String,
        location: ParameterLocation,
    },
    CastError {
        value: String,
        type_name: String,
    },
    InvalidSchemaValue {
        field: Option<String>,
        schema_errors: Vec<OpenApiError>,
    },
    Schema(SchemaError),
    InvalidSecurity,
    MissingRequestBody,
    MediaTypeNotFound {
        mimetype: String,
        available: Vec<String>,
    },
    DeserializeError {
        mimetype: String,
        reason: String,
    },
    PathNotFound {
        url: String,
    },
    OperationNotFound {
        method: String,
        url: String,
    },
    InvalidResponse {
        status: u16,
    },
    MissingResponseContent,
    MissingRequiredHeader {
        name: String,
    },
    InvalidCustomFormatterValue {
        field: Option<String>,
        format: String,
        message: String,
    },
    FormatUnmarshalError {
        field: Option<String>,
        format: String,
        message: String,
    },
    /// Raised by caller-supplied extensions.
    Custom {
        kind: String,
        message: String,
        field: Option<String>,
    },
}

impl OpenApiError {
    pub fn kind(&self) -> &str {
        match self {
            OpenApiError::MissingRequiredParameter { .. } => "MissingRequiredParameter",
            OpenApiError::CastError { .. } => "CastError",
            OpenApiError::InvalidSchemaValue { .. } => "InvalidSchemaValue",
            OpenApiError::Schema(_) => "ValidationError",
            OpenApiError::InvalidSecurity => "InvalidSecurity",
            OpenApiError::MissingRequestBody => "MissingRequestBody",
            OpenApiError::MediaTypeNotFound { .. } => "MediaTypeNotFound",
            OpenApiError::DeserializeError { .. } => "DeserializeError",
            OpenApiError::PathNotFound { .. } => "PathNotFound",
            OpenApiError::OperationNotFound { .. } => "OperationNotFound",
            OpenApiError::InvalidResponse { .. } => "InvalidResponse",
            OpenApiError::MissingResponseContent => "MissingResponseContent",
            OpenApiError::MissingRequiredHeader { .. } => "MissingRequiredHeader",
            OpenApiError::InvalidCustomFormatterValue { .. } => "InvalidCustomFormatterValue",
            OpenApiError::FormatUnmarshalError { .. } => "FormatUnmarshalError",
            OpenApiError::Custom { kind, .. } => kind,
        }
    }

    /// Explicit human readable message, when the error carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            OpenApiError::Schema(err) => Some(&err.message),
            OpenApiError::InvalidCustomFormatterValue { message, .. }
            | OpenApiError::Custom { message, .. } => Some(message),
            _ => None,
        }
    }

    /// String form of the underlying cause for errors that wrap one.
    pub fn cause(&self) -> Option<String> {
        match self {
            OpenApiError::DeserializeError { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            OpenApiError::InvalidSchemaValue { field, .. }
            | OpenApiError::InvalidCustomFormatterValue { field, .. }
            | OpenApiError::FormatUnmarshalError { field, .. }
            | OpenApiError::Custom { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Name of a missing parameter or header.
    pub fn name(&self) -> Option<&str> {
        match self {
            OpenApiError::MissingRequiredParameter { name, .. }
            | OpenApiError::MissingRequiredHeader { name } => Some(name),
            _ => None,
        }
    }

    /// Path to an absent required property: the instance path plus the
    /// property name.
    pub fn required_property_path(&self) -> Option<Vec<String>> {
        match self {
            OpenApiError::Schema(SchemaError {
                missing_property: Some(prop),
                path,
                ..
            }) => {
                let mut parts: Vec<String> = path.iter().map(ToString::to_string).collect();
                parts.push(prop.clone());
                Some(parts)
            }
            _ => None,
        }
    }

    /// Instance location of a schema failure.
    pub fn path(&self) -> Option<&[PathSegment]> {
        match self {
            OpenApiError::Schema(err) => Some(&err.path),
            _ => None,
        }
    }

    pub fn schema_errors(&self) -> Option<&[OpenApiError]> {
        match self {
            OpenApiError::InvalidSchemaValue { schema_errors, .. } => Some(schema_errors),
            _ => None,
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, OpenApiError::InvalidSecurity)
    }

    /// True when this error or any nested child is a security failure.
    pub fn contains_security(&self) -> bool {
        self.is_security()
            || self
                .schema_errors()
                .is_some_and(|children| children.iter().any(OpenApiError::contains_security))
    }
}

impl fmt::Display for OpenApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenApiError::MissingRequiredParameter { name, .. } => {
                write!(f, "Missing required parameter: {name}")
            }
            OpenApiError::CastError { value, type_name } => {
                write!(f, "Failed to cast value {value} to type {type_name}")
            }
            OpenApiError::InvalidSchemaValue { field, schema_errors } => match field {
                Some(field) => write!(
                    f,
                    "Value of {field} not valid for schema: {} error(s)",
                    schema_errors.len()
                ),
                None => write!(f, "Value not valid for schema: {} error(s)", schema_errors.len()),
            },
            OpenApiError::Schema(err) => f.write_str(&err.message),
            OpenApiError::InvalidSecurity => write!(f, "Security not valid for any requirement"),
            OpenApiError::MissingRequestBody => write!(f, "Missing required request body"),
            OpenApiError::MediaTypeNotFound { mimetype, available } => write!(
                f,
                "Content for the following mimetype not found: {mimetype}. Valid mimetypes: {}",
                available.join(", ")
            ),
            OpenApiError::DeserializeError { mimetype, reason } => {
                write!(f, "Failed to deserialize {mimetype} body: {reason}")
            }
            OpenApiError::PathNotFound { url } => write!(f, "Path not found for {url}"),
            OpenApiError::OperationNotFound { method, url } => {
                write!(f, "Operation {method} not found for {url}")
            }
            OpenApiError::InvalidResponse { status } => {
                write!(f, "Unknown response http status: {status}")
            }
            OpenApiError::MissingResponseContent => write!(f, "Missing response content"),
            OpenApiError::MissingRequiredHeader { name } => {
                write!(f, "Missing required header: {name}")
            }
            OpenApiError::InvalidCustomFormatterValue { message, .. } => f.write_str(message),
            OpenApiError::FormatUnmarshalError { format, message, .. } => {
                write!(f, "Unable to unmarshal value for format {format}: {message}")
            }
            OpenApiError::Custom { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for OpenApiError {}

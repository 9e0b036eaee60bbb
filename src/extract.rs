//! Flattening of nested validation error trees into user facing records.
//!
//! The engine reports failures as a tree: a body or parameter that fails its
//! schema is wrapped in an `InvalidSchemaValue` whose children are the
//! concrete keyword failures. Consumers want one row per violation, so only
//! leaves are emitted, in the order the engine discovered them.

use crate::validator::OpenApiError;
use serde::Serialize;

/// The externally visible unit of failure.
///
/// `field` is omitted from the serialized form when it could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub exception: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Caller supplied replacement for [`extract_errors`].
pub type ExtractErrorsFn = dyn Fn(&[OpenApiError]) -> Vec<ErrorRecord> + Send + Sync;

/// Lazily flatten `errors` into records.
///
/// Wrapping errors are never emitted themselves; their children inherit the
/// wrapper's field as `parent_field`. Each call walks the full input once.
pub fn extract_errors<'a>(
    errors: &'a [OpenApiError],
    parent_field: Option<&'a str>,
) -> Box<dyn Iterator<Item = ErrorRecord> + 'a> {
    Box::new(errors.iter().flat_map(move |err| {
        match err.schema_errors() {
            Some(children) => {
                let field = err.field().or(parent_field);
                extract_errors(children, field)
            }
            None => Box::new(std::iter::once(leaf_record(err, parent_field)))
                as Box<dyn Iterator<Item = ErrorRecord> + 'a>,
        }
    }))
}

/// Convenience wrapper collecting [`extract_errors`] with no parent field.
pub fn collect_errors(errors: &[OpenApiError]) -> Vec<ErrorRecord> {
    extract_errors(errors, None).collect()
}

fn leaf_record(err: &OpenApiError, parent_field: Option<&str>) -> ErrorRecord {
    let message = err
        .message()
        .map(str::to_owned)
        .or_else(|| err.cause())
        .unwrap_or_else(|| err.to_string());

    ErrorRecord {
        exception: err.kind().to_string(),
        message,
        field: resolve_field(err, parent_field),
    }
}

/// Precedence: explicit field, inherited parent field, parameter name,
/// required property path, instance path.
fn resolve_field(err: &OpenApiError, parent_field: Option<&str>) -> Option<String> {
    let candidate = err
        .field()
        .or(parent_field)
        .or_else(|| err.name())
        .map(str::to_owned)
        .or_else(|| err.required_property_path().map(|parts| parts.join("/")))
        .or_else(|| {
            err.path().map(|segments| {
                segments
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("/")
            })
        });
    candidate.filter(|field| !field.is_empty())
}

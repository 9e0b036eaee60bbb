//! Parameter extraction and casting.
//!
//! Wire values are always strings. They are turned into JSON values guided
//! by the parameter schema before schema validation runs.

use super::error::OpenApiError;
use super::RequestParameters;
use crate::spec::{ParameterLocation, ParameterMeta, ParameterStyle};
use serde_json::Value;

/// Raw wire values for one parameter, in received order.
pub(crate) fn raw_values<'a>(
    params: &'a RequestParameters,
    meta: &ParameterMeta,
) -> Vec<&'a str> {
    match meta.location {
        ParameterLocation::Path => params
            .path
            .get(&meta.name)
            .map(|v| vec![v.as_str()])
            .unwrap_or_default(),
        ParameterLocation::Query => pick(&params.query, &meta.name, false),
        ParameterLocation::Header => pick(&params.header, &meta.name, true),
        ParameterLocation::Cookie => pick(&params.cookie, &meta.name, false),
    }
}

fn pick<'a>(pairs: &'a [(String, String)], name: &str, ignore_case: bool) -> Vec<&'a str> {
    pairs
        .iter()
        .filter(|(k, _)| {
            if ignore_case {
                k.eq_ignore_ascii_case(name)
            } else {
                k == name
            }
        })
        .map(|(_, v)| v.as_str())
        .collect()
}

fn schema_type(schema: Option<&Value>) -> Option<&str> {
    let ty = schema?.get("type")?;
    match ty {
        Value::String(t) => Some(t.as_str()),
        // 3.1 style unions: the first non-null type drives casting
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// Cast one primitive wire value according to `schema`.
pub(crate) fn cast_value(value: &str, schema: Option<&Value>) -> Result<Value, OpenApiError> {
    let cast_error = |type_name: &str| OpenApiError::CastError {
        value: value.to_string(),
        type_name: type_name.to_string(),
    };
    match schema_type(schema) {
        Some("integer") => value
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| cast_error("integer")),
        Some("number") => {
            let trimmed = value.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::from(i));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| cast_error("number"))
        }
        Some("boolean") => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(cast_error("boolean")),
        },
        _ => Ok(Value::String(value.to_string())),
    }
}

/// Turn the wire values of one parameter into a JSON value.
///
/// Arrays are split on the style delimiter unless the values arrive
/// exploded; objects are read as JSON.
pub(crate) fn deserialize_parameter(
    meta: &ParameterMeta,
    values: &[&str],
) -> Result<Value, OpenApiError> {
    let schema = meta.schema.as_ref();
    match schema_type(schema) {
        Some("array") => {
            let items = schema.and_then(|s| s.get("items"));
            let split = !meta.explode
                || matches!(
                    meta.style,
                    ParameterStyle::SpaceDelimited | ParameterStyle::PipeDelimited
                )
                || matches!(
                    meta.location,
                    ParameterLocation::Path | ParameterLocation::Header
                );
            let parts: Vec<&str> = if split {
                values
                    .iter()
                    .flat_map(|v| v.split(meta.style.delimiter()))
                    .filter(|p| !p.is_empty())
                    .collect()
            } else {
                values.to_vec()
            };
            parts
                .into_iter()
                .map(|p| cast_value(p, items))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Some("object") => {
            let raw = last_or_first(meta, values);
            serde_json::from_str::<Value>(raw).map_err(|_| OpenApiError::CastError {
                value: raw.to_string(),
                type_name: "object".to_string(),
            })
        }
        _ => cast_value(last_or_first(meta, values), schema),
    }
}

/// Query strings keep the last occurrence, other locations the first.
fn last_or_first<'a>(meta: &ParameterMeta, values: &[&'a str]) -> &'a str {
    let picked = if meta.location == ParameterLocation::Query {
        values.last()
    } else {
        values.first()
    };
    picked.copied().unwrap_or_default()
}

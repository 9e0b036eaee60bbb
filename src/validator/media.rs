//! Media type negotiation and body deserialization.

use super::error::OpenApiError;
use super::extensions::Extensions;
use super::params::cast_value;
use super::RequestBody;
use serde_json::{Map, Value};

/// Lowercase `type/subtype` of a content type, parameters dropped.
pub fn media_essence(mimetype: &str) -> String {
    mimetype
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Pick the declared media type for `mimetype`: an exact match first, then
/// `type/*`, then `*/*`.
pub fn find_media_type<'a>(
    content: &'a Map<String, Value>,
    mimetype: &str,
) -> Option<(&'a str, &'a Value)> {
    let essence = media_essence(mimetype);
    let wildcard = essence
        .split_once('/')
        .map(|(kind, _)| format!("{kind}/*"))
        .unwrap_or_default();
    let found = [essence.as_str(), wildcard.as_str(), "*/*"]
        .into_iter()
        .filter(|candidate| !candidate.is_empty())
        .find_map(|candidate| {
            content
                .iter()
                .find(|(declared, _)| media_essence(declared) == candidate)
                .map(|(declared, media)| (declared.as_str(), media))
        });
    found
}

pub(crate) fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

/// Turn a body into a JSON value ready for schema validation.
pub(crate) fn deserialize_body(
    body: &RequestBody,
    mimetype: &str,
    schema: Option<&Value>,
    extensions: &Extensions,
) -> Result<Value, OpenApiError> {
    let essence = media_essence(mimetype);
    let deserialize_error = |reason: String| OpenApiError::DeserializeError {
        mimetype: essence.clone(),
        reason,
    };

    if let Some(custom) = extensions.deserializer(&essence) {
        let bytes = match body {
            RequestBody::Raw(bytes) => bytes.clone(),
            RequestBody::Form(fields) => serde_json::to_vec(fields).unwrap_or_default(),
        };
        return custom(&bytes).map_err(deserialize_error);
    }

    let bytes = match body {
        RequestBody::Form(fields) => return Ok(coerce_form(fields.clone(), schema)),
        RequestBody::Raw(bytes) => bytes,
    };

    if is_json(&essence) {
        return serde_json::from_slice(bytes).map_err(|e| deserialize_error(e.to_string()));
    }
    match essence.as_str() {
        "application/x-www-form-urlencoded" => Ok(coerce_form(parse_urlencoded(bytes), schema)),
        "multipart/form-data" => crate::wrappers::multipart::parse(bytes, mimetype)
            .map(|fields| coerce_form(fields, schema))
            .map_err(deserialize_error),
        _ => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

/// Decode an urlencoded body. Repeated names become lists.
pub(crate) fn parse_urlencoded(bytes: &[u8]) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        push_field(&mut fields, key.into_owned(), Value::String(value.into_owned()));
    }
    fields
}

/// Insert a form value, turning repeated names into lists.
pub(crate) fn push_field(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(key, value);
        }
    }
}

/// Cast form fields using the declared property schemas.
///
/// Casting is lenient: a value that does not cast stays a string and the
/// schema check reports it.
fn coerce_form(fields: Map<String, Value>, schema: Option<&Value>) -> Value {
    let properties = schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object);
    let coerced = fields
        .into_iter()
        .map(|(key, value)| {
            let prop = properties.and_then(|p| p.get(&key));
            (key, coerce_field(value, prop))
        })
        .collect();
    Value::Object(coerced)
}

fn coerce_field(value: Value, schema: Option<&Value>) -> Value {
    let ty = schema.and_then(|s| s.get("type")).and_then(Value::as_str);
    match (ty, value) {
        (Some("array"), Value::Array(items)) => {
            let item_schema = schema.and_then(|s| s.get("items"));
            Value::Array(items.into_iter().map(|v| coerce_field(v, item_schema)).collect())
        }
        (Some("array"), single) => coerce_field(Value::Array(vec![single]), schema),
        (Some("object"), Value::String(raw)) => {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        }
        (_, Value::String(raw)) => cast_value(&raw, schema).unwrap_or(Value::String(raw)),
        (_, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_media_type_precedence() {
        let content = json!({
            "text/*": {"n": 2},
            "application/json; charset=utf-8": {"n": 1},
            "*/*": {"n": 3}
        });
        let content = content.as_object().unwrap();
        let pick = |m: &str| find_media_type(content, m).map(|(_, v)| v["n"].clone());
        assert_eq!(pick("application/json"), Some(json!(1)));
        assert_eq!(pick("text/plain; charset=utf-8"), Some(json!(2)));
        assert_eq!(pick("image/png"), Some(json!(3)));

        let only_json = json!({"application/json": {}});
        assert!(find_media_type(only_json.as_object().unwrap(), "text/plain").is_none());
    }

    #[test]
    fn test_json_body_and_failure() {
        let ext = Extensions::new();
        let ok = deserialize_body(
            &RequestBody::Raw(br#"{"a":1}"#.to_vec()),
            "application/vnd.api+json",
            None,
            &ext,
        )
        .unwrap();
        assert_eq!(ok, json!({"a": 1}));
        let err = deserialize_body(&RequestBody::Raw(b"{".to_vec()), "application/json", None, &ext)
            .unwrap_err();
        assert_eq!(err.kind(), "DeserializeError");
    }

    #[test]
    fn test_form_body_coercion() {
        let schema = json!({"properties": {
            "n": {"type": "integer"},
            "tags": {"type": "array", "items": {"type": "string"}},
            "bad": {"type": "integer"}
        }});
        let body = RequestBody::Raw(b"n=3&tags=a&bad=x&n2=1&n2=2".to_vec());
        let value = deserialize_body(
            &body,
            "application/x-www-form-urlencoded",
            Some(&schema),
            &Extensions::new(),
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"n": 3, "tags": ["a"], "bad": "x", "n2": ["1", "2"]})
        );
    }

    #[test]
    fn test_custom_deserializer_wins() {
        let mut ext = Extensions::new();
        ext.add_deserializer("application/x-csv", |bytes: &[u8]| {
            Ok(Value::Array(
                String::from_utf8_lossy(bytes)
                    .split(',')
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ))
        });
        let value = deserialize_body(&RequestBody::Raw(b"a,b".to_vec()), "application/x-csv", None, &ext)
            .unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn test_other_types_are_text() {
        let value = deserialize_body(
            &RequestBody::Raw(b"hello".to_vec()),
            "text/plain",
            None,
            &Extensions::new(),
        )
        .unwrap();
        assert_eq!(value, json!("hello"));
    }
}

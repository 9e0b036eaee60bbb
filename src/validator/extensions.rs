use super::error::OpenApiError;
use crate::spec::OpenApiVersion;
use base64::Engine as _;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Validates strings declared with a custom `format`.
pub trait FormatValidator: Send + Sync {
    /// `Err` carries the message reported to the client.
    fn validate(&self, value: &str) -> Result<(), String>;
}

impl<F> FormatValidator for F
where
    F: Fn(&str) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &str) -> Result<(), String> {
        self(value)
    }
}

/// Turns a raw body of a given mimetype into a JSON value.
pub type Deserializer = Arc<dyn Fn(&[u8]) -> Result<Value, String> + Send + Sync>;

/// Converts a validated value of a given `format` into its final shape.
pub type Unmarshaller = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Caller supplied extension points, each keyed by name.
#[derive(Clone, Default)]
pub struct Extensions {
    formats: BTreeMap<String, Arc<dyn FormatValidator>>,
    deserializers: BTreeMap<String, Deserializer>,
    unmarshallers: BTreeMap<String, Unmarshaller>,
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("formats", &self.formats.keys().collect::<Vec<_>>())
            .field("deserializers", &self.deserializers.keys().collect::<Vec<_>>())
            .field("unmarshallers", &self.unmarshallers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_format<F: FormatValidator + 'static>(&mut self, name: &str, validator: F) {
        self.formats.insert(name.to_string(), Arc::new(validator));
    }

    /// Register a body deserializer for a mimetype such as `application/xml`.
    pub fn add_deserializer<F>(&mut self, mimetype: &str, deserializer: F)
    where
        F: Fn(&[u8]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.deserializers
            .insert(mimetype.to_ascii_lowercase(), Arc::new(deserializer));
    }

    pub fn add_unmarshaller<F>(&mut self, format: &str, unmarshaller: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.unmarshallers
            .insert(format.to_string(), Arc::new(unmarshaller));
    }

    pub fn format(&self, name: &str) -> Option<&Arc<dyn FormatValidator>> {
        self.formats.get(name)
    }

    pub fn formats(&self) -> impl Iterator<Item = (&String, &Arc<dyn FormatValidator>)> {
        self.formats.iter()
    }

    pub fn deserializer(&self, mimetype: &str) -> Option<&Deserializer> {
        self.deserializers.get(mimetype)
    }

    pub fn unmarshaller(&self, format: &str) -> Option<&Unmarshaller> {
        self.unmarshallers.get(format)
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty() && self.deserializers.is_empty() && self.unmarshallers.is_empty()
    }
}

/// True when `schema` declares base64 encoded string content.
fn is_base64(schema: &Value, version: OpenApiVersion) -> bool {
    match version {
        OpenApiVersion::V30 => schema.get("format").and_then(Value::as_str) == Some("byte"),
        OpenApiVersion::V31 => {
            schema.get("contentEncoding").and_then(Value::as_str) == Some("base64")
        }
    }
}

/// Apply format unmarshallers and base64 decoding to a value that already
/// passed schema validation. Failures are appended to `errors`.
pub(crate) fn unmarshal(
    value: Value,
    schema: &Value,
    extensions: &Extensions,
    version: OpenApiVersion,
    path: &mut Vec<String>,
    errors: &mut Vec<OpenApiError>,
) -> Value {
    let field = || {
        if path.is_empty() {
            None
        } else {
            Some(path.join("/"))
        }
    };

    if let Some(format) = schema.get("format").and_then(Value::as_str) {
        if let Some(unmarshaller) = extensions.unmarshaller(format) {
            return match unmarshaller(&value) {
                Ok(v) => v,
                Err(message) => {
                    errors.push(OpenApiError::FormatUnmarshalError {
                        field: field(),
                        format: format.to_string(),
                        message,
                    });
                    value
                }
            };
        }
    }

    if is_base64(schema, version) {
        if let Value::String(encoded) = &value {
            return match base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes()) {
                Ok(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                Err(err) => {
                    errors.push(OpenApiError::FormatUnmarshalError {
                        field: field(),
                        format: "byte".to_string(),
                        message: err.to_string(),
                    });
                    value
                }
            };
        }
    }

    match value {
        Value::Object(obj) => {
            let properties = schema.get("properties").and_then(Value::as_object);
            let additional = schema.get("additionalProperties").filter(|v| v.is_object());
            let mut out = serde_json::Map::with_capacity(obj.len());
            for (key, item) in obj {
                let item_schema = properties.and_then(|p| p.get(&key)).or(additional);
                let item = match item_schema {
                    Some(item_schema) => {
                        path.push(key.clone());
                        let v = unmarshal(item, item_schema, extensions, version, path, errors);
                        path.pop();
                        v
                    }
                    None => item,
                };
                out.insert(key, item);
            }
            Value::Object(out)
        }
        Value::Array(items) => match schema.get("items").filter(|v| v.is_object()) {
            Some(item_schema) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        path.push(idx.to_string());
                        let v = unmarshal(item, item_schema, extensions, version, path, errors);
                        path.pop();
                        v
                    })
                    .collect(),
            ),
            None => Value::Array(items),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unmarshaller_applies_to_nested_values() {
        let mut ext = Extensions::new();
        ext.add_unmarshaller("upper", |v: &Value| {
            v.as_str()
                .map(|s| Value::String(s.to_uppercase()))
                .ok_or_else(|| "not a string".to_string())
        });
        let schema = json!({
            "type": "object",
            "properties": {"tags": {"type": "array", "items": {"type": "string", "format": "upper"}}}
        });
        let mut errors = Vec::new();
        let out = unmarshal(
            json!({"tags": ["a", "b"]}),
            &schema,
            &ext,
            OpenApiVersion::V31,
            &mut Vec::new(),
            &mut errors,
        );
        assert!(errors.is_empty());
        assert_eq!(out, json!({"tags": ["A", "B"]}));
    }

    #[test]
    fn test_base64_by_version() {
        let ext = Extensions::new();
        let schema30 = json!({"type": "string", "format": "byte"});
        let schema31 = json!({"type": "string", "contentEncoding": "base64"});
        let mut errors = Vec::new();
        let decoded = unmarshal(
            json!("aGVsbG8="),
            &schema30,
            &ext,
            OpenApiVersion::V30,
            &mut Vec::new(),
            &mut errors,
        );
        assert_eq!(decoded, json!("hello"));
        let untouched = unmarshal(
            json!("aGVsbG8="),
            &schema30,
            &ext,
            OpenApiVersion::V31,
            &mut Vec::new(),
            &mut errors,
        );
        assert_eq!(untouched, json!("aGVsbG8="));
        let decoded = unmarshal(
            json!("aGVsbG8="),
            &schema31,
            &ext,
            OpenApiVersion::V31,
            &mut Vec::new(),
            &mut errors,
        );
        assert_eq!(decoded, json!("hello"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_unmarshal_failure_reports_field() {
        let mut ext = Extensions::new();
        ext.add_unmarshaller("never", |_: &Value| Err("nope".to_string()));
        let schema = json!({"properties": {"a": {"format": "never"}}});
        let mut errors = Vec::new();
        unmarshal(
            json!({"a": 1}),
            &schema,
            &ext,
            OpenApiVersion::V30,
            &mut Vec::new(),
            &mut errors,
        );
        assert_eq!(
            errors,
            vec![OpenApiError::FormatUnmarshalError {
                field: Some("a".into()),
                format: "never".into(),
                message: "nope".into(),
            }]
        );
    }
}

//! Schema compilation and error reporting on top of `jsonschema`.
//!
//! Every schema an operation can be checked against is compiled once when
//! the spec is registered. OpenAPI 3.0 schemas are compiled as Draft 4
//! after rewriting `nullable`, 3.1 schemas as Draft 2020-12.

use super::error::{OpenApiError, PathSegment, SchemaError};
use super::extensions::Extensions;
use crate::errors::{SpecIssue, SpecValidationError};
use crate::spec::{escape_pointer, OpenApiVersion, Specification};
use base64::Engine as _;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// A compiled schema plus the exact document it was compiled from, used to
/// look up keyword values when describing failures.
pub struct CompiledSchema {
    validator: jsonschema::Validator,
    schema: Value,
    extensions: Arc<Extensions>,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

impl CompiledSchema {
    pub fn compile(
        schema: Value,
        version: OpenApiVersion,
        extensions: Arc<Extensions>,
    ) -> Result<Self, String> {
        let mut opts = jsonschema::options();
        match version {
            OpenApiVersion::V30 => opts.with_draft(jsonschema::Draft::Draft4),
            OpenApiVersion::V31 => opts.with_draft(jsonschema::Draft::Draft202012),
        };
        opts.should_validate_formats(true);
        if version == OpenApiVersion::V30 {
            opts.with_format("byte", |s: &str| {
                base64::engine::general_purpose::STANDARD
                    .decode(s.as_bytes())
                    .is_ok()
            });
            opts.with_format("binary", |_: &str| true);
        }
        for (name, format) in extensions.formats() {
            let format = Arc::clone(format);
            opts.with_format(name.clone(), move |s: &str| format.validate(s).is_ok());
        }
        let validator = opts.build(&schema).map_err(|e| e.to_string())?;
        Ok(Self {
            validator,
            schema,
            extensions,
        })
    }

    /// The schema as compiled (refs inlined, dialect adjusted).
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Every failure for `instance`, in discovery order.
    pub fn validate(&self, instance: &Value) -> Vec<OpenApiError> {
        let mut out = Vec::new();
        let mut reported_required: HashSet<String> = HashSet::new();

        for err in self.validator.iter_errors(instance) {
            let instance_path = err.instance_path.to_string();
            let schema_path = err.schema_path.to_string();
            let keyword = schema_path.rsplit('/').next().unwrap_or("").to_string();
            let keyword_value = self.schema.pointer(&schema_path);
            let failing: &Value = &err.instance;
            let path = PathSegment::parse_pointer(&instance_path);

            if keyword == "required" {
                // One engine error may stand for several absent properties.
                if !reported_required.insert(instance_path.clone()) {
                    continue;
                }
                for property in missing_required(keyword_value, failing) {
                    out.push(OpenApiError::Schema(SchemaError {
                        message: format!(
                            "{} is a required property",
                            value_repr(&Value::String(property.clone()))
                        ),
                        keyword: keyword.clone(),
                        path: path.clone(),
                        missing_property: Some(property),
                    }));
                }
                continue;
            }

            if keyword == "format" {
                let custom = keyword_value
                    .and_then(Value::as_str)
                    .and_then(|name| self.extensions.format(name).map(|f| (name, f)));
                if let Some((name, format)) = custom {
                    let message = failing
                        .as_str()
                        .and_then(|s| format.validate(s).err())
                        .unwrap_or_else(|| {
                            format!("{} is not a {}", value_repr(failing), value_repr(&Value::from(name)))
                        });
                    let field = path.iter().map(ToString::to_string).collect::<Vec<_>>().join("/");
                    out.push(OpenApiError::InvalidCustomFormatterValue {
                        field: if field.is_empty() { None } else { Some(field) },
                        format: name.to_string(),
                        message,
                    });
                    continue;
                }
            }

            let message = describe(&keyword, keyword_value, failing, &self.schema, &schema_path)
                .unwrap_or_else(|| err.to_string());
            out.push(OpenApiError::Schema(SchemaError {
                message,
                keyword,
                path,
                missing_property: None,
            }));
        }
        out
    }
}

fn missing_required(required: Option<&Value>, instance: &Value) -> Vec<String> {
    let Some(names) = required.and_then(Value::as_array) else {
        return Vec::new();
    };
    let Some(obj) = instance.as_object() else {
        return Vec::new();
    };
    names
        .iter()
        .filter_map(Value::as_str)
        .filter(|name| !obj.contains_key(*name))
        .map(str::to_owned)
        .collect()
}

/// Render a JSON value the way schema messages quote it: quoted strings,
/// `True`/`False`/`None` for literals.
pub fn value_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.contains('\'') && !s.contains('"') {
                format!("\"{s}\"")
            } else {
                format!("'{}'", s.replace('\'', "\\'"))
            }
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(value_repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(obj) => {
            let inner: Vec<String> = obj
                .iter()
                .map(|(k, v)| format!("{}: {}", value_repr(&Value::String(k.clone())), value_repr(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn describe(
    keyword: &str,
    keyword_value: Option<&Value>,
    instance: &Value,
    schema: &Value,
    schema_path: &str,
) -> Option<String> {
    let repr = value_repr(instance);
    let kv = keyword_value?;
    let message = match keyword {
        "type" => {
            let types = match kv {
                Value::String(t) => t.clone(),
                Value::Array(ts) => ts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => return None,
            };
            format!("{repr} is not of type {types}")
        }
        "minLength" | "minItems" => format!("{repr} is too short"),
        "maxLength" | "maxItems" => format!("{repr} is too long"),
        "minProperties" => format!("{repr} does not have enough properties"),
        "maxProperties" => format!("{repr} has too many properties"),
        "pattern" => format!("{repr} does not match {}", value_repr(kv)),
        "format" => format!("{repr} is not a {}", value_repr(kv)),
        "enum" => format!("{repr} is not one of {}", value_repr(kv)),
        "const" => format!("{} was expected", value_repr(kv)),
        "minimum" => format!("{repr} is less than the minimum of {kv}"),
        "maximum" => format!("{repr} is greater than the maximum of {kv}"),
        "exclusiveMinimum" if kv.is_number() => {
            format!("{repr} is less than or equal to the minimum of {kv}")
        }
        "exclusiveMaximum" if kv.is_number() => {
            format!("{repr} is greater than or equal to the maximum of {kv}")
        }
        "multipleOf" => format!("{repr} is not a multiple of {kv}"),
        "uniqueItems" => format!("{repr} has non-unique elements"),
        "anyOf" | "oneOf" => format!("{repr} is not valid under any of the given schemas"),
        "not" => format!("{repr} should not be valid under {}", value_repr(kv)),
        "additionalProperties" => {
            let parent_path = schema_path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            let declared = schema
                .pointer(parent_path)
                .and_then(|p| p.get("properties"))
                .and_then(Value::as_object);
            let extras: Vec<String> = instance
                .as_object()?
                .keys()
                .filter(|k| !declared.is_some_and(|d| d.contains_key(*k)))
                .map(|k| value_repr(&Value::String(k.clone())))
                .collect();
            let verb = if extras.len() == 1 { "was" } else { "were" };
            format!(
                "Additional properties are not allowed ({} {verb} unexpected)",
                extras.join(", ")
            )
        }
        _ => return None,
    };
    Some(message)
}

/// Rewrite OpenAPI 3.0 `nullable: true` into a Draft 4 type union.
pub(crate) fn convert_nullable(value: &mut Value) {
    match value {
        Value::Object(obj) => {
            if obj.get("nullable") == Some(&Value::Bool(true)) {
                match obj.get_mut("type") {
                    Some(Value::String(t)) => {
                        let t = std::mem::take(t);
                        obj.insert(
                            "type".to_string(),
                            Value::Array(vec![Value::String(t), Value::from("null")]),
                        );
                    }
                    Some(Value::Array(types)) => {
                        if !types.iter().any(|t| t == "null") {
                            types.push(Value::from("null"));
                        }
                    }
                    _ => {}
                }
                if let Some(Value::Array(options)) = obj.get_mut("enum") {
                    if !options.contains(&Value::Null) {
                        options.push(Value::Null);
                    }
                }
            }
            for v in obj.values_mut() {
                convert_nullable(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(convert_nullable),
        _ => {}
    }
}

/// Precompiled schemas of one document, keyed by JSON pointer.
#[derive(Debug, Default)]
pub struct SchemaSet {
    schemas: HashMap<String, CompiledSchema>,
}

impl SchemaSet {
    /// Compile every parameter, request body and response schema.
    pub fn compile(
        spec: &Specification,
        extensions: Arc<Extensions>,
    ) -> Result<Self, SpecValidationError> {
        let version = spec.version();
        let mut components = spec.document().get("components").cloned();
        if version == OpenApiVersion::V30 {
            if let Some(c) = components.as_mut() {
                convert_nullable(c);
            }
        }

        let mut pointers: Vec<String> = Vec::new();
        for op in spec.operations() {
            pointers.extend(
                op.parameters
                    .iter()
                    .filter(|p| !p.schema_pointer.is_empty())
                    .map(|p| p.schema_pointer.clone()),
            );
            let Some(operation) = spec.document().pointer(&op.pointer) else {
                continue;
            };
            if let Some(body) = operation.get("requestBody") {
                let (body, body_pointer) =
                    spec.resolve_with_pointer(body, format!("{}/requestBody", op.pointer));
                pointers.extend(content_schema_pointers(body, &body_pointer));
            }
            if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
                for (status, response) in responses {
                    let (response, response_pointer) = spec.resolve_with_pointer(
                        response,
                        format!("{}/responses/{}", op.pointer, escape_pointer(status)),
                    );
                    pointers.extend(content_schema_pointers(response, &response_pointer));
                }
            }
        }

        let mut schemas = HashMap::new();
        let mut issues = Vec::new();
        for pointer in pointers {
            if schemas.contains_key(&pointer) {
                continue;
            }
            let Some(raw) = spec.document().pointer(&pointer) else {
                continue;
            };
            let mut schema = spec.expand(raw);
            if version == OpenApiVersion::V30 {
                convert_nullable(&mut schema);
            }
            // Recursive schemas keep their refs; make them resolvable.
            if contains_ref(&schema) {
                if let (Value::Object(obj), Some(c)) = (&mut schema, components.as_ref()) {
                    obj.insert("components".to_string(), c.clone());
                }
            }
            match CompiledSchema::compile(schema, version, Arc::clone(&extensions)) {
                Ok(compiled) => {
                    debug!(pointer = %pointer, "Compiled schema");
                    schemas.insert(pointer, compiled);
                }
                Err(err) => issues.push(SpecIssue::new(&pointer, "InvalidSchema", err)),
            }
        }

        if !issues.is_empty() {
            return Err(SpecValidationError {
                path: spec.filepath().to_path_buf(),
                issues,
            });
        }
        info!(
            spec = %spec.filepath().display(),
            schemas_count = schemas.len(),
            "Schemas precompiled"
        );
        Ok(Self { schemas })
    }

    pub fn get(&self, pointer: &str) -> Option<&CompiledSchema> {
        self.schemas.get(pointer)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Pointer of the schema of one media type inside a body or response object.
pub(crate) fn media_schema_pointer(owner_pointer: &str, media_type: &str) -> String {
    format!("{owner_pointer}/content/{}/schema", escape_pointer(media_type))
}

fn content_schema_pointers(owner: &Value, owner_pointer: &str) -> Vec<String> {
    owner
        .get("content")
        .and_then(Value::as_object)
        .map(|content| {
            content
                .iter()
                .filter(|(_, media)| media.get("schema").is_some())
                .map(|(media_type, _)| media_schema_pointer(owner_pointer, media_type))
                .collect()
        })
        .unwrap_or_default()
}

fn contains_ref(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.contains_key("$ref") || obj.values().any(contains_ref),
        Value::Array(items) => items.iter().any(contains_ref),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(schema: Value, version: OpenApiVersion) -> CompiledSchema {
        CompiledSchema::compile(schema, version, Arc::new(Extensions::new())).unwrap()
    }

    fn messages(errors: &[OpenApiError]) -> Vec<String> {
        errors.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_value_repr() {
        assert_eq!(value_repr(&json!("yo")), "'yo'");
        assert_eq!(value_repr(&json!(1)), "1");
        assert_eq!(value_repr(&json!(["a", true, null])), "['a', True, None]");
        assert_eq!(value_repr(&json!({"a": 1})), "{'a': 1}");
    }

    #[test]
    fn test_string_length_messages() {
        let schema = compile(
            json!({"type": "string", "minLength": 3, "maxLength": 3}),
            OpenApiVersion::V30,
        );
        assert_eq!(messages(&schema.validate(&json!("yo"))), vec!["'yo' is too short"]);
        assert_eq!(messages(&schema.validate(&json!("1234"))), vec!["'1234' is too long"]);
        assert!(schema.validate(&json!("abc")).is_empty());
    }

    #[test]
    fn test_required_and_type_messages() {
        let schema = compile(
            json!({
                "type": "object",
                "required": ["foo", "bar"],
                "properties": {"baz": {"type": "string"}}
            }),
            OpenApiVersion::V31,
        );
        let errors = schema.validate(&json!({"baz": 1}));
        let mut msgs = messages(&errors);
        msgs.sort();
        assert_eq!(
            msgs,
            vec![
                "'bar' is a required property",
                "'foo' is a required property",
                "1 is not of type string",
            ]
        );
        let baz = errors
            .iter()
            .find(|e| e.to_string() == "1 is not of type string")
            .unwrap();
        assert_eq!(baz.path(), Some(&[PathSegment::Key("baz".into())][..]));
    }

    #[test]
    fn test_nested_array_path() {
        let schema = compile(
            json!({
                "type": "object",
                "properties": {
                    "foo": {"type": "array", "items": {
                        "type": "object",
                        "properties": {"bam": {"type": "number"}}
                    }}
                }
            }),
            OpenApiVersion::V30,
        );
        let errors = schema.validate(&json!({"foo": [{"bam": "not a number"}]}));
        assert_eq!(messages(&errors), vec!["'not a number' is not of type number"]);
        assert_eq!(
            errors[0].path(),
            Some(
                &[
                    PathSegment::Key("foo".into()),
                    PathSegment::Index(0),
                    PathSegment::Key("bam".into())
                ][..]
            )
        );
    }

    #[test]
    fn test_nullable_for_3_0() {
        let mut schema = json!({"type": "string", "nullable": true, "enum": ["a"]});
        convert_nullable(&mut schema);
        assert_eq!(schema["type"], json!(["string", "null"]));
        assert_eq!(schema["enum"], json!(["a", null]));
        let compiled = compile(schema, OpenApiVersion::V30);
        assert!(compiled.is_valid(&Value::Null));
    }

    #[test]
    fn test_custom_format_error() {
        let mut ext = Extensions::new();
        ext.add_format("unique-name", |s: &str| {
            if s == "taken" {
                Err("Name is not unique.".to_string())
            } else {
                Ok(())
            }
        });
        let schema = CompiledSchema::compile(
            json!({"type": "object", "properties": {"name": {"type": "string", "format": "unique-name"}}}),
            OpenApiVersion::V30,
            Arc::new(ext),
        )
        .unwrap();
        let errors = schema.validate(&json!({"name": "taken"}));
        assert_eq!(
            errors,
            vec![OpenApiError::InvalidCustomFormatterValue {
                field: Some("name".into()),
                format: "unique-name".into(),
                message: "Name is not unique.".into(),
            }]
        );
        assert!(schema.validate(&json!({"name": "free"})).is_empty());
    }

    #[test]
    fn test_byte_format_for_3_0() {
        let schema = compile(json!({"type": "string", "format": "byte"}), OpenApiVersion::V30);
        assert!(schema.is_valid(&json!("aGVsbG8=")));
        assert!(!schema.is_valid(&json!("not base64!")));
    }

    #[test]
    fn test_enum_and_additional_properties() {
        let schema = compile(
            json!({"type": "object", "additionalProperties": false,
                   "properties": {"a": {"enum": ["x", "y"]}}}),
            OpenApiVersion::V31,
        );
        let msgs = messages(&schema.validate(&json!({"a": "z", "b": 1})));
        assert!(msgs.contains(&"'z' is not one of ['x', 'y']".to_string()));
        assert!(msgs.contains(&"Additional properties are not allowed ('b' was unexpected)".to_string()));
    }
}

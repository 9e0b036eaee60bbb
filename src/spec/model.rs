use super::check::check_document;
use super::load::{bundle_document, read_document};
use super::types::{OpenApiVersion, OperationMeta, ParameterLocation, ParameterMeta, ParameterStyle};
use super::HTTP_METHODS;
use crate::errors::{SpecIssue, SpecValidationError};
use crate::framework::{captured_params, path_to_regex};
use crate::validator::OpenApiError;
use oas3::OpenApiV3Spec;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How deep local `$ref` chains are followed before giving up.
const MAX_REF_DEPTH: usize = 16;

/// Escape one JSON pointer segment.
pub(crate) fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Typed parse of the document header (`openapi`, `info`, `servers`).
///
/// Paths and schemas stay untyped so both 3.0 and 3.1 schema dialects pass.
pub(crate) fn parse_header(doc: &Value) -> Result<OpenApiV3Spec, serde_json::Error> {
    let mut header = serde_json::Map::new();
    for key in ["openapi", "info", "servers"] {
        if let Some(v) = doc.get(key) {
            header.insert(key.to_string(), v.clone());
        }
    }
    serde_json::from_value(Value::Object(header))
}

/// Base path of a server URL, `""` for the root.
pub(crate) fn server_base_path(url_str: &str) -> String {
    url::Url::parse(url_str)
        .or_else(|_| url::Url::parse(&format!("http://dummy{url_str}")))
        .map(|u| {
            let p = u.path().trim_end_matches('/');
            if p == "/" || p.is_empty() {
                String::new()
            } else {
                p.to_string()
            }
        })
        .unwrap_or_default()
}

#[derive(Debug)]
struct PathTemplate {
    path: String,
    regex: Regex,
    params: Vec<String>,
}

/// An operation located for a concrete request.
#[derive(Debug, Clone)]
pub struct OperationMatch<'a> {
    /// Declared path template.
    pub path: &'a str,
    /// Lowercase method.
    pub method: String,
    pub operation: &'a Value,
    pub path_item: &'a Value,
    /// JSON pointer of the operation inside the document.
    pub pointer: String,
    /// Parameters captured from the literal path when it was not a template.
    pub path_params: BTreeMap<String, String>,
}

/// A parsed and structurally valid OpenAPI document. Immutable once built.
#[derive(Debug)]
pub struct Specification {
    document: Value,
    version: OpenApiVersion,
    title: String,
    filepath: PathBuf,
    files: Vec<PathBuf>,
    templates: Vec<PathTemplate>,
    server_prefixes: Vec<String>,
}

impl Specification {
    /// Load a single-file document.
    pub fn from_file(path: &Path) -> Result<Self, SpecValidationError> {
        let document = read_document(path).map_err(|err| load_error(path, err))?;
        Self::from_value(document, path.to_path_buf(), vec![path.to_path_buf()])
    }

    /// Load a document that references sibling files in its directory.
    pub fn from_directory(root: &Path) -> Result<Self, SpecValidationError> {
        let bundle = bundle_document(root).map_err(|err| load_error(root, err))?;
        Self::from_value(bundle.document, root.to_path_buf(), bundle.files)
    }

    /// Build from an already parsed document.
    pub fn from_value(
        document: Value,
        filepath: PathBuf,
        files: Vec<PathBuf>,
    ) -> Result<Self, SpecValidationError> {
        let mut issues = check_document(&document);
        if !issues.is_empty() {
            return Err(SpecValidationError {
                path: filepath,
                issues,
            });
        }

        let header = parse_header(&document).map_err(|err| SpecValidationError {
            path: filepath.clone(),
            issues: vec![SpecIssue::new("$", "InvalidDocument", err.to_string())],
        })?;
        let Some(version) = OpenApiVersion::detect(&header.openapi) else {
            return Err(SpecValidationError {
                path: filepath,
                issues: vec![SpecIssue::new(
                    "openapi",
                    "UnsupportedVersion",
                    header.openapi.clone(),
                )],
            });
        };

        let server_prefixes: Vec<String> = header
            .servers
            .iter()
            .map(|server| server_base_path(&server.url))
            .filter(|p| !p.is_empty())
            .collect();

        let mut templates = Vec::new();
        if let Some(paths) = document.get("paths").and_then(Value::as_object) {
            for path in paths.keys() {
                match path_to_regex(path) {
                    Ok((regex, params)) => templates.push(PathTemplate {
                        path: path.clone(),
                        regex,
                        params,
                    }),
                    Err(err) => issues.push(SpecIssue::new(path, "InvalidPath", err.to_string())),
                }
            }
        }
        if !issues.is_empty() {
            return Err(SpecValidationError {
                path: filepath,
                issues,
            });
        }

        info!(
            spec = %filepath.display(),
            title = %header.info.title,
            version = %version,
            paths_count = templates.len(),
            "OpenAPI specification loaded"
        );

        Ok(Self {
            document,
            version,
            title: header.info.title,
            filepath,
            files,
            templates,
            server_prefixes,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn version(&self) -> OpenApiVersion {
        self.version
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Every file the document was assembled from.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Declared path templates in document order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.path.as_str())
    }

    /// Non-root base paths of the declared servers, e.g. `/api/v1`.
    pub fn server_prefixes(&self) -> &[String] {
        &self.server_prefixes
    }

    /// Follow a chain of local `$ref`s.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        self.resolve_with_pointer(value, String::new()).0
    }

    /// Follow local `$ref`s, tracking the pointer of the final target.
    pub fn resolve_with_pointer<'a>(&'a self, value: &'a Value, pointer: String) -> (&'a Value, String) {
        let mut current = value;
        let mut pointer = pointer;
        for _ in 0..MAX_REF_DEPTH {
            let Some(target) = current
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix('#'))
            else {
                break;
            };
            match self.document.pointer(target) {
                Some(next) => {
                    pointer = target.to_string();
                    current = next;
                }
                None => break,
            }
        }
        (current, pointer)
    }

    /// Copy of `value` with local `$ref`s inlined, up to a fixed depth.
    ///
    /// Inlined component schemas are tagged with `x-ref-name`. References
    /// past the depth limit are kept as is.
    pub fn expand(&self, value: &Value) -> Value {
        let mut out = value.clone();
        self.expand_refs(&mut out, 0);
        out
    }

    fn expand_refs(&self, value: &mut Value, depth: usize) {
        match value {
            Value::Object(obj) => {
                if depth < MAX_REF_DEPTH {
                    let target = obj
                        .get("$ref")
                        .and_then(Value::as_str)
                        .and_then(|r| r.strip_prefix('#'))
                        .map(str::to_owned);
                    if let Some(pointer) = target {
                        if let Some(resolved) = self.document.pointer(&pointer) {
                            let mut new_val = resolved.clone();
                            self.expand_refs(&mut new_val, depth + 1);
                            if let (Some(name), Value::Object(o)) =
                                (pointer.strip_prefix("/components/schemas/"), &mut new_val)
                            {
                                o.entry("x-ref-name")
                                    .or_insert_with(|| Value::String(name.to_string()));
                            }
                            *value = new_val;
                            return;
                        }
                    }
                }
                for v in obj.values_mut() {
                    self.expand_refs(v, depth);
                }
            }
            Value::Array(items) => {
                for v in items.iter_mut() {
                    self.expand_refs(v, depth);
                }
            }
            _ => {}
        }
    }

    fn path_item(&self, path: &str) -> Option<(&Value, String)> {
        let item = self.document.get("paths")?.get(path)?;
        let pointer = format!("/paths/{}", escape_pointer(path));
        Some(self.resolve_with_pointer(item, pointer))
    }

    /// Locate the operation for `method` on a request path.
    ///
    /// Server base paths are stripped first. A declared template equal to
    /// the path wins over a template that merely matches it.
    pub fn find_operation(
        &self,
        method: &str,
        path: &str,
        url: &str,
    ) -> Result<OperationMatch<'_>, OpenApiError> {
        let method = method.to_ascii_lowercase();
        let mut candidates: Vec<&str> = self
            .server_prefixes
            .iter()
            .filter_map(|prefix| path.strip_prefix(prefix.as_str()))
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .map(|rest| if rest.is_empty() { "/" } else { rest })
            .collect();
        candidates.push(path);

        let exact = candidates.iter().find_map(|candidate| {
            self.templates
                .iter()
                .find(|t| t.path == *candidate)
                .map(|t| (t, BTreeMap::new()))
        });
        let found = exact.or_else(|| {
            candidates.iter().find_map(|candidate| {
                self.templates.iter().find_map(|t| {
                    let caps = t.regex.captures(candidate)?;
                    Some((t, captured_params(&caps, &t.params)))
                })
            })
        });

        let Some((template, path_params)) = found else {
            debug!(path, "No declared path matches request");
            return Err(OpenApiError::PathNotFound {
                url: url.to_string(),
            });
        };
        let (path_item, item_pointer) =
            self.path_item(&template.path)
                .ok_or_else(|| OpenApiError::PathNotFound {
                    url: url.to_string(),
                })?;
        let operation = path_item
            .get(method.as_str())
            .ok_or_else(|| OpenApiError::OperationNotFound {
                method: method.clone(),
                url: url.to_string(),
            })?;

        Ok(OperationMatch {
            path: &template.path,
            pointer: format!("{item_pointer}/{method}"),
            method,
            operation,
            path_item,
            path_params,
        })
    }

    /// Every declared operation in document order.
    pub fn operations(&self) -> Vec<OperationMeta> {
        let mut out = Vec::new();
        for template in &self.templates {
            let Some((item, item_pointer)) = self.path_item(&template.path) else {
                continue;
            };
            for method in HTTP_METHODS {
                let Some(operation) = item.get(method) else {
                    continue;
                };
                out.push(OperationMeta {
                    path: template.path.clone(),
                    method: method.to_string(),
                    operation_id: operation
                        .get("operationId")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    parameters: self.parameters(item, &item_pointer, operation, method),
                    pointer: format!("{item_pointer}/{method}"),
                });
            }
        }
        out
    }

    /// Parameters for an operation: path item level merged with operation
    /// level, the latter overriding by name and location.
    pub fn parameters(
        &self,
        path_item: &Value,
        item_pointer: &str,
        operation: &Value,
        method: &str,
    ) -> Vec<ParameterMeta> {
        let mut merged: Vec<ParameterMeta> = Vec::new();
        let levels = [
            (path_item.get("parameters"), format!("{item_pointer}/parameters")),
            (
                operation.get("parameters"),
                format!("{item_pointer}/{method}/parameters"),
            ),
        ];
        for (params, base) in levels {
            let Some(list) = params.and_then(Value::as_array) else {
                continue;
            };
            for (idx, raw) in list.iter().enumerate() {
                let (param, pointer) = self.resolve_with_pointer(raw, format!("{base}/{idx}"));
                let Some(meta) = self.parameter_meta(param, &pointer) else {
                    continue;
                };
                match merged
                    .iter_mut()
                    .find(|p| p.name == meta.name && p.location == meta.location)
                {
                    Some(existing) => *existing = meta,
                    None => merged.push(meta),
                }
            }
        }
        merged
    }

    fn parameter_meta(&self, param: &Value, pointer: &str) -> Option<ParameterMeta> {
        // Only the serialization keys go through oas3; schemas stay untyped.
        let mut head = serde_json::Map::new();
        for key in ["name", "in", "required", "style", "explode", "description", "deprecated"] {
            if let Some(v) = param.get(key) {
                head.insert(key.to_string(), v.clone());
            }
        }
        let typed: oas3::spec::Parameter = match serde_json::from_value(Value::Object(head)) {
            Ok(p) => p,
            Err(err) => {
                warn!(pointer, error = %err, "Skipping malformed parameter");
                return None;
            }
        };

        let location = ParameterLocation::from(typed.location);
        let style = typed
            .style
            .map(ParameterStyle::from)
            .unwrap_or_else(|| ParameterStyle::default_for(location));
        let explode = typed.explode.unwrap_or(style == ParameterStyle::Form);
        let (schema, schema_pointer) = match param.get("schema") {
            Some(schema) => (Some(self.expand(schema)), format!("{pointer}/schema")),
            None => (None, String::new()),
        };

        Some(ParameterMeta {
            name: typed.name,
            location,
            required: location == ParameterLocation::Path || typed.required.unwrap_or(false),
            schema,
            style,
            explode,
            schema_pointer,
        })
    }
}

fn load_error(path: &Path, err: anyhow::Error) -> SpecValidationError {
    SpecValidationError {
        path: path.to_path_buf(),
        issues: vec![SpecIssue::new(
            path.display().to_string(),
            "LoadError",
            format!("{err:#}"),
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(doc: Value) -> Specification {
        Specification::from_value(doc, PathBuf::from("openapi.yaml"), vec![]).unwrap()
    }

    fn sample() -> Specification {
        spec(json!({
            "openapi": "3.0.0",
            "info": {"title": "Sample", "version": "1.0"},
            "servers": [{"url": "http://example.com/api/v1"}, {"url": "/"}],
            "paths": {
                "/foo/{id}": {
                    "parameters": [{"$ref": "#/components/parameters/Id"}],
                    "get": {"operationId": "get_foo", "responses": {"200": {"description": "OK"}}}
                },
                "/foo/bar": {
                    "get": {
                        "parameters": [{"name": "q", "in": "query", "schema": {"$ref": "#/components/schemas/Q"}}],
                        "responses": {"200": {"description": "OK"}}
                    }
                }
            },
            "components": {
                "parameters": {"Id": {"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}},
                "schemas": {"Q": {"type": "string", "minLength": 2}}
            }
        }))
    }

    #[test]
    fn test_server_base_path() {
        assert_eq!(server_base_path("http://example.com/api/v1/"), "/api/v1");
        assert_eq!(server_base_path("/api"), "/api");
        assert_eq!(server_base_path("http://example.com"), "");
    }

    #[test]
    fn test_paths_keep_document_order() {
        let spec = sample();
        assert_eq!(spec.paths().collect::<Vec<_>>(), vec!["/foo/{id}", "/foo/bar"]);
        assert_eq!(spec.server_prefixes(), &["/api/v1".to_string()]);
        assert_eq!(spec.version(), OpenApiVersion::V30);
        assert_eq!(spec.title(), "Sample");
    }

    #[test]
    fn test_find_operation_prefers_exact_template() {
        let spec = sample();
        let found = spec.find_operation("GET", "/foo/bar", "http://x/foo/bar").unwrap();
        assert_eq!(found.path, "/foo/bar");
        let found = spec.find_operation("get", "/api/v1/foo/{id}", "u").unwrap();
        assert_eq!(found.path, "/foo/{id}");
        assert!(found.path_params.is_empty());
        let found = spec.find_operation("get", "/foo/12", "u").unwrap();
        assert_eq!(found.path_params.get("id").map(String::as_str), Some("12"));
    }

    #[test]
    fn test_find_operation_errors() {
        let spec = sample();
        assert_eq!(
            spec.find_operation("get", "/nope", "http://localhost/nope").unwrap_err(),
            OpenApiError::PathNotFound {
                url: "http://localhost/nope".into()
            }
        );
        assert!(matches!(
            spec.find_operation("post", "/foo/bar", "u").unwrap_err(),
            OpenApiError::OperationNotFound { .. }
        ));
    }

    #[test]
    fn test_operations_merge_parameters() {
        let spec = sample();
        let ops = spec.operations();
        assert_eq!(ops.len(), 2);
        let get_foo = &ops[0];
        assert_eq!(get_foo.operation_id.as_deref(), Some("get_foo"));
        assert_eq!(get_foo.parameters[0].name, "id");
        assert_eq!(get_foo.parameters[0].location, ParameterLocation::Path);
        assert_eq!(get_foo.parameters[0].schema_pointer, "/components/parameters/Id/schema");
        let q = &ops[1].parameters[0];
        assert_eq!(q.style, ParameterStyle::Form);
        assert!(!q.required);
        assert_eq!(q.schema.as_ref().unwrap()["minLength"], json!(2));
        assert_eq!(q.schema.as_ref().unwrap()["x-ref-name"], json!("Q"));
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        let err = Specification::from_value(
            json!({"openapi": "3.0.0", "paths": {}}),
            PathBuf::from("bad.yaml"),
            vec![],
        )
        .unwrap_err();
        assert_eq!(err.path, PathBuf::from("bad.yaml"));
        assert!(!err.issues.is_empty());
    }
}

//! Structural checks on an OpenAPI document.
//!
//! This is not request or response validation: it makes sure the document
//! is usable at all. Every problem is collected so they can be fixed in one
//! pass.

use super::types::{OpenApiVersion, ParameterLocation};
use super::HTTP_METHODS;
use crate::errors::SpecIssue;
use serde_json::Value;
use std::collections::HashSet;

/// Check `doc` and return every issue found.
pub fn check_document(doc: &Value) -> Vec<SpecIssue> {
    let mut issues = Vec::new();

    let Some(root) = doc.as_object() else {
        issues.push(SpecIssue::new(
            "$",
            "InvalidDocument",
            "document root must be a mapping",
        ));
        return issues;
    };

    let version = match root.get("openapi").and_then(Value::as_str) {
        Some(v) => match OpenApiVersion::detect(v) {
            Some(version) => Some(version),
            None => {
                issues.push(SpecIssue::new(
                    "openapi",
                    "UnsupportedVersion",
                    format!("unsupported OpenAPI version {v}, expected 3.0.x or 3.1.x"),
                ));
                None
            }
        },
        None => {
            issues.push(SpecIssue::new(
                "openapi",
                "MissingField",
                "'openapi' version string is required",
            ));
            None
        }
    };

    match root.get("info").and_then(Value::as_object) {
        Some(info) => {
            for key in ["title", "version"] {
                if !info.get(key).is_some_and(Value::is_string) {
                    issues.push(SpecIssue::new(
                        "info",
                        "MissingField",
                        format!("'{key}' is required"),
                    ));
                }
            }
        }
        None => issues.push(SpecIssue::new("info", "MissingField", "'info' is required")),
    }

    match root.get("paths") {
        Some(Value::Object(paths)) => {
            for (path, item) in paths {
                check_path_item(doc, path, item, version, &mut issues);
            }
        }
        Some(_) => issues.push(SpecIssue::new("paths", "InvalidType", "'paths' must be a mapping")),
        // 3.1 documents may consist of components or webhooks only
        None if version == Some(OpenApiVersion::V31) => {}
        None => issues.push(SpecIssue::new("paths", "MissingField", "'paths' is required")),
    }

    check_local_refs(doc, doc, "#", &mut issues);

    if issues.is_empty() {
        if let Err(err) = super::model::parse_header(doc) {
            issues.push(SpecIssue::new("$", "InvalidDocument", err.to_string()));
        }
    }

    issues
}

fn check_path_item(
    doc: &Value,
    path: &str,
    item: &Value,
    version: Option<OpenApiVersion>,
    issues: &mut Vec<SpecIssue>,
) {
    if !path.starts_with('/') {
        issues.push(SpecIssue::new(
            path,
            "InvalidPath",
            "path keys must start with '/'",
        ));
    }
    let item = resolve_local(doc, item);
    let Some(item_obj) = item.as_object() else {
        issues.push(SpecIssue::new(path, "InvalidType", "path item must be a mapping"));
        return;
    };

    let shared = declared_path_params(doc, item_obj.get("parameters"), path, issues);

    for method in HTTP_METHODS {
        let Some(operation) = item_obj.get(method) else {
            continue;
        };
        let location = format!("{path} → {method}");
        match operation.get("responses").and_then(Value::as_object) {
            Some(responses) if !responses.is_empty() => {}
            Some(_) if version == Some(OpenApiVersion::V31) => {}
            _ => issues.push(SpecIssue::new(
                &location,
                "MissingResponses",
                "operation must declare at least one response",
            )),
        }

        let mut declared: HashSet<String> = shared.clone();
        declared.extend(declared_path_params(
            doc,
            operation.get("parameters"),
            &location,
            issues,
        ));
        for name in template_params(path) {
            if !declared.contains(&name) {
                issues.push(SpecIssue::new(
                    &location,
                    "MissingPathParameter",
                    format!("path parameter '{name}' is not declared"),
                ));
            }
        }
    }
}

/// Validate a parameter list and return the names of its path parameters.
fn declared_path_params(
    doc: &Value,
    params: Option<&Value>,
    location: &str,
    issues: &mut Vec<SpecIssue>,
) -> HashSet<String> {
    let mut names = HashSet::new();
    let Some(params) = params else {
        return names;
    };
    let Some(list) = params.as_array() else {
        issues.push(SpecIssue::new(location, "InvalidType", "'parameters' must be a list"));
        return names;
    };
    for param in list {
        let param = resolve_local(doc, param);
        let name = param.get("name").and_then(Value::as_str);
        let place = param
            .get("in")
            .and_then(Value::as_str)
            .and_then(ParameterLocation::parse);
        match (name, place) {
            (Some(name), Some(ParameterLocation::Path)) => {
                if param.get("required").and_then(Value::as_bool) != Some(true) {
                    issues.push(SpecIssue::new(
                        location,
                        "InvalidParameter",
                        format!("path parameter '{name}' must be required"),
                    ));
                }
                names.insert(name.to_string());
            }
            (Some(_), Some(_)) => {}
            _ => issues.push(SpecIssue::new(
                location,
                "InvalidParameter",
                "parameters need a 'name' and a valid 'in'",
            )),
        }
    }
    names
}

/// Placeholder names in a path template.
pub(crate) fn template_params(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    names
}

fn resolve_local<'a>(doc: &'a Value, value: &'a Value) -> &'a Value {
    value
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix('#'))
        .and_then(|pointer| doc.pointer(pointer))
        .unwrap_or(value)
}

fn check_local_refs(doc: &Value, value: &Value, location: &str, issues: &mut Vec<SpecIssue>) {
    match value {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                if let Some(pointer) = reference.strip_prefix('#') {
                    if doc.pointer(pointer).is_none() {
                        issues.push(SpecIssue::new(
                            location,
                            "UnresolvedRef",
                            format!("reference {reference} does not resolve"),
                        ));
                    }
                }
            }
            for (key, v) in obj {
                check_local_refs(doc, v, &format!("{location}/{key}"), issues);
            }
        }
        Value::Array(items) => {
            for (idx, v) in items.iter().enumerate() {
                check_local_refs(doc, v, &format!("{location}/{idx}"), issues);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_document_has_no_issues() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "Foo", "version": "1.0"},
            "paths": {
                "/foo/{id}": {
                    "get": {
                        "parameters": [{"name": "id", "in": "path", "required": true,
                                        "schema": {"type": "integer"}}],
                        "responses": {"200": {"description": "OK"}}
                    }
                }
            }
        });
        assert!(check_document(&doc).is_empty());
    }

    #[test]
    fn test_collects_every_issue() {
        let doc = json!({
            "openapi": "2.0",
            "info": {"title": "Foo"},
            "paths": {
                "/foo/{id}": {"get": {}},
                "/bar": {"post": {"responses": {"200": {"$ref": "#/components/responses/Nope"}}}}
            }
        });
        let kinds: Vec<String> = check_document(&doc).into_iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&"UnsupportedVersion".to_string()));
        assert!(kinds.contains(&"MissingField".to_string()));
        assert!(kinds.contains(&"MissingResponses".to_string()));
        assert!(kinds.contains(&"MissingPathParameter".to_string()));
        assert!(kinds.contains(&"UnresolvedRef".to_string()));
    }

    #[test]
    fn test_template_params() {
        assert_eq!(template_params("/a/{x}/b/{y}"), vec!["x", "y"]);
        assert!(template_params("/a").is_empty());
    }
}

use super::error::OpenApiError;
use super::media::{deserialize_body, find_media_type};
use super::params::{deserialize_parameter, raw_values};
use super::schema::media_schema_pointer;
use super::security::check_security;
use super::{Engine, OpenApiRequest, RequestValidator, ValidatedData, ValidationOutcome};
use crate::spec::{OperationMatch, ParameterLocation};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Validates requests against the operations of one document.
#[derive(Debug, Clone)]
pub struct OpenApiRequestValidator {
    engine: Arc<Engine>,
}

impl OpenApiRequestValidator {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    fn validate_parameters(
        &self,
        found: &OperationMatch<'_>,
        request: &OpenApiRequest,
        data: &mut ValidatedData,
        errors: &mut Vec<OpenApiError>,
    ) {
        let spec = self.engine.spec();
        let item_pointer = found
            .pointer
            .rsplit_once('/')
            .map(|(p, _)| p)
            .unwrap_or_default();
        let mut sources = request.parameters.clone();
        // Path values captured while matching a literal path fill in for a
        // missing route matchdict.
        for (name, value) in &found.path_params {
            sources
                .path
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        for meta in spec.parameters(found.path_item, item_pointer, found.operation, &found.method) {
            let values = raw_values(&sources, &meta);
            let value = if values.is_empty() {
                if meta.required {
                    errors.push(OpenApiError::MissingRequiredParameter {
                        name: meta.name.clone(),
                        location: meta.location,
                    });
                    continue;
                }
                match meta.schema.as_ref().and_then(|s| s.get("default")) {
                    Some(default) => default.clone(),
                    None => continue,
                }
            } else {
                match deserialize_parameter(&meta, &values) {
                    Ok(v) => v,
                    Err(err) => {
                        errors.push(err);
                        continue;
                    }
                }
            };

            let value = if meta.schema_pointer.is_empty() {
                value
            } else {
                match self.engine.check_value(&meta.schema_pointer, value) {
                    Ok(v) => v,
                    Err(failure) => {
                        errors.extend(failure.into_errors(Some(meta.name.as_str())));
                        continue;
                    }
                }
            };

            let target = match meta.location {
                ParameterLocation::Path => &mut data.parameters.path,
                ParameterLocation::Query => &mut data.parameters.query,
                ParameterLocation::Header => &mut data.parameters.header,
                ParameterLocation::Cookie => &mut data.parameters.cookie,
            };
            target.insert(meta.name.clone(), value);
        }
    }

    fn validate_body(
        &self,
        found: &OperationMatch<'_>,
        request: &OpenApiRequest,
        data: &mut ValidatedData,
        errors: &mut Vec<OpenApiError>,
    ) {
        let spec = self.engine.spec();
        let Some(body_decl) = found.operation.get("requestBody") else {
            return;
        };
        let (body_decl, body_pointer) =
            spec.resolve_with_pointer(body_decl, format!("{}/requestBody", found.pointer));

        if request.body.is_empty() {
            if body_decl.get("required").and_then(Value::as_bool) == Some(true) {
                errors.push(OpenApiError::MissingRequestBody);
            }
            return;
        }

        let Some(content) = body_decl.get("content").and_then(Value::as_object) else {
            return;
        };
        let Some((media_type, media)) = find_media_type(content, &request.mimetype) else {
            errors.push(OpenApiError::MediaTypeNotFound {
                mimetype: request.mimetype.clone(),
                available: content.keys().cloned().collect(),
            });
            return;
        };

        let pointer = media_schema_pointer(&body_pointer, media_type);
        let schema = self.engine.schemas().get(&pointer).map(|c| c.schema());
        let value = match deserialize_body(
            &request.body,
            &request.mimetype,
            schema,
            self.engine.extensions(),
        ) {
            Ok(v) => v,
            Err(err) => {
                errors.push(err);
                return;
            }
        };

        if media.get("schema").is_none() {
            data.body = Some(value);
            return;
        }
        match self.engine.check_value(&pointer, value) {
            Ok(v) => data.body = Some(v),
            Err(failure) => errors.extend(failure.into_errors(None)),
        }
    }
}

impl RequestValidator for OpenApiRequestValidator {
    fn validate(&self, request: &OpenApiRequest) -> ValidationOutcome {
        let spec = self.engine.spec();
        let found = match spec.find_operation(
            &request.method,
            &request.path_pattern,
            &request.full_url_pattern,
        ) {
            Ok(found) => found,
            Err(err) => {
                return ValidationOutcome {
                    data: ValidatedData::default(),
                    errors: vec![err],
                }
            }
        };

        if !check_security(spec, found.operation, &request.parameters) {
            debug!(path = %found.path, method = %found.method, "Security requirements not met");
            return ValidationOutcome {
                data: ValidatedData::default(),
                errors: vec![OpenApiError::InvalidSecurity],
            };
        }

        let mut data = ValidatedData::default();
        let mut errors = Vec::new();
        self.validate_parameters(&found, request, &mut data, &mut errors);
        self.validate_body(&found, request, &mut data, &mut errors);
        ValidationOutcome { data, errors }
    }
}

use super::error::OpenApiError;
use super::media::{deserialize_body, find_media_type};
use super::schema::media_schema_pointer;
use super::{Engine, OpenApiRequest, OpenApiResponse, RequestBody, ResponseValidator};
use crate::spec::escape_pointer;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Validates responses against the operations of one document.
#[derive(Debug, Clone)]
pub struct OpenApiResponseValidator {
    engine: Arc<Engine>,
}

impl OpenApiResponseValidator {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// Declared response for a status: exact code, then `NXX`, then `default`.
fn find_response<'a>(
    responses: &'a Map<String, Value>,
    status: u16,
) -> Option<(&'a str, &'a Value)> {
    let exact = status.to_string();
    let range = format!("{}XX", status / 100);
    let found = [exact.as_str(), range.as_str(), "default"]
        .into_iter()
        .find_map(|key| {
            responses
                .iter()
                .find(|(declared, _)| declared.eq_ignore_ascii_case(key))
                .map(|(declared, response)| (declared.as_str(), response))
        });
    found
}

impl ResponseValidator for OpenApiResponseValidator {
    fn validate(&self, request: &OpenApiRequest, response: &OpenApiResponse) -> Vec<OpenApiError> {
        let spec = self.engine.spec();
        let found = match spec.find_operation(
            &request.method,
            &request.path_pattern,
            &request.full_url_pattern,
        ) {
            Ok(found) => found,
            Err(err) => return vec![err],
        };

        let Some((status_key, declared)) = found
            .operation
            .get("responses")
            .and_then(Value::as_object)
            .and_then(|responses| find_response(responses, response.status_code))
        else {
            return vec![OpenApiError::InvalidResponse {
                status: response.status_code,
            }];
        };
        let (declared, response_pointer) = spec.resolve_with_pointer(
            declared,
            format!("{}/responses/{}", found.pointer, escape_pointer(status_key)),
        );

        let mut errors = Vec::new();
        if let Some(headers) = declared.get("headers").and_then(Value::as_object) {
            for (name, header) in headers {
                let header = spec.resolve(header);
                let required = header.get("required").and_then(Value::as_bool) == Some(true);
                let present = response
                    .headers
                    .iter()
                    .any(|(k, _)| k.eq_ignore_ascii_case(name));
                if required && !present {
                    errors.push(OpenApiError::MissingRequiredHeader { name: name.clone() });
                }
            }
        }

        let Some(content) = declared.get("content").and_then(Value::as_object) else {
            return errors;
        };
        if content.is_empty() {
            return errors;
        }
        if response.data.is_empty() {
            errors.push(OpenApiError::MissingResponseContent);
            return errors;
        }
        let Some((media_type, media)) = find_media_type(content, &response.mimetype) else {
            errors.push(OpenApiError::MediaTypeNotFound {
                mimetype: response.mimetype.clone(),
                available: content.keys().cloned().collect(),
            });
            return errors;
        };

        let pointer = media_schema_pointer(&response_pointer, media_type);
        let schema = self.engine.schemas().get(&pointer).map(|c| c.schema());
        let value = match deserialize_body(
            &RequestBody::Raw(response.data.clone()),
            &response.mimetype,
            schema,
            self.engine.extensions(),
        ) {
            Ok(v) => v,
            Err(err) => {
                errors.push(err);
                return errors;
            }
        };
        if media.get("schema").is_some() {
            if let Err(failure) = self.engine.check_value(&pointer, value) {
                errors.extend(failure.into_errors(None));
            }
        }
        errors
    }
}

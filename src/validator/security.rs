//! Presence checks for declared security requirements.
//!
//! Only the transport of credentials is checked; verifying them is left to
//! the application.

use super::params::raw_values;
use super::RequestParameters;
use crate::spec::{ParameterLocation, ParameterMeta, ParameterStyle, Specification};
use serde_json::Value;
use tracing::debug;

/// True when at least one requirement of the effective security list is met.
pub(crate) fn check_security(
    spec: &Specification,
    operation: &Value,
    params: &RequestParameters,
) -> bool {
    let requirements = match operation.get("security") {
        Some(list) => list,
        None => match spec.document().get("security") {
            Some(list) => list,
            None => return true,
        },
    };
    let Some(requirements) = requirements.as_array() else {
        return true;
    };
    if requirements.is_empty() {
        return true;
    }
    let schemes = spec
        .document()
        .pointer("/components/securitySchemes")
        .and_then(Value::as_object);

    requirements.iter().any(|requirement| {
        let Some(requirement) = requirement.as_object() else {
            return false;
        };
        requirement.keys().all(|name| {
            let scheme = schemes.and_then(|s| s.get(name)).map(|s| spec.resolve(s));
            match scheme {
                Some(scheme) => scheme_satisfied(scheme, params),
                None => {
                    debug!(scheme = %name, "Security scheme is not declared");
                    false
                }
            }
        })
    })
}

fn scheme_satisfied(scheme: &Value, params: &RequestParameters) -> bool {
    let kind = scheme.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "apiKey" => {
            let name = scheme.get("name").and_then(Value::as_str).unwrap_or_default();
            let Some(location) = scheme
                .get("in")
                .and_then(Value::as_str)
                .and_then(ParameterLocation::parse)
            else {
                return false;
            };
            !raw_values(params, &presence_probe(name, location)).is_empty()
        }
        "http" => {
            let wanted = scheme
                .get("scheme")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase();
            authorization(params).is_some_and(|(prefix, _)| prefix.to_ascii_lowercase() == wanted)
        }
        "oauth2" | "openIdConnect" => authorization(params)
            .is_some_and(|(prefix, _)| prefix.eq_ignore_ascii_case("bearer")),
        "mutualTLS" => true,
        _ => false,
    }
}

fn presence_probe(name: &str, location: ParameterLocation) -> ParameterMeta {
    ParameterMeta {
        name: name.to_string(),
        location,
        required: true,
        schema: None,
        style: ParameterStyle::default_for(location),
        explode: false,
        schema_pointer: String::new(),
    }
}

/// Scheme and credentials of the Authorization header.
fn authorization(params: &RequestParameters) -> Option<(&str, &str)> {
    let value = params
        .header
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
        .map(|(_, v)| v.trim())?;
    let (prefix, credentials) = value.split_once(' ')?;
    let credentials = credentials.trim();
    if credentials.is_empty() {
        None
    } else {
        Some((prefix, credentials))
    }
}

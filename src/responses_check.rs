//! Required responses check.
//!
//! A YAML file lists the status codes every operation must document:
//!
//! ```yaml
//! required_responses:
//!   get: [200, 400]
//!   post: [201, 400]
//! required_responses_params:
//!   get: [404]
//! allowed_missing_responses:
//!   /status:
//!     get: [400]
//! ```
//!
//! `required_responses_params` applies only to operations taking
//! parameters. `allowed_missing_responses` exempts single operations.

use crate::errors::MissingResponsesError;
use crate::spec::Specification;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

/// A status code written either as a number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StatusCode {
    Number(u16),
    Text(String),
}

impl StatusCode {
    fn key(&self) -> String {
        match self {
            StatusCode::Number(code) => code.to_string(),
            StatusCode::Text(code) => code.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponsesConfig {
    /// Method to codes every operation must declare.
    pub required_responses: HashMap<String, Vec<StatusCode>>,
    /// Method to codes required only when the operation has parameters.
    pub required_responses_params: HashMap<String, Vec<StatusCode>>,
    /// Path to method to codes exempt from the requirements.
    pub allowed_missing_responses: HashMap<String, HashMap<String, Vec<StatusCode>>>,
}

impl ResponsesConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("ERROR Config file not found on: {}", path.display());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading responses config {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing responses config {}", path.display()))
    }

    /// Codes `path`/`method` must declare.
    pub fn required(&self, path: &str, method: &str, has_params: bool) -> BTreeSet<String> {
        let codes = |map: &HashMap<String, Vec<StatusCode>>| -> BTreeSet<String> {
            map.get(method)
                .map(|c| c.iter().map(StatusCode::key).collect())
                .unwrap_or_default()
        };
        let mut required = codes(&self.required_responses);
        if has_params {
            required.extend(codes(&self.required_responses_params));
        }
        if let Some(allowed) = self.allowed_missing_responses.get(path) {
            for code in codes(allowed) {
                required.remove(&code);
            }
        }
        required
    }
}

/// Check every operation of `spec` against `config`, collecting all misses.
pub fn check_required_responses(
    spec: &Specification,
    config: &ResponsesConfig,
) -> Result<(), MissingResponsesError> {
    let mut errors = Vec::new();
    for op in spec.operations() {
        let declared: BTreeSet<String> = spec
            .document()
            .pointer(&op.pointer)
            .and_then(|o| o.get("responses"))
            .and_then(Value::as_object)
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        let required = config.required(&op.path, &op.method, !op.parameters.is_empty());
        for code in required.difference(&declared) {
            errors.push(format!(
                "ERROR missing response '{code}' for '{}' request on path '{}'\n",
                op.method, op.path
            ));
        }
    }
    if errors.is_empty() {
        info!(spec = %spec.filepath().display(), "Required responses check passed");
        return Ok(());
    }
    let count = errors.len();
    errors.push(format!(
        "\nFAILED: Openapi responses check: {count} missing response definitions. \n"
    ));
    Err(MissingResponsesError { errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn spec() -> Specification {
        Specification::from_value(
            json!({
                "openapi": "3.0.0",
                "info": {"title": "t", "version": "1"},
                "paths": {
                    "/foo": {"get": {
                        "parameters": [{"name": "q", "in": "query", "schema": {"type": "string"}}],
                        "responses": {"200": {"description": "OK"}}
                    }},
                    "/status": {"get": {"responses": {"200": {"description": "OK"}}}}
                }
            }),
            PathBuf::from("openapi.yaml"),
            vec![],
        )
        .unwrap()
    }

    fn config(text: &str) -> ResponsesConfig {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_all_misses_collected_with_summary() {
        let cfg = config(
            "required_responses:\n  get: [200, 400]\nrequired_responses_params:\n  get: ['404']\n",
        );
        let err = check_required_responses(&spec(), &cfg).unwrap_err();
        assert_eq!(
            err.errors,
            vec![
                "ERROR missing response '400' for 'get' request on path '/foo'\n",
                "ERROR missing response '404' for 'get' request on path '/foo'\n",
                "ERROR missing response '400' for 'get' request on path '/status'\n",
                "\nFAILED: Openapi responses check: 3 missing response definitions. \n",
            ]
        );
    }

    #[test]
    fn test_allowed_missing_exempts_operation() {
        let cfg = config(
            "required_responses:\n  get: [400]\nallowed_missing_responses:\n  /foo:\n    get: [400]\n  /status:\n    get: [400]\n",
        );
        assert!(check_required_responses(&spec(), &cfg).is_ok());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = ResponsesConfig::from_file(Path::new("/nonexistent/responses.yaml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}

//! # Settings Module
//!
//! Switches controlling which validation stages run, loaded from the
//! environment or a YAML file.
//!
//! ## Environment Variables
//!
//! | variable | default |
//! |----------|---------|
//! | `BRRTGUARD_ENABLE_REQUEST_VALIDATION` | `true` |
//! | `BRRTGUARD_ENABLE_RESPONSE_VALIDATION` | `true` |
//! | `BRRTGUARD_ENABLE_ENDPOINT_VALIDATION` | `true` |
//! | `BRRTGUARD_ADD_EXCEPTION_VIEWS` | `true` |
//! | `BRRTGUARD_RELOAD_SPEC` | `false` |
//! | `BRRTGUARD_RESPONSES_CONFIG` | unset |
//!
//! Boolean values accept `1 true yes on` and `0 false no off` in any case.
//! Anything else keeps the default.
//!
//! ```rust
//! use brrtguard::settings::Settings;
//!
//! let settings = Settings::from_env();
//! if !settings.enable_response_validation {
//!     println!("responses are not checked");
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Validation switches. Read once at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enable_request_validation: bool,
    pub enable_response_validation: bool,
    /// Fail `make_app` when a declared path has no route.
    pub enable_endpoint_validation: bool,
    /// Register the default JSON renderer for validation errors.
    pub add_exception_views: bool,
    /// Watch spec files and log edits.
    pub reload_spec: bool,
    /// YAML file listing response codes every operation must declare.
    pub responses_config: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_request_validation: true,
            enable_response_validation: true,
            enable_endpoint_validation: true,
            add_exception_views: true,
            reload_spec: false,
            responses_config: None,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

impl Settings {
    /// Load settings from `BRRTGUARD_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enable_request_validation: env_flag(
                "BRRTGUARD_ENABLE_REQUEST_VALIDATION",
                defaults.enable_request_validation,
            ),
            enable_response_validation: env_flag(
                "BRRTGUARD_ENABLE_RESPONSE_VALIDATION",
                defaults.enable_response_validation,
            ),
            enable_endpoint_validation: env_flag(
                "BRRTGUARD_ENABLE_ENDPOINT_VALIDATION",
                defaults.enable_endpoint_validation,
            ),
            add_exception_views: env_flag(
                "BRRTGUARD_ADD_EXCEPTION_VIEWS",
                defaults.add_exception_views,
            ),
            reload_spec: env_flag("BRRTGUARD_RELOAD_SPEC", defaults.reload_spec),
            responses_config: env::var("BRRTGUARD_RESPONSES_CONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Load settings from a YAML mapping. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.enable_request_validation);
        assert!(s.enable_response_validation);
        assert!(s.enable_endpoint_validation);
        assert!(s.add_exception_views);
        assert!(!s.reload_spec);
        assert!(s.responses_config.is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_yaml_keeps_defaults_for_missing_keys() {
        let s = Settings::from_yaml_str(
            "enable_response_validation: false\nresponses_config: responses.yaml\n",
        )
        .unwrap();
        assert!(s.enable_request_validation);
        assert!(!s.enable_response_validation);
        assert_eq!(s.responses_config, Some(PathBuf::from("responses.yaml")));
        assert_eq!(Settings::from_yaml_str("").unwrap(), Settings::default());
    }
}

//! Process-wide registry of the mounted OpenAPI documents, keyed by API
//! name.
//!
//! Populated while the application is built and read-only afterwards, so it
//! is shared between requests without locking.

use crate::errors::{ConfigurationError, SpecValidationError};
use crate::spec::Specification;
use crate::validator::{Engine, Extensions, OpenApiRequestValidator, OpenApiResponseValidator};
use std::sync::Arc;
use tracing::info;

/// API name used when none is given.
pub const DEFAULT_API_NAME: &str = "primary";

/// One mounted document with its validators.
#[derive(Debug, Clone)]
pub struct ApiEntry {
    pub name: String,
    pub spec: Arc<Specification>,
    /// Route serving the raw document.
    pub spec_route_name: String,
    pub request_validator: OpenApiRequestValidator,
    pub response_validator: OpenApiResponseValidator,
}

impl ApiEntry {
    /// Compile the document's schemas and build its validators.
    pub fn new(
        name: &str,
        spec: Arc<Specification>,
        spec_route_name: &str,
        extensions: Extensions,
    ) -> Result<Self, SpecValidationError> {
        let engine = Arc::new(Engine::new(Arc::clone(&spec), extensions)?);
        info!(
            api = name,
            spec = %spec.filepath().display(),
            version = %spec.version(),
            schemas = engine.schemas().len(),
            "API registered"
        );
        Ok(Self {
            name: name.to_string(),
            spec_route_name: spec_route_name.to_string(),
            request_validator: engine.request_validator(),
            response_validator: engine.response_validator(),
            spec,
        })
    }
}

/// Mounted documents in registration order.
#[derive(Debug, Clone, Default)]
pub struct ApiRegistry {
    entries: Vec<ApiEntry>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Each API name may be registered once.
    pub fn register(&mut self, entry: ApiEntry) -> Result<(), ConfigurationError> {
        if self.contains(&entry.name) {
            return Err(duplicate_api(&entry.name));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ApiEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// The entry governing routes without an explicit mapping: `primary`,
    /// or the only entry when there is exactly one.
    pub fn default_entry(&self) -> Option<&ApiEntry> {
        self.get(DEFAULT_API_NAME).or(match self.entries.as_slice() {
            [only] => Some(only),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn duplicate_api(name: &str) -> ConfigurationError {
    ConfigurationError::new(format!(
        "Spec for API '{name}' is already registered; each API name may be configured once"
    ))
}

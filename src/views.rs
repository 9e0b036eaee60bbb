//! Built-in views: the raw spec document, spec directories and the Swagger
//! UI explorer page.

use crate::framework::{Handler, HttpError, Request, Response};
use crate::static_files::{render_template, StaticFiles};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Explorer template shipped with the crate.
pub const DEFAULT_EXPLORER_TEMPLATE: &str = include_str!("../templates/swagger_ui.html");

/// Swagger UI release loaded by the default template.
pub const DEFAULT_UI_VERSION: &str = "5.12.0";

/// Match segment holding the file path below a spec directory route.
pub const SUBPATH: &str = "subpath";

/// Serve a single spec file verbatim.
pub fn spec_file_view(path: PathBuf) -> Handler {
    Arc::new(move |_request: &Request| {
        let bytes = std::fs::read(&path).map_err(|err| {
            error!(spec = %path.display(), error = %err, "Cannot read spec file");
            HttpError::not_found()
        })?;
        Ok(Response::new(200).with_body(StaticFiles::content_type(&path), bytes))
    })
}

/// Serve every file below a spec directory.
pub fn spec_directory_view(dir: PathBuf) -> Handler {
    let files = StaticFiles::new(dir);
    Arc::new(move |request: &Request| {
        let subpath = request.matchdict().get(SUBPATH).map(String::as_str).unwrap_or("");
        let (bytes, content_type) = files.load(subpath).map_err(|err| {
            debug!(subpath, error = %err, "Spec directory file not served");
            HttpError::not_found()
        })?;
        Ok(Response::new(200).with_body(content_type, bytes))
    })
}

/// Everything the explorer page is rendered from.
#[derive(Debug, Clone)]
pub struct ExplorerPage {
    pub template: String,
    /// Path of the spec document below the application URL.
    pub spec_path: String,
    pub ui_version: String,
    pub ui_config: Value,
    pub oauth_config: Option<Value>,
}

impl ExplorerPage {
    /// Render for a request; the spec URL is absolute.
    pub fn render(&self, request: &Request) -> Result<String, minijinja::Error> {
        let spec_url = format!(
            "{}{}",
            request.application_url.trim_end_matches('/'),
            self.spec_path
        );
        let ctx = json!({
            "spec_url": spec_url,
            "ui_version": self.ui_version,
            "ui_config": self.ui_config.to_string(),
            "oauth_config": self.oauth_config.as_ref().map(Value::to_string),
        });
        render_template(&self.template, &ctx)
    }
}

pub fn explorer_view(page: ExplorerPage) -> Handler {
    Arc::new(move |request: &Request| {
        let html = page.render(request).map_err(|err| {
            error!(error = %err, "Explorer template failed to render");
            HttpError::new(500, "explorer template failed to render")
        })?;
        Ok(Response::new(200).with_body("text/html; charset=UTF-8", html))
    })
}

//! File serving for spec directories and template rendering for the
//! explorer page.

use minijinja::Environment;
use serde_json::Value as JsonValue;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Serves files below a base directory. Paths escaping the base are
/// rejected.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => {
                    if s.to_str().is_some_and(|s| s.contains('\\')) {
                        return None;
                    }
                    pb.push(s)
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Content type by file extension.
    pub fn content_type(path: &Path) -> &'static str {
        match path.extension().and_then(|s| s.to_str()).unwrap_or("").to_lowercase().as_str() {
            "yaml" | "yml" => "text/yaml",
            "json" => "application/json",
            "html" => "text/html",
            "css" => "text/css",
            "js" => "application/javascript",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }

    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        let bytes = fs::read(&path)?;
        Ok((bytes, Self::content_type(&path)))
    }
}

/// Render a minijinja template source with a JSON context.
pub fn render_template(source: &str, ctx: &JsonValue) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("tpl", source)?;
    env.get_template("tpl")?.render(ctx)
}

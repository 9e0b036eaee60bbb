use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Nesting limit when inlining references to sibling files.
const MAX_EXTERNAL_REF_DEPTH: usize = 32;

/// Read a YAML or JSON document. The format follows the file extension.
pub fn read_document(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value: Value = if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON in {}", path.display()))?
    };
    Ok(value)
}

/// A root document with every reference to another file inlined.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub document: Value,
    /// The root file followed by every file pulled in by a reference.
    pub files: Vec<PathBuf>,
}

/// Load `root` and inline references to sibling files (`schemas.yaml#/Foo`).
///
/// Relative references are resolved against the `file://` URL of the file
/// that contains them. Local references inside a pulled-in fragment point
/// into that fragment's own file and are inlined too.
pub fn bundle_document(root: &Path) -> anyhow::Result<Bundle> {
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", root.display()))?;
    let base = Url::from_file_path(&root)
        .map_err(|_| anyhow!("cannot build a file URL for {}", root.display()))?;

    let mut document = read_document(&root)?;
    let mut loader = Loader::default();
    loader.files.push(root.clone());
    loader.cache.insert(root, document.clone());
    loader.inline_external_refs(&mut document, &base, 0)?;

    Ok(Bundle {
        document,
        files: loader.files,
    })
}

#[derive(Default)]
struct Loader {
    cache: HashMap<PathBuf, Value>,
    files: Vec<PathBuf>,
}

impl Loader {
    fn load(&mut self, path: &Path) -> anyhow::Result<&Value> {
        if !self.cache.contains_key(path) {
            debug!(file = %path.display(), "Loading referenced spec file");
            let doc = read_document(path)?;
            self.files.push(path.to_path_buf());
            self.cache.insert(path.to_path_buf(), doc);
        }
        self.cache
            .get(path)
            .ok_or_else(|| anyhow!("spec file cache miss for {}", path.display()))
    }

    fn inline_external_refs(
        &mut self,
        value: &mut Value,
        base: &Url,
        depth: usize,
    ) -> anyhow::Result<()> {
        if depth > MAX_EXTERNAL_REF_DEPTH {
            bail!("reference nesting deeper than {MAX_EXTERNAL_REF_DEPTH} near {base}");
        }
        match value {
            Value::Object(obj) => {
                let external = obj
                    .get("$ref")
                    .and_then(Value::as_str)
                    .filter(|r| !r.starts_with('#'))
                    .map(str::to_owned);
                if let Some(reference) = external {
                    let target = base
                        .join(&reference)
                        .with_context(|| format!("invalid reference {reference}"))?;
                    let mut file_url = target.clone();
                    file_url.set_fragment(None);
                    let path = file_url
                        .to_file_path()
                        .map_err(|_| anyhow!("reference {reference} is not a local file"))?;
                    let pointer = target.fragment().unwrap_or("").to_string();
                    let pointer = urlencoding::decode(&pointer)
                        .map(|p| p.into_owned())
                        .unwrap_or(pointer);

                    let doc = self.load(&path)?;
                    let mut fragment = if pointer.is_empty() {
                        doc.clone()
                    } else {
                        doc.pointer(&pointer).cloned().ok_or_else(|| {
                            anyhow!("reference {reference} does not resolve in {}", path.display())
                        })?
                    };
                    qualify_local_refs(&mut fragment, &file_url);
                    self.inline_external_refs(&mut fragment, &file_url, depth + 1)?;
                    *value = fragment;
                    return Ok(());
                }
                for v in obj.values_mut() {
                    self.inline_external_refs(v, base, depth)?;
                }
            }
            Value::Array(items) => {
                for v in items.iter_mut() {
                    self.inline_external_refs(v, base, depth)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Rewrite `#/...` references so they keep pointing into `file` once the
/// fragment is moved into another document.
fn qualify_local_refs(value: &mut Value, file: &Url) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(reference)) = obj.get_mut("$ref") {
                if reference.starts_with('#') {
                    *reference = format!("{file}{reference}");
                }
            }
            for v in obj.values_mut() {
                qualify_local_refs(v, file);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                qualify_local_refs(v, file);
            }
        }
        _ => {}
    }
}

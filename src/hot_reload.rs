//! # Hot Reload Module
//!
//! Watches the files of every mounted OpenAPI document while developing.
//! Edits are logged and handed to an optional callback; validators already
//! built keep serving until the process restarts, so the callback is the
//! place to trigger that restart.

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Called with the path of each modified spec file.
pub type ReloadCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Keeps the filesystem watcher alive. Dropping it stops watching.
pub struct SpecWatcher {
    _watcher: RecommendedWatcher,
    files: Vec<PathBuf>,
}

impl std::fmt::Debug for SpecWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecWatcher").field("files", &self.files).finish()
    }
}

impl SpecWatcher {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Watch `files` and report modifications.
pub fn watch_spec_files(
    files: Vec<PathBuf>,
    on_change: Option<ReloadCallback>,
) -> notify::Result<SpecWatcher> {
    let watched = files.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    for path in event.paths.iter().filter(|p| is_watched(&watched, p)) {
                        info!(spec = %path.display(), "Spec file changed; restart to apply");
                        if let Some(callback) = &on_change {
                            callback(path);
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "Spec watch error"),
        },
        Config::default(),
    )?;

    for file in &files {
        watcher.watch(file, RecursiveMode::NonRecursive)?;
    }
    info!(files = files.len(), "Watching spec files");
    Ok(SpecWatcher {
        _watcher: watcher,
        files,
    })
}

/// Event paths may be canonicalised by the platform backend.
fn is_watched(files: &[PathBuf], path: &Path) -> bool {
    let canonical = path.canonicalize().ok();
    files.iter().any(|f| {
        f == path || (canonical.is_some() && f.canonicalize().ok() == canonical)
    })
}

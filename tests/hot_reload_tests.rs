#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use brrtguard::hot_reload::watch_spec_files;
use brrtguard::{Configurator, Response, Settings, SpecOptions, ViewOptions};
use common::apps::HELLO_SPEC;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_watcher_reports_modified_spec() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("openapi.yaml");
    std::fs::write(&spec, HELLO_SPEC).unwrap();

    let (tx, rx) = mpsc::channel::<PathBuf>();
    let tx = std::sync::Mutex::new(tx);
    let watcher = watch_spec_files(
        vec![spec.clone()],
        Some(Arc::new(move |path: &std::path::Path| {
            let _ = tx.lock().unwrap().send(path.to_path_buf());
        })),
    )
    .unwrap();
    assert_eq!(watcher.files(), &[spec.clone()]);

    // Give the backend a moment to register the watch.
    std::thread::sleep(Duration::from_millis(100));
    std::fs::write(&spec, format!("{HELLO_SPEC}\n# edited\n")).unwrap();

    let changed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(
        changed.canonicalize().unwrap(),
        spec.canonicalize().unwrap()
    );
}

#[test]
fn test_missing_file_cannot_be_watched() {
    let result = watch_spec_files(vec![PathBuf::from("/nonexistent/openapi.yaml")], None);
    assert!(result.is_err());
}

#[test]
fn test_app_watches_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("openapi.yaml");
    std::fs::write(&spec, HELLO_SPEC).unwrap();

    for reload_spec in [false, true] {
        let settings = Settings {
            reload_spec,
            ..Settings::default()
        };
        let mut config = Configurator::with_settings(settings);
        config.register_spec(&spec, SpecOptions::default()).unwrap();
        config.add_route("hello", "/hello").unwrap();
        config.add_view("hello", ViewOptions::openapi(), |_| Ok(Response::new(200)));
        config.on_spec_reload(|_| {});
        let app = config.make_app().unwrap();
        assert_eq!(app.is_watching(), reload_spec);
    }
}

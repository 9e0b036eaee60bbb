#![allow(dead_code)]

pub mod temp_files {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    // Global counter and lock for thread-safe temporary file creation
    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);
    static TEMP_LOCK: Mutex<()> = Mutex::new(());

    /// Creates a temporary file with guaranteed unique name to prevent race conditions
    pub fn create_temp_spec(content: &str, ext: &str) -> PathBuf {
        let _lock = TEMP_LOCK.lock().unwrap();
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        let path = std::env::temp_dir().join(format!(
            "brrtguard_test_{}_{}_{}.{}",
            std::process::id(),
            counter,
            nanos,
            ext
        ));

        std::fs::write(&path, content).unwrap();
        path
    }

    /// Creates a temporary file with default yaml extension
    pub fn create_temp_yaml(content: &str) -> PathBuf {
        create_temp_spec(content, "yaml")
    }

    /// Creates a temporary file with json extension
    pub fn create_temp_json(content: &str) -> PathBuf {
        create_temp_spec(content, "json")
    }

    /// Cleanup temporary files (best effort)
    pub fn cleanup_temp_files(paths: &[PathBuf]) {
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    }
}

pub mod apps {
    use super::temp_files;
    use brrtguard::{App, Configurator, Settings, SpecOptions};
    use std::path::PathBuf;

    /// `GET /hello?name=...` with a minLength 3 name, documenting 200 and 400.
    pub const HELLO_SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: Hello API
  version: "1.0.0"
paths:
  /hello:
    get:
      operationId: hello
      parameters:
        - name: name
          in: query
          required: true
          schema:
            type: string
            minLength: 3
      responses:
        "200":
          description: Say hello
        "400":
          description: Bad Request
"#;

    /// A configurator with `spec` registered as the primary API.
    pub fn configurator(spec: &str, settings: Settings) -> (Configurator, PathBuf) {
        let path = temp_files::create_temp_yaml(spec);
        let mut config = Configurator::with_settings(settings);
        config.register_spec(&path, SpecOptions::default()).unwrap();
        (config, path)
    }

    pub fn build(config: Configurator, path: PathBuf) -> App {
        let app = config.make_app().unwrap();
        temp_files::cleanup_temp_files(&[path]);
        app
    }
}

pub mod logs {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    pub struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `f` with a thread-local subscriber and return what it logged.
    pub fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, buffer.contents())
    }
}

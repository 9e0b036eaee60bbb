//! # Configuration
//!
//! [`Configurator`] collects routes, views, specs and extension points, then
//! [`Configurator::make_app`] turns them into an [`App`]. Validators are
//! built in `make_app`, so formatters, deserializers and unmarshallers
//! registered at any point before it apply to every spec.
//!
//! ```rust,no_run
//! use brrtguard::{Configurator, Response, SpecOptions, ViewOptions};
//!
//! # fn main() -> Result<(), brrtguard::Error> {
//! let mut config = Configurator::new();
//! config.register_spec("openapi.yaml", SpecOptions::default())?;
//! config.add_route("hello", "/hello")?;
//! config.add_view("hello", ViewOptions::openapi(), |request| {
//!     let validated = request.openapi_validated().map_err(|_| brrtguard::HttpError::status(500))?;
//!     Ok(Response::json(200, &serde_json::json!({"hello": validated.parameters.query["name"]})))
//! });
//! let app = config.make_app()?;
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use crate::app::{App, AppState, ErrorView, RouteView};
use crate::errors::{ConfigurationError, Error};
use crate::extract::{ErrorRecord, ExtractErrorsFn};
use crate::framework::{
    AuthorizationPolicy, ExceptionView, Handler, HttpError, Request, Response, RootFactory,
    Route, Router, ViewError, ViewOptions,
};
use crate::hot_reload::{watch_spec_files, ReloadCallback};
use crate::interceptor::{openapi_view, plain_view};
use crate::registry::{duplicate_api, ApiEntry, ApiRegistry, DEFAULT_API_NAME};
use crate::responses_check::{check_required_responses, ResponsesConfig};
use crate::settings::Settings;
use crate::spec::Specification;
use crate::startup::check_endpoints;
use crate::validator::{Extensions, FormatValidator, OpenApiError};
use crate::views::{
    explorer_view, spec_directory_view, spec_file_view, ExplorerPage, DEFAULT_EXPLORER_TEMPLATE,
    DEFAULT_UI_VERSION, SUBPATH,
};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Path item extension naming the route for a declared path.
pub const ROUTE_NAME_EXT: &str = "x-brrtguard-route-name";

/// Path item extension naming the root factory for a declared path.
pub const ROOT_FACTORY_EXT: &str = "x-brrtguard-root-factory";

fn spec_route_name(api_name: &str) -> String {
    if api_name == DEFAULT_API_NAME {
        "brrtguard.spec".to_string()
    } else {
        format!("brrtguard.spec.{api_name}")
    }
}

/// Where and how a spec document is served.
#[derive(Debug, Clone)]
pub struct SpecOptions {
    /// URL path. Defaults to `/openapi.yaml` for files and `/spec/` for
    /// directories.
    pub route: Option<String>,
    /// Defaults to `brrtguard.spec`, suffixed with the API name for
    /// non-primary APIs.
    pub route_name: Option<String>,
    pub permission: Option<String>,
    pub api_name: String,
}

impl Default for SpecOptions {
    fn default() -> Self {
        Self {
            route: None,
            route_name: None,
            permission: None,
            api_name: DEFAULT_API_NAME.to_string(),
        }
    }
}

impl SpecOptions {
    pub fn route(mut self, route: &str) -> Self {
        self.route = Some(route.to_string());
        self
    }

    pub fn route_name(mut self, name: &str) -> Self {
        self.route_name = Some(name.to_string());
        self
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permission = Some(permission.to_string());
        self
    }

    pub fn api_name(mut self, name: &str) -> Self {
        self.api_name = name.to_string();
        self
    }

    fn resolved_route_name(&self) -> String {
        self.route_name
            .clone()
            .unwrap_or_else(|| spec_route_name(&self.api_name))
    }
}

/// Swagger UI page options.
#[derive(Debug, Clone)]
pub struct ExplorerOptions {
    pub route: String,
    /// Defaults to `brrtguard.explorer`, suffixed with the API name for
    /// non-primary APIs.
    pub route_name: Option<String>,
    /// minijinja template file; the built-in page when unset.
    pub template: Option<PathBuf>,
    pub ui_version: String,
    /// Merged into the `SwaggerUIBundle` options.
    pub ui_config: Value,
    /// Passed to `ui.initOAuth` when set.
    pub oauth_config: Option<Value>,
    pub permission: Option<String>,
    pub api_name: String,
}

impl Default for ExplorerOptions {
    fn default() -> Self {
        Self {
            route: "/docs/".to_string(),
            route_name: None,
            template: None,
            ui_version: DEFAULT_UI_VERSION.to_string(),
            ui_config: Value::Object(Default::default()),
            oauth_config: None,
            permission: None,
            api_name: DEFAULT_API_NAME.to_string(),
        }
    }
}

impl ExplorerOptions {
    pub fn route(mut self, route: &str) -> Self {
        self.route = route.to_string();
        self
    }

    pub fn route_name(mut self, name: &str) -> Self {
        self.route_name = Some(name.to_string());
        self
    }

    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(path.into());
        self
    }

    pub fn ui_version(mut self, version: &str) -> Self {
        self.ui_version = version.to_string();
        self
    }

    pub fn ui_config(mut self, config: Value) -> Self {
        self.ui_config = config;
        self
    }

    pub fn oauth_config(mut self, config: Value) -> Self {
        self.oauth_config = Some(config);
        self
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permission = Some(permission.to_string());
        self
    }

    pub fn api_name(mut self, name: &str) -> Self {
        self.api_name = name.to_string();
        self
    }
}

struct PendingView {
    route_name: String,
    options: ViewOptions,
    handler: Handler,
}

struct SpecRegistration {
    api_name: String,
    spec: Arc<Specification>,
    route_name: String,
    /// URL path of the root document.
    spec_path: String,
}

struct ExplorerRegistration {
    route_name: String,
    options: ExplorerOptions,
}

/// Application builder.
pub struct Configurator {
    settings: Settings,
    router: Router,
    views: Vec<PendingView>,
    specs: Vec<SpecRegistration>,
    explorers: Vec<ExplorerRegistration>,
    extensions: Extensions,
    root_factories: HashMap<String, RootFactory>,
    validation_error_view: Option<ExceptionView>,
    extract_errors: Option<Arc<ExtractErrorsFn>>,
    authorization_policy: Option<AuthorizationPolicy>,
    reload_callback: Option<ReloadCallback>,
}

impl Default for Configurator {
    fn default() -> Self {
        Self::with_settings(Settings::default())
    }
}

impl std::fmt::Debug for Configurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configurator")
            .field("settings", &self.settings)
            .field("routes", &self.router.len())
            .field("views", &self.views.len())
            .field("specs", &self.specs.iter().map(|s| &s.api_name).collect::<Vec<_>>())
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl Configurator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            router: Router::new(),
            views: Vec::new(),
            specs: Vec::new(),
            explorers: Vec::new(),
            extensions: Extensions::new(),
            root_factories: HashMap::new(),
            validation_error_view: None,
            extract_errors: None,
            authorization_policy: None,
            reload_callback: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    fn push_route(&mut self, route: Route) {
        debug!(route = %route.name, pattern = %route.pattern, "Route added");
        self.router.add(route);
    }

    fn new_route(
        name: &str,
        pattern: &str,
        method: Option<Method>,
    ) -> Result<Route, ConfigurationError> {
        Route::new(name, pattern, method).map_err(|err| {
            ConfigurationError::new(format!("Invalid pattern '{pattern}' for route '{name}': {err}"))
        })
    }

    /// Add a named route matching every method.
    pub fn add_route(&mut self, name: &str, pattern: &str) -> Result<(), ConfigurationError> {
        let route = Self::new_route(name, pattern, None)?;
        self.push_route(route);
        Ok(())
    }

    /// Add a named route matching only `method`.
    pub fn add_route_with_method(
        &mut self,
        name: &str,
        pattern: &str,
        method: Method,
    ) -> Result<(), ConfigurationError> {
        let route = Self::new_route(name, pattern, Some(method))?;
        self.push_route(route);
        Ok(())
    }

    /// Attach a handler to a route. The route must exist by `make_app`.
    pub fn add_view<F>(&mut self, route_name: &str, options: ViewOptions, handler: F)
    where
        F: Fn(&Request) -> Result<Response, HttpError> + Send + Sync + 'static,
    {
        self.views.push(PendingView {
            route_name: route_name.to_string(),
            options,
            handler: Arc::new(handler),
        });
    }

    fn check_new_api(&self, api_name: &str) -> Result<(), ConfigurationError> {
        if self.specs.iter().any(|s| s.api_name == api_name) {
            return Err(duplicate_api(api_name));
        }
        Ok(())
    }

    /// Load, check and serve a single-file spec.
    pub fn register_spec(
        &mut self,
        filepath: impl AsRef<Path>,
        options: SpecOptions,
    ) -> Result<(), Error> {
        let filepath = filepath.as_ref();
        self.check_new_api(&options.api_name)?;
        let spec = Specification::from_file(filepath)?;

        let route_name = options.resolved_route_name();
        let route = options.route.clone().unwrap_or_else(|| "/openapi.yaml".to_string());
        self.add_route(&route_name, &route)?;
        self.add_spec_view(&route_name, options.permission.clone(), spec_file_view(filepath.to_path_buf()));

        info!(api = %options.api_name, spec = %filepath.display(), route = %route, "Spec registered");
        self.specs.push(SpecRegistration {
            api_name: options.api_name,
            spec: Arc::new(spec),
            route_name,
            spec_path: route,
        });
        Ok(())
    }

    /// Load a spec that references sibling files and serve its whole
    /// directory under the route.
    pub fn register_spec_directory(
        &mut self,
        filepath: impl AsRef<Path>,
        options: SpecOptions,
    ) -> Result<(), Error> {
        let filepath = filepath.as_ref();
        let route = options.route.clone().unwrap_or_else(|| "/spec/".to_string());
        let lowered = route.to_ascii_lowercase();
        if [".yaml", ".yml", ".json"].iter().any(|ext| lowered.ends_with(ext)) {
            return Err(ConfigurationError::new(format!(
                "Having route be a filename is not allowed when using a spec directory: {route}"
            ))
            .into());
        }
        self.check_new_api(&options.api_name)?;
        let spec = Specification::from_directory(filepath)?;

        let file_name = filepath
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ConfigurationError::new(format!("Spec path {} has no file name", filepath.display()))
            })?;
        let dir = filepath
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let base = route.trim_end_matches('/');

        let route_name = options.resolved_route_name();
        self.add_route(&route_name, &format!("{base}/{{{SUBPATH}:.*}}"))?;
        self.add_spec_view(&route_name, options.permission.clone(), spec_directory_view(dir));

        info!(api = %options.api_name, spec = %filepath.display(), route = %route, "Spec directory registered");
        self.specs.push(SpecRegistration {
            api_name: options.api_name,
            spec: Arc::new(spec),
            route_name,
            spec_path: format!("{base}/{file_name}"),
        });
        Ok(())
    }

    fn add_spec_view(&mut self, route_name: &str, permission: Option<String>, handler: Handler) {
        self.views.push(PendingView {
            route_name: route_name.to_string(),
            options: ViewOptions {
                request_method: Some(Method::GET),
                permission,
                ..ViewOptions::default()
            },
            handler,
        });
    }

    /// Serve a Swagger UI page for a registered spec.
    pub fn add_explorer(&mut self, options: ExplorerOptions) -> Result<(), ConfigurationError> {
        let route_name = options.route_name.clone().unwrap_or_else(|| {
            if options.api_name == DEFAULT_API_NAME {
                "brrtguard.explorer".to_string()
            } else {
                format!("brrtguard.explorer.{}", options.api_name)
            }
        });
        self.add_route(&route_name, &options.route)?;
        self.explorers.push(ExplorerRegistration {
            route_name,
            options,
        });
        Ok(())
    }

    /// Register a validator for a custom string `format`.
    pub fn add_formatter<F: FormatValidator + 'static>(&mut self, name: &str, validator: F) {
        self.extensions.add_format(name, validator);
    }

    /// Register a body deserializer for a mimetype.
    pub fn add_deserializer<F>(&mut self, mimetype: &str, deserializer: F)
    where
        F: Fn(&[u8]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.extensions.add_deserializer(mimetype, deserializer);
    }

    /// Register an unmarshaller applied to validated values of a `format`.
    pub fn add_unmarshaller<F>(&mut self, format: &str, unmarshaller: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.extensions.add_unmarshaller(format, unmarshaller);
    }

    pub fn add_root_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Request) -> Value + Send + Sync + 'static,
    {
        self.root_factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Add a route for every path item carrying [`ROUTE_NAME_EXT`].
    ///
    /// Patterns are `route_prefix` followed by the declared path. A path
    /// item may name a root factory through [`ROOT_FACTORY_EXT`]; it must be
    /// added beforehand.
    pub fn register_routes(
        &mut self,
        api_name: &str,
        route_prefix: &str,
    ) -> Result<(), ConfigurationError> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.api_name == api_name)
            .map(|s| Arc::clone(&s.spec))
            .ok_or_else(|| {
                ConfigurationError::new(format!(
                    "No spec registered for API '{api_name}'; call register_spec first"
                ))
            })?;
        let Some(paths) = spec.document().get("paths").and_then(Value::as_object) else {
            return Ok(());
        };
        let prefix = route_prefix.trim_end_matches('/');
        let mut added = 0usize;
        for (path, item) in paths {
            let Some(name) = item.get(ROUTE_NAME_EXT).and_then(Value::as_str) else {
                continue;
            };
            let mut route = Self::new_route(name, &format!("{prefix}{path}"), None)?;
            if let Some(factory) = item.get(ROOT_FACTORY_EXT).and_then(Value::as_str) {
                if !self.root_factories.contains_key(factory) {
                    return Err(ConfigurationError::new(format!(
                        "Unknown root factory '{factory}' for route '{name}'"
                    )));
                }
                route.factory = Some(factory.to_string());
            }
            self.push_route(route);
            added += 1;
        }
        info!(api = api_name, routes = added, "Routes registered from spec");
        Ok(())
    }

    /// Replace the default JSON renderer for validation errors.
    pub fn set_validation_error_view<F>(&mut self, view: F)
    where
        F: Fn(&Request, &ViewError) -> Response + Send + Sync + 'static,
    {
        self.validation_error_view = Some(Arc::new(view));
    }

    /// Replace the error flattening used by the default renderer.
    pub fn set_extract_errors<F>(&mut self, extract: F)
    where
        F: Fn(&[OpenApiError]) -> Vec<ErrorRecord> + Send + Sync + 'static,
    {
        self.extract_errors = Some(Arc::new(extract));
    }

    pub fn set_authorization_policy<F>(&mut self, policy: F)
    where
        F: Fn(&Request, &str) -> bool + Send + Sync + 'static,
    {
        self.authorization_policy = Some(Arc::new(policy));
    }

    /// Called for each spec file edit when `reload_spec` is set.
    pub fn on_spec_reload<F>(&mut self, callback: F)
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.reload_callback = Some(Arc::new(callback));
    }

    /// Build validators, run the startup checks and derive the views.
    pub fn make_app(self) -> Result<App, Error> {
        let Configurator {
            settings,
            router,
            views,
            specs,
            explorers,
            extensions,
            root_factories,
            validation_error_view,
            extract_errors,
            authorization_policy,
            reload_callback,
        } = self;

        let responses_config = match &settings.responses_config {
            Some(path) => Some(
                ResponsesConfig::from_file(path)
                    .map_err(|err| ConfigurationError::new(format!("{err:#}")))?,
            ),
            None => {
                info!("Required responses check is not configured");
                None
            }
        };

        let mut registry = ApiRegistry::new();
        for reg in &specs {
            if let Some(config) = &responses_config {
                check_required_responses(&reg.spec, config)?;
            }
            registry.register(ApiEntry::new(
                &reg.api_name,
                Arc::clone(&reg.spec),
                &reg.route_name,
                extensions.clone(),
            )?)?;
        }

        let route_apis = check_endpoints(&registry, &router, settings.enable_endpoint_validation)?;

        let error_view = match validation_error_view {
            Some(view) => Some(ErrorView::Custom(view)),
            None if settings.add_exception_views => Some(ErrorView::Default),
            None => None,
        };
        let state = Arc::new(AppState {
            settings,
            registry,
            route_apis,
            error_view,
            extract_errors,
        });

        let mut route_views = Vec::with_capacity(views.len() + explorers.len());
        for pending in views {
            if router.get(&pending.route_name).is_none() {
                return Err(ConfigurationError::new(format!(
                    "View registered for unknown route '{}'",
                    pending.route_name
                ))
                .into());
            }
            let view = if pending.options.openapi {
                if state.registry.is_empty() {
                    return Err(ConfigurationError::new(format!(
                        "Route '{}' has an openapi view but no spec is registered",
                        pending.route_name
                    ))
                    .into());
                }
                if !state.route_apis.contains_key(&pending.route_name)
                    && state.registry.default_entry().is_none()
                {
                    return Err(ConfigurationError::new(format!(
                        "Route '{}' has an openapi view but no registered API covers it",
                        pending.route_name
                    ))
                    .into());
                }
                openapi_view(Arc::clone(&state), pending.handler, &pending.options)
            } else {
                plain_view(pending.handler)
            };
            route_views.push(RouteView {
                route_name: pending.route_name,
                request_method: pending.options.request_method,
                permission: pending.options.permission,
                view,
            });
        }

        for explorer in explorers {
            let options = explorer.options;
            let spec = specs
                .iter()
                .find(|s| s.api_name == options.api_name)
                .ok_or_else(|| {
                    ConfigurationError::new(format!(
                        "You need to call register_spec for API '{}' for the explorer to work",
                        options.api_name
                    ))
                })?;
            let template = match &options.template {
                Some(path) => std::fs::read_to_string(path).map_err(|err| {
                    ConfigurationError::new(format!(
                        "Cannot read explorer template {}: {err}",
                        path.display()
                    ))
                })?,
                None => DEFAULT_EXPLORER_TEMPLATE.to_string(),
            };
            route_views.push(RouteView {
                route_name: explorer.route_name,
                request_method: Some(Method::GET),
                permission: options.permission,
                view: plain_view(explorer_view(ExplorerPage {
                    template,
                    spec_path: spec.spec_path.clone(),
                    ui_version: options.ui_version,
                    ui_config: options.ui_config,
                    oauth_config: options.oauth_config,
                })),
            });
        }

        let watcher = if state.settings.reload_spec {
            let files: Vec<PathBuf> = specs
                .iter()
                .flat_map(|s| s.spec.files().iter().cloned())
                .collect();
            Some(watch_spec_files(files, reload_callback).map_err(|err| {
                ConfigurationError::new(format!("Cannot watch spec files: {err}"))
            })?)
        } else {
            None
        };

        info!(
            routes = router.len(),
            views = route_views.len(),
            apis = state.registry.len(),
            "Application created"
        );
        Ok(App {
            state,
            router,
            views: route_views,
            root_factories,
            authorization_policy,
            watcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_route_names() {
        assert_eq!(SpecOptions::default().resolved_route_name(), "brrtguard.spec");
        assert_eq!(
            SpecOptions::default().api_name("v2").resolved_route_name(),
            "brrtguard.spec.v2"
        );
        assert_eq!(
            SpecOptions::default().route_name("docs.spec").resolved_route_name(),
            "docs.spec"
        );
    }

    #[test]
    fn test_invalid_route_pattern() {
        let mut config = Configurator::new();
        let err = config.add_route("bad", "/foo/{id:(}").unwrap_err();
        assert!(err.message.contains("Invalid pattern"));
    }

    #[test]
    fn test_view_on_unknown_route() {
        let mut config = Configurator::new();
        config.add_view("missing", ViewOptions::default(), |_| Ok(Response::new(200)));
        assert!(matches!(config.make_app(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_openapi_view_requires_spec() {
        let mut config = Configurator::new();
        config.add_route("foo", "/foo").unwrap();
        config.add_view("foo", ViewOptions::openapi(), |_| Ok(Response::new(200)));
        let err = config.make_app().unwrap_err();
        assert!(err.to_string().contains("no spec is registered"));
    }

    #[test]
    fn test_register_routes_requires_spec() {
        let mut config = Configurator::new();
        let err = config.register_routes("primary", "").unwrap_err();
        assert!(err.message.contains("register_spec"));
    }
}

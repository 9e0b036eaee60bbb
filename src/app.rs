//! The built application: routing, view dispatch and exception rendering,
//! wrapped by the response validation tween.

use crate::extract::{collect_errors, ErrorRecord, ExtractErrorsFn};
use crate::framework::{
    AuthorizationPolicy, ExceptionView, HttpError, Request, Response, RootFactory, Router,
    ViewError, View,
};
use crate::hot_reload::SpecWatcher;
use crate::registry::{ApiEntry, ApiRegistry};
use crate::settings::Settings;
use crate::tween;
use crate::validator::OpenApiError;
use http::Method;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error};

/// How validation errors are turned into responses.
#[derive(Clone)]
pub(crate) enum ErrorView {
    /// JSON array of error records.
    Default,
    Custom(ExceptionView),
}

/// Read-only state shared by every request once the app is built.
pub struct AppState {
    pub settings: Settings,
    pub registry: ApiRegistry,
    /// Route name to the API governing it.
    pub route_apis: BTreeMap<String, String>,
    pub(crate) error_view: Option<ErrorView>,
    pub(crate) extract_errors: Option<Arc<ExtractErrorsFn>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("route_apis", &self.route_apis)
            .field("has_error_view", &self.error_view.is_some())
            .finish()
    }
}

impl AppState {
    /// Entry governing the route a request matched, falling back to the
    /// default entry.
    pub fn entry_for(&self, request: &Request) -> Option<&ApiEntry> {
        request
            .matched_route()
            .and_then(|route| self.route_apis.get(&route.name))
            .and_then(|api| self.registry.get(api))
            .or_else(|| self.registry.default_entry())
    }

    /// Flatten errors with the configured extraction function.
    pub fn extract(&self, errors: &[OpenApiError]) -> Vec<ErrorRecord> {
        match &self.extract_errors {
            Some(extract) => extract(errors),
            None => collect_errors(errors),
        }
    }

    /// Render a validation error through the registered error view.
    /// `None` when no view is registered.
    pub(crate) fn render_validation_error(
        &self,
        request: &Request,
        err: &ViewError,
    ) -> Option<Response> {
        match self.error_view.as_ref()? {
            ErrorView::Custom(view) => Some(view(request, err)),
            ErrorView::Default => Some(self.default_error_response(err)),
        }
    }

    fn default_error_response(&self, err: &ViewError) -> Response {
        let (status, errors) = match err {
            ViewError::Http(http) => return http.to_response(),
            ViewError::RequestValidation(e) => (e.status(), &e.errors),
            ViewError::ResponseValidation(e) => (e.status(), &e.errors),
        };
        let records = self.extract(errors);
        match serde_json::to_value(&records) {
            Ok(body) => Response::json(status, &body),
            Err(err) => {
                error!(error = %err, "Cannot serialize validation errors");
                HttpError::status(500).to_response()
            }
        }
    }
}

/// A view bound to a route.
#[derive(Clone)]
pub(crate) struct RouteView {
    pub route_name: String,
    pub request_method: Option<Method>,
    pub permission: Option<String>,
    pub view: View,
}

/// A configured application. Build one with
/// [`Configurator::make_app`](crate::Configurator::make_app).
pub struct App {
    pub(crate) state: Arc<AppState>,
    pub(crate) router: Router,
    pub(crate) views: Vec<RouteView>,
    pub(crate) root_factories: HashMap<String, RootFactory>,
    pub(crate) authorization_policy: Option<AuthorizationPolicy>,
    pub(crate) watcher: Option<SpecWatcher>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("state", &self.state)
            .field("routes", &self.router.len())
            .field("views", &self.views.len())
            .finish()
    }
}

impl App {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &ApiRegistry {
        &self.state.registry
    }

    pub fn route_apis(&self) -> &BTreeMap<String, String> {
        &self.state.route_apis
    }

    /// True when spec files are being watched.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Process a request. Validation errors without a registered error view
    /// come back as `Err`.
    pub fn handle(&self, request: &mut Request) -> Result<Response, ViewError> {
        let state = Arc::clone(&self.state);
        tween::validate_response(&state, request, |req| self.render(req))
    }

    /// Process a request, turning anything unrendered into a bare 500.
    pub fn call(&self, mut request: Request) -> Response {
        match self.handle(&mut request) {
            Ok(response) => response,
            Err(err) => {
                error!(path = %request.path, error = %err, "Unhandled error while processing request");
                Response::text(500, "Internal Server Error")
            }
        }
    }

    /// Dispatch and render exceptions into responses where a view exists.
    fn render(&self, request: &mut Request) -> Result<Response, ViewError> {
        match self.dispatch(request) {
            Ok(response) => Ok(response),
            Err(ViewError::Http(err)) => Ok(err.to_response()),
            Err(err) => match self.state.render_validation_error(request, &err) {
                Some(response) => Ok(response),
                None => Err(err),
            },
        }
    }

    fn dispatch(&self, request: &mut Request) -> Result<Response, ViewError> {
        let (route, matchdict) = self
            .router
            .route(&request.method, &request.path)
            .ok_or_else(HttpError::not_found)?;
        request.matched_route = Some(crate::framework::MatchedRoute {
            name: route.name.clone(),
            pattern: route.pattern.clone(),
        });
        request.matchdict = matchdict;
        if let Some(factory) = route.factory.as_ref().and_then(|f| self.root_factories.get(f)) {
            request.context = Some(factory(request));
        }

        let view = self
            .views
            .iter()
            .filter(|v| v.route_name == route.name)
            .find(|v| v.request_method.as_ref().map_or(true, |m| *m == request.method))
            .ok_or_else(|| {
                debug!(route = %route.name, method = %request.method, "No view matches request method");
                HttpError::not_found()
            })?;

        if let (Some(permission), Some(policy)) = (&view.permission, &self.authorization_policy) {
            if !policy(request, permission) {
                debug!(route = %route.name, permission = %permission, "Permission denied");
                return Err(HttpError::forbidden().into());
            }
        }
        (view.view)(request)
    }
}

//! # brrtguard
//!
//! **brrtguard** validates HTTP requests and responses against
//! [OpenAPI 3.0/3.1](https://spec.openapis.org/oas/v3.1.0) documents.
//!
//! ## Overview
//!
//! Handlers registered with the `openapi` marker only run on requests that
//! match the document: parameters are cast and checked, bodies are decoded
//! and schema-validated, security requirements are checked for presence.
//! Whatever the handler returns, including raised HTTP errors, is validated
//! against the declared responses before it leaves the application.
//!
//! ## Architecture
//!
//! - **[`config`]** - [`Configurator`]: routes, views, specs, extension points
//! - **[`app`]** - [`App`]: dispatch, exception rendering, shared [`AppState`]
//! - **[`interceptor`]** - request validation wrapped around marked views
//! - **[`tween`]** - response validation around the whole pipeline
//! - **[`validator`]** - the validation engine built on `jsonschema`
//! - **[`spec`]** - document loading, structural checks, operation lookup
//! - **[`registry`]** - mounted documents keyed by API name
//! - **[`startup`]** - declared paths versus registered routes
//! - **[`extract`]** - flattening nested errors into records
//! - **[`framework`]** - the minimal host: requests, responses, routing
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Tween as tween
//!     participant App as App::dispatch
//!     participant View as interceptor
//!     participant Engine as validator
//!     participant Handler
//!
//!     Client->>Tween: Request
//!     Tween->>App: downstream
//!     App->>App: match route, root factory, permission
//!     App->>View: view(request)
//!     View->>Engine: validate request
//!     alt Invalid
//!         Engine-->>View: errors
//!         View-->>App: RequestValidationError
//!         App->>App: render 400 / 401
//!     else Valid
//!         View->>Handler: handler(request)
//!         Handler-->>App: Response or HttpError
//!     end
//!     App-->>Tween: rendered response
//!     Tween->>Engine: validate response
//!     alt Undocumented response
//!         Tween-->>Client: 500 ResponseValidationError
//!     else Documented
//!         Tween-->>Client: Response
//!     end
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use brrtguard::{Configurator, HttpError, Request, Response, SpecOptions, ViewOptions};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), brrtguard::Error> {
//! let mut config = Configurator::new();
//! config.register_spec("openapi.yaml", SpecOptions::default())?;
//! config.add_route("hello", "/hello")?;
//! config.add_view("hello", ViewOptions::openapi(), |request: &Request| {
//!     let validated = request
//!         .openapi_validated()
//!         .map_err(|err| HttpError::new(500, err.to_string()))?;
//!     let name = validated.parameters.query.get("name").cloned().unwrap_or_default();
//!     Ok(Response::json(200, &json!({ "hello": name })))
//! });
//! let app = config.make_app()?;
//!
//! let response = app.call(Request::get("/hello?name=yo"));
//! assert_eq!(response.status, 400);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Bodies
//!
//! The default renderer answers validation failures with a JSON array of
//! [`ErrorRecord`]s:
//!
//! ```json
//! [{"exception": "ValidationError", "message": "'yo' is too short", "field": "name"}]
//! ```
//!
//! Request errors are 400, or 401 when a security requirement failed.
//! Response errors are always 500.
//!
//! ## Settings
//!
//! [`Settings`] switches request, response and endpoint validation on or
//! off, either from `BRRTGUARD_*` environment variables or a YAML file.
//! Per-view overrides live in [`ViewOptions`].

pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod extract;
pub mod framework;
pub mod hot_reload;
pub mod interceptor;
pub mod logging;
pub mod registry;
pub mod responses_check;
pub mod settings;
pub mod spec;
pub mod startup;
pub mod static_files;
pub mod tween;
pub mod validator;
pub mod views;
pub mod wrappers;

pub use app::{App, AppState};
pub use config::{Configurator, ExplorerOptions, SpecOptions};
pub use errors::{
    ConfigurationError, Error, MissingEndpointsError, MissingResponsesError, NotValidatedError,
    RequestValidationError, ResponseValidationError, SpecIssue, SpecValidationError,
};
pub use extract::{collect_errors, extract_errors, ErrorRecord};
pub use framework::{HttpError, Request, Response, ViewError, ViewOptions};
pub use registry::{ApiEntry, ApiRegistry, DEFAULT_API_NAME};
pub use settings::Settings;
pub use spec::{OpenApiVersion, ParameterLocation, Specification};
pub use validator::{OpenApiError, ValidatedData, ValidatedParameters};

//! # CLI Module
//!
//! Command-line checks for OpenAPI documents, run before wiring a spec into
//! an application.
//!
//! ## Commands
//!
//! ### `check`
//!
//! Load the document, run the structural checks, precompile every schema
//! and optionally the required responses check:
//!
//! ```bash
//! brrtguard check --spec openapi.yaml --responses-config responses.yaml
//! ```
//!
//! Options:
//! - `--spec <FILE>` - Path to OpenAPI specification (required)
//! - `--responses-config <FILE>` - Required responses config
//! - `--directory` - Resolve references to sibling files
//!
//! ### `routes`
//!
//! List declared operations as `METHOD path operationId`:
//!
//! ```bash
//! brrtguard routes --spec openapi.yaml
//! ```
//!
//! Logging is configured from the `BRRTGUARD_LOG_*` environment variables.

mod commands;


pub use commands::{format_routes, run, run_cli, Cli, Commands};

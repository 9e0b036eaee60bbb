use crate::responses_check::{check_required_responses, ResponsesConfig};
use crate::spec::Specification;
use crate::validator::{Engine, Extensions};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Command-line interface for brrtguard
#[derive(Parser, Debug)]
#[command(name = "brrtguard")]
#[command(about = "OpenAPI spec checks for brrtguard", long_about = None, version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a spec and precompile its schemas
    Check {
        /// Path to the OpenAPI specification file (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// YAML file listing the responses every operation must declare
        #[arg(long, env = "BRRTGUARD_RESPONSES_CONFIG")]
        responses_config: Option<PathBuf>,

        /// Resolve references to sibling files in the spec's directory
        #[arg(long, default_value_t = false)]
        directory: bool,
    },
    /// List the operations declared in a spec
    Routes {
        /// Path to the OpenAPI specification file (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        #[arg(long, default_value_t = false)]
        directory: bool,
    },
}

fn load(spec: &Path, directory: bool) -> anyhow::Result<Specification> {
    let loaded = if directory {
        Specification::from_directory(spec)
    } else {
        Specification::from_file(spec)
    };
    Ok(loaded?)
}

/// `METHOD path operationId` per declared operation.
pub fn format_routes(spec: &Specification) -> Vec<String> {
    spec.operations()
        .into_iter()
        .map(|op| {
            format!(
                "{} {} {}",
                op.method.to_ascii_uppercase(),
                op.path,
                op.operation_id.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

/// Execute a parsed command.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Check {
            spec,
            responses_config,
            directory,
        } => {
            let loaded = Arc::new(load(spec, *directory)?);
            let engine = Engine::new(Arc::clone(&loaded), Extensions::new())?;
            if let Some(path) = responses_config {
                let config = ResponsesConfig::from_file(path)?;
                check_required_responses(&loaded, &config)?;
            }
            info!(spec = %spec.display(), "Spec check passed");
            println!(
                "OK: {} ({}), {} operations, {} schemas",
                loaded.title(),
                loaded.version(),
                loaded.operations().len(),
                engine.schemas().len()
            );
            Ok(())
        }
        Commands::Routes { spec, directory } => {
            let loaded = load(spec, *directory)
                .with_context(|| format!("loading {}", spec.display()))?;
            for line in format_routes(&loaded) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Parse the process arguments and execute.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(&cli)
}

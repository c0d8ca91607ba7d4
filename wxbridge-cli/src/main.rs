//! wxbridge CLI - load Mini Program WASM modules outside the Mini Program.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wxbridge_runtime::observability::{TracingConfig, TracingGuard, init_tracing};

/// wxbridge - WASM host adapter for Mini Program modules.
#[derive(Parser)]
#[command(name = "wxbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Session configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve module paths against this package root instead of the filesystem
    #[arg(long, global = true)]
    asset_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a module and list its exports and supported operations
    Exports {
        /// Path to the WASM module
        module: String,
    },

    /// Call one page handler
    Call {
        /// Path to the WASM module
        module: String,

        /// Operation (add, multiply, factorial, is_prime, fibonacci,
        /// greet, greet_age, reverse_string)
        operation: String,

        /// Operation arguments
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the load, add and greet smoke test
    Demo {
        /// Path to the WASM module
        module: String,
    },

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8) -> Result<TracingGuard> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Command output goes to stdout, logs to stderr.
    let config = TracingConfig::default()
        .with_filter(filter)
        .with_env(|key| std::env::var(key).ok())
        .log_to_stderr();

    init_tracing(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = setup_logging(cli.verbose)?;

    let options = commands::SessionOptions {
        config: cli.config,
        asset_root: cli.asset_root,
    };

    match cli.command {
        Commands::Exports { module } => commands::exports::run(&options, &module).await,
        Commands::Call {
            module,
            operation,
            args,
        } => commands::call::run(&options, &module, &operation, &args).await,
        Commands::Demo { module } => commands::demo::run(&options, &module).await,
        Commands::Version => commands::version::run(),
    }
}

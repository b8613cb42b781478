mod config;
mod dispatch;
mod operations;
mod sandbox;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dispatch::TaskDispatcher;
use crate::sandbox::Sandbox;

const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

fn print_help() {
    println!(
        "\
dataworks-agent v{}

A task-execution agent: maps task descriptions to file and data operations
and runs them inside a filesystem sandbox.

USAGE:
    dataworks-agent [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {DEFAULT_CONFIG_PATH}]
                   (defaults are used when the default file does not exist)

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENDPOINTS:
    POST /run?task=<description>   Run a task
    GET  /read?path=<path>         Read a file from the sandbox
    POST /filter_csv               Filter CSV rows (JSON body)
    GET  /operations               List registered operations

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG    Log level filter for tracing
                (e.g. debug, dataworks_agent=debug,warn)

EXAMPLES:
    dataworks-agent                            # uses {DEFAULT_CONFIG_PATH}
    dataworks-agent /etc/dataworks/agent.toml  # custom config path
    RUST_LOG=debug dataworks-agent             # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received, exiting");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("dataworks-agent v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dataworks_agent=info")),
        )
        .init();

    let explicit_path = std::env::args().nth(1);
    let config_path = explicit_path
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load_or_default(&config_path, explicit_path.is_some())
        .with_context(|| format!("loading {config_path}"))?;

    let sandbox = Arc::new(Sandbox::from_config(&config.sandbox).with_context(|| {
        format!("preparing sandbox root {}", config.sandbox.root.display())
    })?);
    info!("Sandbox root: {}", sandbox.root().display());
    if !config.sandbox.mount.is_empty() {
        info!("Sandbox mount prefix: {}", config.sandbox.mount);
    }

    let registry = Arc::new(operations::builtin::registry(&config)?);
    info!(
        "Operations: {}",
        registry
            .iter()
            .map(|spec| spec.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let dispatcher = TaskDispatcher::new(registry, sandbox);

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;

    server::serve(listener, dispatcher, shutdown_signal()).await
}

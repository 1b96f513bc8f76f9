//! pipegridd: the pipegrid daemon.
//!
//! Single binary that assembles every pipegrid subsystem:
//! - Pipeline store (redb)
//! - Node and data inventory
//! - Placement and reconciliation loops
//! - REST API
//!
//! # Usage
//!
//! ```text
//! pipegridd serve --config /etc/pipegrid/pipegrid.toml --port 8470
//! pipegridd config --config /etc/pipegrid/pipegrid.toml
//! ```

mod serve;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use pipegrid_core::PipegridConfig;

#[derive(Parser)]
#[command(name = "pipegridd", about = "ML pipeline placement daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the API server.
    Serve {
        /// Path to pipegrid.toml. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// API port (overrides `[api] port`).
        #[arg(long)]
        port: Option<u16>,

        /// Directory for pipelines.redb (overrides `[storage] data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration and exit.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            config.validate()?;
            serve::run(config).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,pipegridd=debug,pipegrid=debug"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipegridConfig> {
    match path {
        Some(path) => PipegridConfig::from_file(path),
        None => Ok(PipegridConfig::default()),
    }
}

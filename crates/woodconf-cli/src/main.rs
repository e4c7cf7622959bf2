//! woodconf CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use woodconf_config::ProviderKind;

mod commands;

#[derive(Parser)]
#[command(name = "woodconf")]
#[command(about = "Resolve Woodpecker pipeline configurations locally", long_about = None)]
struct Cli {
    /// Path to the KDL service configuration file
    #[arg(long, global = true, env = "WOODCONF_CONFIG")]
    config: Option<PathBuf>,

    /// Enabled providers in order (forge, fs), comma separated
    #[arg(long, global = true, env = "WOODCONF_PROVIDERS", value_delimiter = ',')]
    providers: Option<Vec<ProviderKind>>,

    /// Source of the filesystem provider, e.g. ./pipelines/**/*.yaml
    #[arg(long, global = true, env = "WOODCONF_FS_SOURCE")]
    fs_source: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run providers and converters for an environment file
    Convert {
        /// JSON file describing the build; $VAR references are expanded
        env: PathBuf,
        /// Write documents into this directory instead of printing them
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Execute a Starlark file and list the documents it produces
    Validate {
        /// Path to the script
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        config,
        providers,
        fs_source,
        command,
    } = Cli::parse();

    match command {
        Commands::Convert { env, out } => {
            let config = commands::load_config(config.as_deref(), providers, fs_source)?;
            commands::convert::run(&config, &env, out.as_deref()).await?;
        }
        Commands::Validate { path } => {
            let config = commands::load_config(config.as_deref(), None, None)?;
            commands::validate::run(&config, &path).await?;
        }
    }

    Ok(())
}

//! woodconf configuration server

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use woodconf_api::signature::SignatureVerifier;
use woodconf_api::{AppState, routes, telemetry};
use woodconf_config::{ConfigOverrides, LogFormat, ProviderKind, ServiceConfig};

#[derive(Parser)]
#[command(name = "woodconf-server")]
#[command(about = "Pipeline configuration service for Woodpecker CI", long_about = None)]
struct Cli {
    /// Path to the KDL configuration file
    #[arg(long, env = "WOODCONF_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "WOODCONF_ADDRESS")]
    address: Option<String>,

    /// Path of the configuration endpoint
    #[arg(long, env = "WOODCONF_ENDPOINT")]
    endpoint: Option<String>,

    /// Accepted HTTP methods, comma separated
    #[arg(long, env = "WOODCONF_METHODS", value_delimiter = ',')]
    methods: Option<Vec<String>>,

    /// PEM file with the CI server's Ed25519 public key
    #[arg(long, env = "WOODCONF_PUBLIC_KEY")]
    public_key: Option<PathBuf>,

    /// Enabled providers in order (forge, fs), comma separated
    #[arg(long, env = "WOODCONF_PROVIDERS", value_delimiter = ',')]
    providers: Option<Vec<ProviderKind>>,

    /// Source of the filesystem provider, e.g. /srv/pipelines/**/*.yaml
    #[arg(long, env = "WOODCONF_FS_SOURCE")]
    fs_source: Option<String>,

    /// Log filter directive
    #[arg(long, env = "WOODCONF_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, env = "WOODCONF_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            address: self.address.clone(),
            endpoint: self.endpoint.clone(),
            methods: self.methods.clone(),
            public_key: self.public_key.clone(),
            providers: self.providers.clone(),
            fs_source: self.fs_source.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::load(cli.config.as_deref())
        .with_context(|| format!("failed to load configuration from {:?}", cli.config))?
        .with_overrides(cli.overrides())
        .context("invalid configuration")?;

    telemetry::init(&config.log_level, config.log_format);

    let verifier = match &config.server.public_key {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read public key {}", path.display()))?;
            let verifier = SignatureVerifier::from_pem(&pem)
                .with_context(|| format!("failed to parse public key {}", path.display()))?;
            Some(Arc::new(verifier))
        }
        None => {
            warn!("No public key configured, request signatures are not verified");
            None
        }
    };

    let state = AppState::from_config(&config).context("failed to set up providers")?;
    let app = routes::router(state, &config.server, verifier)?;

    let listener = TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.address))?;
    info!(
        address = %config.server.address,
        endpoint = %config.server.endpoint,
        providers = ?config.providers,
        "Starting server"
    );

    axum::serve(listener, app).await?;

    Ok(())
}

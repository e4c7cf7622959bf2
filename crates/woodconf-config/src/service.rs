//! Service configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_ENDPOINT: &str = "/ciconfig";
pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
pub const DEFAULT_STARLARK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STARLARK_MAX_CONCURRENT: usize = 4;

/// Configuration source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Forge,
    Fs,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Forge => write!(f, "forge"),
            ProviderKind::Fs => write!(f, "fs"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forge" => Ok(ProviderKind::Forge),
            "fs" => Ok(ProviderKind::Fs),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Service-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Tracing filter directive, e.g. `info` or `woodconf_api=debug`.
    pub log_level: String,
    pub log_format: LogFormat,
    pub server: ServerConfig,
    /// Enabled providers, in invocation order.
    pub providers: Vec<ProviderKind>,
    pub fs: FsConfig,
    pub forge: ForgeConfig,
    pub starlark: StarlarkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub endpoint: String,
    /// HTTP methods accepted on the endpoint.
    pub methods: Vec<String>,
    /// PEM encoded Ed25519 public key used to verify request signatures.
    pub public_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Base directory with a glob suffix, e.g. `/etc/pipelines/**/*.yaml`.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    pub github_url: Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarlarkConfig {
    /// Per-file execution timeout; `None` disables it.
    pub timeout: Option<Duration>,
    /// Scripts allowed to run at once, including ones past their timeout.
    pub max_concurrent: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            server: ServerConfig::default(),
            providers: vec![ProviderKind::Forge],
            fs: FsConfig::default(),
            forge: ForgeConfig::default(),
            starlark: StarlarkConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            methods: vec!["POST".to_string()],
            public_key: None,
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            github_url: Url::parse(DEFAULT_GITHUB_URL).expect("default GitHub URL is valid"),
        }
    }
}

impl Default for StarlarkConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_STARLARK_TIMEOUT),
            max_concurrent: DEFAULT_STARLARK_MAX_CONCURRENT,
        }
    }
}

/// Values set on the command line or through the environment.
///
/// Every `Some` replaces the corresponding value of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub address: Option<String>,
    pub endpoint: Option<String>,
    pub methods: Option<Vec<String>>,
    pub public_key: Option<PathBuf>,
    pub providers: Option<Vec<ProviderKind>>,
    pub fs_source: Option<String>,
}

impl ServiceConfig {
    /// Load the configuration file at `path`, or the defaults if `path` is `None`.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                parse_service_config(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply overrides and validate the result.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> ConfigResult<Self> {
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        if let Some(address) = overrides.address {
            self.server.address = address;
        }
        if let Some(endpoint) = overrides.endpoint {
            self.server.endpoint = endpoint;
        }
        if let Some(methods) = overrides.methods {
            self.server.methods = normalize_methods(methods);
        }
        if let Some(public_key) = overrides.public_key {
            self.server.public_key = Some(public_key);
        }
        if let Some(providers) = overrides.providers {
            self.providers = providers;
        }
        if let Some(source) = overrides.fs_source {
            self.fs.source = Some(source);
        }

        self.validate()?;
        Ok(self)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.server.endpoint.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.endpoint".to_string(),
                message: format!("must start with '/': {}", self.server.endpoint),
            });
        }

        if self.server.methods.is_empty() {
            return Err(ConfigError::MissingField("server.methods".to_string()));
        }

        if self.providers.contains(&ProviderKind::Fs)
            && self.fs.source.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingField("fs.source".to_string()));
        }

        Ok(())
    }
}

/// Parse service configuration from KDL text.
pub fn parse_service_config(kdl: &str) -> ConfigResult<ServiceConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ServiceConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "log-level" => {
                config.log_level = required_string_arg(node, "log-level")?;
            }
            "log-format" => {
                let format = required_string_arg(node, "log-format")?;
                config.log_format = format.parse().map_err(|message| ConfigError::InvalidValue {
                    field: "log-format".to_string(),
                    message,
                })?;
            }
            "server" => parse_server(node, &mut config.server)?,
            "providers" => {
                config.providers = get_all_string_args(node)
                    .iter()
                    .map(|kind| {
                        kind.parse().map_err(|message| ConfigError::InvalidValue {
                            field: "providers".to_string(),
                            message,
                        })
                    })
                    .collect::<ConfigResult<Vec<ProviderKind>>>()?;
            }
            "fs" => {
                for child in children(node) {
                    if child.name().value() == "source" {
                        config.fs.source = Some(required_string_arg(child, "fs.source")?);
                    }
                }
            }
            "forge" => {
                for child in children(node) {
                    if child.name().value() == "github-url" {
                        let raw = required_string_arg(child, "forge.github-url")?;
                        config.forge.github_url =
                            Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
                                field: "forge.github-url".to_string(),
                                message: e.to_string(),
                            })?;
                    }
                }
            }
            "starlark" => {
                for child in children(node) {
                    match child.name().value() {
                        "timeout-ms" => {
                            config.starlark.timeout = match get_first_integer_arg(child) {
                                Some(0) => None,
                                Some(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
                                _ => {
                                    return Err(ConfigError::InvalidValue {
                                        field: "starlark.timeout-ms".to_string(),
                                        message: "expected a non-negative integer".to_string(),
                                    });
                                }
                            };
                        }
                        "max-concurrent" => {
                            config.starlark.max_concurrent = match get_first_integer_arg(child) {
                                Some(n) if n > 0 => n as usize,
                                _ => {
                                    return Err(ConfigError::InvalidValue {
                                        field: "starlark.max-concurrent".to_string(),
                                        message: "expected a positive integer".to_string(),
                                    });
                                }
                            };
                        }
                        _ => {}
                    }
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_server(node: &KdlNode, server: &mut ServerConfig) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "address" => server.address = required_string_arg(child, "server.address")?,
            "endpoint" => server.endpoint = required_string_arg(child, "server.endpoint")?,
            "methods" => server.methods = normalize_methods(get_all_string_args(child)),
            "public-key" => {
                server.public_key = Some(PathBuf::from(required_string_arg(
                    child,
                    "server.public-key",
                )?));
            }
            _ => {}
        }
    }
    Ok(())
}

fn normalize_methods(methods: Vec<String>) -> Vec<String> {
    methods
        .into_iter()
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .collect()
}

// Helper functions for extracting values from KDL nodes

fn children(node: &KdlNode) -> &[KdlNode] {
    node.children().map(|doc| doc.nodes()).unwrap_or_default()
}

fn required_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

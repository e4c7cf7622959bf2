//! KDL configuration parsing for woodconf.
//!
//! This crate handles parsing of the service configuration: listen address,
//! endpoint, enabled providers and their settings.

pub mod error;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use service::{
    ConfigOverrides, ForgeConfig, FsConfig, LogFormat, ProviderKind, ServerConfig, ServiceConfig,
    StarlarkConfig, parse_service_config,
};

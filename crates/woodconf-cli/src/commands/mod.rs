//! CLI command implementations.

pub mod convert;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;
use woodconf_config::{ConfigOverrides, ProviderKind, ServiceConfig};

pub fn load_config(
    path: Option<&Path>,
    providers: Option<Vec<ProviderKind>>,
    fs_source: Option<String>,
) -> Result<ServiceConfig> {
    let config = ServiceConfig::load(path)
        .with_context(|| format!("failed to load configuration from {:?}", path))?;

    config
        .with_overrides(ConfigOverrides {
            providers,
            fs_source,
            ..Default::default()
        })
        .context("invalid configuration")
}

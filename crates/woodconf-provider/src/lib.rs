//! Configuration providers for woodconf.
//!
//! Provides the sources configuration files are read from:
//! - A local directory matched with glob patterns
//! - The forge hosting the repository (GitHub)

pub mod forge;
pub mod fs;
pub mod github;

pub use forge::{ForgeClient, ForgeError, ForgeProvider};
pub use fs::FsProvider;
pub use github::GitHubForge;

use std::sync::Arc;
use woodconf_config::{ProviderKind, ServiceConfig};
use woodconf_core::{Error, Providers, Result};

/// Build the providers enabled in the service configuration, in order.
pub fn providers_from_config(config: &ServiceConfig) -> Result<Providers> {
    let mut providers = Providers::default();
    for kind in &config.providers {
        match kind {
            ProviderKind::Forge => {
                providers.push(Arc::new(ForgeProvider::from_config(&config.forge)));
            }
            ProviderKind::Fs => {
                let source = config
                    .fs
                    .source
                    .as_deref()
                    .ok_or(Error::NoConfigConfigured)?;
                providers.push(Arc::new(FsProvider::new(source)?));
            }
        }
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_providers_follow_configured_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.providers = vec![ProviderKind::Fs, ProviderKind::Forge];
        config.fs.source = Some(format!("{}/*.yaml", dir.path().display()));

        let providers = providers_from_config(&config).unwrap();
        assert_eq!(providers.len(), 2);
    }

    #[test]
    fn test_missing_fs_directory_fails() {
        let mut config = ServiceConfig::default();
        config.providers = vec![ProviderKind::Fs];
        config.fs.source = Some("/nonexistent/woodconf/*.yaml".to_string());

        assert!(matches!(providers_from_config(&config), Err(Error::Io(_))));
    }
}

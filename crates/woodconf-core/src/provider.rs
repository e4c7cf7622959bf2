//! Provider trait and the provider aggregator.
//!
//! Providers are sources of raw configuration files (a directory, a forge).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::{Environment, File, Result};

/// Trait for configuration sources.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of this provider.
    fn name(&self) -> &'static str;

    /// Fetch the configuration files for the given environment.
    async fn get(&self, env: &Environment) -> Result<Vec<File>>;
}

/// Ordered set of providers.
#[derive(Clone, Default)]
pub struct Providers {
    providers: Vec<Arc<dyn Provider>>,
}

impl Providers {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Query every provider in order and concatenate their files.
    ///
    /// Soft failures skip the provider; any other failure aborts the whole
    /// call without partial results.
    pub async fn get(&self, env: &Environment) -> Result<Vec<File>> {
        let mut files = Vec::new();
        for provider in &self.providers {
            match provider.get(env).await {
                Ok(found) => {
                    debug!(
                        provider = provider.name(),
                        count = found.len(),
                        "Provider returned files"
                    );
                    files.extend(found);
                }
                Err(e) if e.is_soft() => {
                    debug!(provider = provider.name(), reason = %e, "Provider skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(files)
    }
}

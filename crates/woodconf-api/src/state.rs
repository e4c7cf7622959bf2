//! Application state.

use std::sync::Arc;
use woodconf_config::ServiceConfig;
use woodconf_converter::converters_from_config;
use woodconf_core::Resolver;
use woodconf_provider::providers_from_config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
}

impl AppState {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    /// Build providers and converters from the service configuration.
    pub fn from_config(config: &ServiceConfig) -> woodconf_core::Result<Self> {
        let providers = providers_from_config(config)?;
        let converters = converters_from_config(config);
        Ok(Self::new(Resolver::new(providers, converters)))
    }
}

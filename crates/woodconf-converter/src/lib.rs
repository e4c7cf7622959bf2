//! Configuration converters for woodconf.
//!
//! Converters turn scripted configuration into plain pipeline documents.
//! Only Starlark is supported.

pub mod starlark;

pub use self::starlark::{StarlarkConverter, StarlarkOptions};

use std::sync::Arc;
use woodconf_config::ServiceConfig;
use woodconf_core::Converters;

/// Build the converters the service runs, in priority order.
pub fn converters_from_config(config: &ServiceConfig) -> Converters {
    let mut converters = Converters::default();
    converters.push(Arc::new(StarlarkConverter::from_config(&config.starlark)));
    converters
}

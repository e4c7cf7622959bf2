//! Core document model and traits for woodconf.
//!
//! This crate contains:
//! - The build environment and named configuration files
//! - The closed error taxonomy used for control flow
//! - Provider and converter traits with their ordered aggregators
//! - The resolver tying providers, converters and name sanitization together

pub mod converter;
pub mod environment;
pub mod error;
pub mod file;
pub mod provider;
pub mod resolver;

pub use converter::{Converter, Converters};
pub use environment::{Credential, Environment, ForgeKind, Pipeline, Repository};
pub use error::{Error, Result};
pub use file::File;
pub use provider::{Provider, Providers};
pub use resolver::{Resolution, Resolver};

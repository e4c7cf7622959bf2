//! Error types for woodconf.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no configuration file configured")]
    NoConfigConfigured,

    #[error("unknown source type: {0}")]
    UnknownSourceType(String),

    #[error("no content provided")]
    NoContent,

    #[error("no entrypoint found: {0}")]
    NoEntrypoint(String),

    #[error("missing parameter: {0}")]
    MissingName(String),

    #[error("bad pattern: {0}")]
    BadPattern(String),

    #[error("io failure: {0}")]
    Io(String),

    #[error("decode failure: {0}")]
    Decode(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("conversion contains duplicated files: {}", .0.join(", "))]
    DuplicateNames(Vec<String>),
}

impl Error {
    /// Soft errors mean a provider has nothing to contribute for an environment.
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::NoConfigConfigured | Error::UnknownSourceType(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

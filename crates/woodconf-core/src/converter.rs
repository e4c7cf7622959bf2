//! Converter trait and the converter aggregator.
//!
//! Converters turn one raw file (e.g. a Starlark script) into zero or more
//! pipeline documents.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::file::find_duplicate_names;
use crate::{Environment, Error, File, Result};

/// Trait for file converters.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Name of this converter.
    fn name(&self) -> &'static str;

    /// Check if this converter can handle the given file.
    fn compatible(&self, file: &File) -> bool;

    /// Convert one file into its output documents.
    async fn convert(&self, file: &File, env: &Environment) -> Result<Vec<File>>;
}

/// Ordered set of converters.
#[derive(Clone, Default)]
pub struct Converters {
    converters: Vec<Arc<dyn Converter>>,
}

impl Converters {
    pub fn new(converters: Vec<Arc<dyn Converter>>) -> Self {
        Self { converters }
    }

    pub fn push(&mut self, converter: Arc<dyn Converter>) {
        self.converters.push(converter);
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Convert every file with the first compatible converter.
    ///
    /// Files no converter accepts are passed through unchanged. The output
    /// must not contain two files with the same name.
    pub async fn convert(&self, files: Vec<File>, env: &Environment) -> Result<Vec<File>> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let Some(converter) = self.converters.iter().find(|c| c.compatible(&file)) else {
                results.push(file);
                continue;
            };

            let converted = converter.convert(&file, env).await?;
            debug!(
                converter = converter.name(),
                file = %file.name,
                outputs = converted.len(),
                "Converted file"
            );
            results.extend(converted);
        }

        let duplicates = find_duplicate_names(&results);
        if !duplicates.is_empty() {
            return Err(Error::DuplicateNames(duplicates));
        }

        Ok(results)
    }
}

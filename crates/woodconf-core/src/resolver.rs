//! Resolution of the configuration files for one build.

use tracing::{debug, info};

use crate::file::find_duplicate_names;
use crate::{Converters, Environment, Error, File, Providers, Result};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No source produced any configuration; the orchestrator should fall
    /// back to its own configuration discovery.
    Empty,
    /// Sanitized, uniquely named configuration documents.
    Configs(Vec<File>),
}

/// Runs providers and converters for an environment.
///
/// Immutable after construction and shared between requests.
#[derive(Clone, Default)]
pub struct Resolver {
    providers: Providers,
    converters: Converters,
}

impl Resolver {
    pub fn new(providers: Providers, converters: Converters) -> Self {
        Self {
            providers,
            converters,
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn converters(&self) -> &Converters {
        &self.converters
    }

    /// Fetch and convert the files for an environment, keeping their names.
    pub async fn collect(&self, env: &Environment) -> Result<Vec<File>> {
        let provided = self.providers.get(env).await?;
        debug!(repo = %env.repo.full_name, count = provided.len(), "Providers resolved");

        let converted = self.converters.convert(provided, env).await?;
        debug!(repo = %env.repo.full_name, count = converted.len(), "Files converted");

        Ok(converted)
    }

    /// Fetch, convert and sanitize the files for an environment.
    pub async fn resolve(&self, env: &Environment) -> Result<Resolution> {
        let files = self.collect(env).await?;

        if files.is_empty() {
            info!(repo = %env.repo.full_name, "No configurations found");
            return Ok(Resolution::Empty);
        }

        let files: Vec<File> = files
            .into_iter()
            .map(|file| File {
                name: file.sanitized_name(),
                data: file.data,
            })
            .collect();

        let duplicates = find_duplicate_names(&files);
        if !duplicates.is_empty() {
            return Err(Error::DuplicateNames(duplicates));
        }

        info!(repo = %env.repo.full_name, count = files.len(), "Resolved configurations");
        Ok(Resolution::Configs(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Converter, Provider};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StaticProvider(Vec<File>);

    #[async_trait]
    impl Provider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn get(&self, _env: &Environment) -> Result<Vec<File>> {
            Ok(self.0.clone())
        }
    }

    struct MissingProvider;

    #[async_trait]
    impl Provider for MissingProvider {
        fn name(&self) -> &'static str {
            "missing"
        }

        async fn get(&self, _env: &Environment) -> Result<Vec<File>> {
            Err(Error::NoConfigConfigured)
        }
    }

    /// Uppercases `.txt` files and renames them to `<stem>.out`.
    struct UpperConverter;

    #[async_trait]
    impl Converter for UpperConverter {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn compatible(&self, file: &File) -> bool {
            file.extension() == Some("txt")
        }

        async fn convert(&self, file: &File, _env: &Environment) -> Result<Vec<File>> {
            let stem = file.name.trim_end_matches(".txt");
            Ok(vec![File::new(
                format!("{}.out", stem),
                file.data.to_uppercase(),
            )])
        }
    }

    fn resolver(providers: Vec<Arc<dyn Provider>>) -> Resolver {
        let converters: Vec<Arc<dyn Converter>> = vec![Arc::new(UpperConverter)];
        Resolver::new(Providers::new(providers), Converters::new(converters))
    }

    fn fixed(files: Vec<File>) -> Arc<dyn Provider> {
        Arc::new(StaticProvider(files))
    }

    #[tokio::test]
    async fn test_nothing_found_is_empty() {
        let resolver = resolver(vec![Arc::new(MissingProvider) as Arc<dyn Provider>]);
        let resolution = resolver.resolve(&Environment::default()).await.unwrap();
        assert_eq!(resolution, Resolution::Empty);
    }

    #[tokio::test]
    async fn test_no_providers_is_empty() {
        let resolver = Resolver::default();
        let resolution = resolver.resolve(&Environment::default()).await.unwrap();
        assert_eq!(resolution, Resolution::Empty);
    }

    #[tokio::test]
    async fn test_names_are_sanitized() {
        let resolver = resolver(vec![fixed(vec![
            File::new(".woodpecker/build.yaml", "steps: {}"),
            File::new("a/b.txt", "hello"),
        ])]);

        let resolution = resolver.resolve(&Environment::default()).await.unwrap();
        assert_eq!(
            resolution,
            Resolution::Configs(vec![
                File::new(".woodpecker__build", "steps: {}"),
                File::new("a__b", "HELLO"),
            ])
        );
    }

    #[tokio::test]
    async fn test_collect_keeps_names() {
        let resolver = resolver(vec![fixed(vec![File::new("a/b.txt", "hello")])]);

        let files = resolver.collect(&Environment::default()).await.unwrap();
        assert_eq!(files, vec![File::new("a/b.out", "HELLO")]);
    }

    #[tokio::test]
    async fn test_duplicates_after_sanitizing_fail() {
        let resolver = resolver(vec![
            fixed(vec![File::new("a/b.yaml", "one")]),
            fixed(vec![File::new("a__b.yml", "two")]),
        ]);

        match resolver.resolve(&Environment::default()).await {
            Err(Error::DuplicateNames(names)) => assert_eq!(names, vec!["a__b"]),
            other => panic!("expected duplicate names, got {:?}", other),
        }
    }
}

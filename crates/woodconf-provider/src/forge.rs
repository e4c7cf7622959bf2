//! Forge configuration provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use woodconf_config::ForgeConfig;
use woodconf_core::{Environment, Error, File, ForgeKind, Pipeline, Provider, Repository, Result};

use crate::github::GitHubForge;

/// Forge API errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Client for one forge's file contents API.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Fetch the file at `path` for the pipeline's commit.
    async fn file(
        &self,
        token: &str,
        repo: &Repository,
        pipeline: &Pipeline,
        path: &str,
    ) -> std::result::Result<String, ForgeError>;
}

/// Fetches the configured file from the forge hosting the repository.
///
/// The forge is chosen by the credential type of the environment.
#[derive(Clone, Default)]
pub struct ForgeProvider {
    forges: HashMap<ForgeKind, Arc<dyn ForgeClient>>,
}

impl ForgeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the client used for `kind`.
    pub fn with_forge(mut self, kind: ForgeKind, client: Arc<dyn ForgeClient>) -> Self {
        self.forges.insert(kind, client);
        self
    }

    /// Provider with every forge client the service supports.
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new().with_forge(
            ForgeKind::Github,
            Arc::new(GitHubForge::new(config.github_url.clone())),
        )
    }
}

#[async_trait]
impl Provider for ForgeProvider {
    fn name(&self) -> &'static str {
        "forge"
    }

    async fn get(&self, env: &Environment) -> Result<Vec<File>> {
        let kind: ForgeKind = env
            .netrc
            .kind
            .parse()
            .map_err(|_| Error::UnknownSourceType(env.netrc.kind.clone()))?;
        let client = self
            .forges
            .get(&kind)
            .ok_or_else(|| Error::UnknownSourceType(kind.to_string()))?;

        let path = env.repo.config_path.as_str();
        if path.is_empty() {
            return Err(Error::NoConfigConfigured);
        }

        debug!(forge = %kind, repo = %env.repo.full_name, path, "Fetching file from forge");
        let data = client
            .file(&env.netrc.login, &env.repo, &env.pipeline, path)
            .await
            .map_err(|e| Error::Io(format!("{}: {}", path, e)))?;

        Ok(vec![File::new(path, data)])
    }
}

//! GitHub contents API client.

use async_trait::async_trait;
use tracing::debug;
use url::Url;
use woodconf_core::{Pipeline, Repository};

use crate::forge::{ForgeClient, ForgeError};

const USER_AGENT: &str = "woodconf";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// GitHub (or GitHub Enterprise) client.
pub struct GitHubForge {
    client: reqwest::Client,
    api_url: Url,
}

impl GitHubForge {
    pub fn new(api_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// URL of `path` in the repository, without the ref query.
    pub fn contents_url(&self, repo: &Repository, path: &str) -> String {
        let (owner, name) = owner_and_name(repo);
        let path = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url.as_str().trim_end_matches('/'),
            urlencoding::encode(owner),
            urlencoding::encode(name),
            path
        )
    }
}

#[async_trait]
impl ForgeClient for GitHubForge {
    async fn file(
        &self,
        token: &str,
        repo: &Repository,
        pipeline: &Pipeline,
        path: &str,
    ) -> Result<String, ForgeError> {
        let url = self.contents_url(repo, path);
        debug!(url = %url, commit = %pipeline.commit, "Requesting GitHub contents");

        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", RAW_MEDIA_TYPE);
        if !token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if !pipeline.commit.is_empty() {
            request = request.query(&[("ref", pipeline.commit.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ForgeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::Api(format!(
                "Failed to get contents ({}): {}",
                status, text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ForgeError::Parse(e.to_string()))
    }
}

// Webhook payloads do not always carry the owner and short name.
fn owner_and_name(repo: &Repository) -> (&str, &str) {
    let (owner, name) = repo
        .full_name
        .split_once('/')
        .unwrap_or(("", repo.full_name.as_str()));
    let owner = if repo.owner.is_empty() { owner } else { repo.owner.as_str() };
    let name = if repo.name.is_empty() { name } else { repo.name.as_str() };
    (owner, name)
}

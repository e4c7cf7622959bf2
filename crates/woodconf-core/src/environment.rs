//! Build environment sent by the CI orchestrator.

use serde::{Deserialize, Serialize};

/// Forge flavor identified by a credential kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    Github,
    Gitlab,
    Gitea,
    Forgejo,
    Bitbucket,
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForgeKind::Github => write!(f, "github"),
            ForgeKind::Gitlab => write!(f, "gitlab"),
            ForgeKind::Gitea => write!(f, "gitea"),
            ForgeKind::Forgejo => write!(f, "forgejo"),
            ForgeKind::Bitbucket => write!(f, "bitbucket"),
        }
    }
}

impl std::str::FromStr for ForgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(ForgeKind::Github),
            "gitlab" => Ok(ForgeKind::Gitlab),
            "gitea" => Ok(ForgeKind::Gitea),
            "forgejo" => Ok(ForgeKind::Forgejo),
            "bitbucket" => Ok(ForgeKind::Bitbucket),
            _ => Err(format!("Unknown forge kind: {}", s)),
        }
    }
}

/// Everything known about the build a configuration is requested for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub repo: Repository,
    pub pipeline: Pipeline,
    pub netrc: Credential,
}

/// Repository the pipeline runs for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: String,
    #[serde(rename = "default_branch", alias = "branch")]
    pub branch: String,
    /// Configured configuration path; may be a glob for the filesystem provider.
    #[serde(rename = "config_file", alias = "config_path")]
    pub config_path: String,
}

/// The build event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    pub event: String,
    pub title: String,
    pub commit: String,
    #[serde(rename = "ref")]
    pub r#ref: String,
    pub branch: String,
    pub message: String,
    pub sender: String,
}

/// Forge credential of the build. Never forwarded to scripts or logs.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    #[serde(rename = "type")]
    pub kind: String,
    pub machine: String,
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("machine", &self.machine)
            .field("login", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_orchestrator_payload() {
        let payload = r#"{
            "repo": {
                "id": 7,
                "name": "web",
                "full_name": "acme/web",
                "owner": "acme",
                "default_branch": "main",
                "config_file": ".woodpecker/*.yaml"
            },
            "pipeline": {
                "event": "push",
                "commit": "abc123",
                "ref": "refs/heads/main",
                "branch": "main",
                "sender": "octocat"
            },
            "netrc": {"machine": "github.com", "login": "token", "type": "github"}
        }"#;

        let env: Environment = serde_json::from_str(payload).unwrap();
        assert_eq!(env.repo.full_name, "acme/web");
        assert_eq!(env.repo.branch, "main");
        assert_eq!(env.repo.config_path, ".woodpecker/*.yaml");
        assert_eq!(env.pipeline.r#ref, "refs/heads/main");
        assert_eq!(env.pipeline.title, "");
        assert_eq!(env.netrc.kind, "github");
        assert_eq!(env.netrc.login, "token");
    }

    #[test]
    fn test_decode_empty_object() {
        let env: Environment = serde_json::from_str("{}").unwrap();
        assert!(env.repo.config_path.is_empty());
        assert!(env.netrc.kind.is_empty());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential {
            kind: "github".to_string(),
            login: "ghp_secret".to_string(),
            password: "x-oauth-basic".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("ghp_secret"));
        assert!(!debug.contains("x-oauth-basic"));
        assert!(debug.contains("github"));
    }

    #[test]
    fn test_forge_kind_round_trip() {
        for kind in [ForgeKind::Github, ForgeKind::Gitlab, ForgeKind::Forgejo] {
            assert_eq!(kind.to_string().parse::<ForgeKind>().unwrap(), kind);
        }
        assert_eq!("GitHub".parse::<ForgeKind>().unwrap(), ForgeKind::Github);
        assert!("svn".parse::<ForgeKind>().is_err());
    }
}

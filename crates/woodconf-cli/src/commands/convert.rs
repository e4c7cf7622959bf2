//! `woodconf convert`: resolve configurations for an environment file.

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use woodconf_config::ServiceConfig;
use woodconf_converter::converters_from_config;
use woodconf_core::{Environment, File, Resolver};
use woodconf_provider::providers_from_config;

/// Matches `$VAR` and `${VAR}`.
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap()
});

pub async fn run(config: &ServiceConfig, env_path: &Path, out: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(env_path)
        .with_context(|| format!("failed to read {}", env_path.display()))?;
    let expanded = expand_env(&raw, |name| std::env::var(name).ok());
    let env: Environment = serde_json::from_str(&expanded)
        .with_context(|| format!("invalid environment in {}", env_path.display()))?;

    let resolver = Resolver::new(providers_from_config(config)?, converters_from_config(config));
    let files = resolver.collect(&env).await?;

    if files.is_empty() {
        println!("No configurations found");
        return Ok(());
    }

    match out {
        Some(dir) => {
            for file in &files {
                let path = output_path(dir, file);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                std::fs::write(&path, &file.data)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("{}", path.display());
            }
        }
        None => {
            for file in &files {
                println!("{}", file.name);
                println!("{}", "=".repeat(file.name.chars().count()));
                println!("{}", file.data);
            }
        }
    }

    Ok(())
}

/// Replace `$VAR` and `${VAR}` with the looked up value; unknown variables
/// become empty.
pub fn expand_env(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    VAR_REGEX
        .replace_all(input, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

fn output_path(dir: &Path, file: &File) -> PathBuf {
    let path = dir.join(&file.name);
    if file.extension().is_some() {
        path
    } else {
        let mut name = path.into_os_string();
        name.push(".yaml");
        PathBuf::from(name)
    }
}

//! Filesystem configuration provider.

use async_recursion::async_recursion;
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use woodconf_core::{Environment, Error, File, Provider, Result};

/// Serves configuration files from a local directory.
///
/// Configured with a source such as `/srv/pipelines/**/*.yaml`: everything
/// before the first glob metacharacter's directory is the base directory,
/// the rest is a pattern matched against paths relative to it.
#[derive(Debug, Clone)]
pub struct FsProvider {
    base: PathBuf,
    pattern: String,
}

impl FsProvider {
    /// Create a provider for `source`; the base directory must exist.
    pub fn new(source: &str) -> Result<Self> {
        let (base, pattern) = split_pattern(source);

        let metadata = std::fs::metadata(&base)
            .map_err(|e| Error::Io(format!("{}: {}", base.display(), e)))?;
        if !metadata.is_dir() {
            return Err(Error::Io(format!("{} is not a directory", base.display())));
        }

        Ok(Self { base, pattern })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[async_trait]
impl Provider for FsProvider {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn get(&self, env: &Environment) -> Result<Vec<File>> {
        let source = compile(&self.pattern)?;
        let requested = compile(&env.repo.config_path)?;

        let mut paths = Vec::new();
        walk(&self.base, &self.base, &mut paths)
            .await
            .map_err(|e| Error::Io(format!("{}: {}", self.base.display(), e)))?;
        paths.retain(|path| source.is_match(path) && requested.is_match(path));
        paths.sort();

        debug!(base = %self.base.display(), count = paths.len(), "Matched files");

        let base = Arc::new(self.base.clone());
        let mut reads = JoinSet::new();
        for path in paths {
            let base = Arc::clone(&base);
            reads.spawn(async move {
                tokio::fs::read_to_string(base.join(&path))
                    .await
                    .map(|data| File::new(path.as_str(), data))
                    .map_err(|e| Error::Io(format!("{}: {}", path, e)))
            });
        }

        let mut files = Vec::with_capacity(reads.len());
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok(Ok(file)) => files.push(file),
                Ok(Err(e)) => {
                    reads.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    reads.abort_all();
                    return Err(Error::Io(format!("read task failed: {}", e)));
                }
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

/// Split a glob source into its base directory and the pattern below it.
pub fn split_pattern(source: &str) -> (PathBuf, String) {
    let first_meta = source.find(['*', '?', '[', '{']).unwrap_or(source.len());

    match source[..first_meta].rfind('/') {
        Some(0) => (PathBuf::from("/"), source[1..].to_string()),
        Some(idx) => (PathBuf::from(&source[..idx]), source[idx + 1..].to_string()),
        None => (PathBuf::from("."), source.to_string()),
    }
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.is_empty() { "**" } else { pattern };
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::BadPattern(format!("{}: {}", pattern, e)))
}

// Symlinked directories are not descended into, so links cannot loop the
// walk. Entries that vanish or cannot be read below the base are skipped.
#[async_recursion]
async fn walk(base: &Path, dir: &Path, paths: &mut Vec<String>) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let is_file = if file_type.is_dir() {
            if let Err(e) = walk(base, &path, paths).await {
                warn!(path = %path.display(), error = %e, "Skipping unreadable directory");
            }
            false
        } else if file_type.is_symlink() {
            match tokio::fs::metadata(&path).await {
                Ok(target) => target.is_file(),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping dangling link");
                    false
                }
            }
        } else {
            file_type.is_file()
        };

        if is_file {
            if let Ok(relative) = path.strip_prefix(base) {
                paths.push(relative_name(relative));
            }
        }
    }

    Ok(())
}

fn relative_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

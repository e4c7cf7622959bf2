//! `woodconf validate`: run one Starlark script.

use anyhow::{Context, Result, bail};
use std::path::Path;
use woodconf_config::ServiceConfig;
use woodconf_converter::StarlarkConverter;
use woodconf_core::{Converter, Environment, File};

pub async fn run(config: &ServiceConfig, path: &Path) -> Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file = File::new(path.to_string_lossy(), data);

    let converter = StarlarkConverter::from_config(&config.starlark);
    if !converter.compatible(&file) {
        bail!("{} is not a Starlark file", path.display());
    }

    let documents = converter
        .convert(&file, &Environment::default())
        .await
        .with_context(|| format!("{} is invalid", path.display()))?;

    println!("{} is valid, {} document(s):", path.display(), documents.len());
    for document in &documents {
        println!("  {}", document.name);
    }

    Ok(())
}

//! Command implementations for tspprune CLI.

pub mod assemble;
pub mod build;
pub mod clear;
pub mod generate;
pub mod worker;

use anyhow::{bail, Context, Result};
use std::path::Path;
use tspprune_dataset::PipelineConfig;

/// Config from `--config`, with `--features` replacing its feature list.
/// One of the two must be given.
pub fn resolve_config(config: Option<&Path>, features: &[String]) -> Result<PipelineConfig> {
    let mut resolved = match config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None if features.is_empty() => bail!("either --config or --features is required"),
        None => PipelineConfig::new(features.to_vec()),
    };
    if config.is_some() && !features.is_empty() {
        resolved.feature_dirs = features.to_vec();
    }
    resolved.validate()?;
    Ok(resolved)
}

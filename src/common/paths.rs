//! Centralized path management for dotinstall

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// File name of the package catalog inside a source directory
pub const CATALOG_FILE: &str = "packages.json";

/// Get the dotinstall config directory
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("dotinstall");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Default chezmoi source directory, the usual home of `packages.json`
pub fn chezmoi_source_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
            home.join(".local/share")
        })
        .join("chezmoi")
}

/// Resolve which catalog file to load.
///
/// Order: explicit source directory, configured catalog path, the current
/// directory, then the chezmoi source directory.
pub fn resolve_catalog_path(source: Option<&Path>, configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = source {
        return dir.join(CATALOG_FILE);
    }
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    let local = PathBuf::from(CATALOG_FILE);
    if local.exists() {
        return local;
    }
    chezmoi_source_dir().join(CATALOG_FILE)
}

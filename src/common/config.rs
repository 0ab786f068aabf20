//! Installer configuration stored in `~/.config/dotinstall/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths;
use super::shell::expand_path;

fn default_workers() -> usize {
    4
}

fn default_command_timeout_secs() -> u64 {
    30 * 60
}

fn default_brew_program() -> String {
    "brew".to_string()
}

fn default_flatpak_remote() -> String {
    "flathub".to_string()
}

fn default_script_shell() -> String {
    "bash".to_string()
}

fn default_bin_dir() -> String {
    "~/.local/bin".to_string()
}

fn default_application_dirs() -> Vec<String> {
    vec!["/Applications".to_string(), "~/Applications".to_string()]
}

fn default_system_applications_dir() -> String {
    "/Applications".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InstallerConfig {
    /// Size of the worker pool for non-native installs
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upper bound for any single external command
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Program used for formula installs (e.g. `brew` or `zb`)
    #[serde(default = "default_brew_program")]
    pub brew_program: String,
    #[serde(default = "default_flatpak_remote")]
    pub flatpak_remote: String,
    /// Interpreter for `manual` script installs
    #[serde(default = "default_script_shell")]
    pub script_shell: String,
    /// Per-user binary directory for eget and AppImage installs
    #[serde(default = "default_bin_dir")]
    pub bin_dir: String,
    /// Directories scanned for `.app` bundles during detection
    #[serde(default = "default_application_dirs")]
    pub application_dirs: Vec<String>,
    /// Where DMG bundles are copied to
    #[serde(default = "default_system_applications_dir")]
    pub system_applications_dir: String,
    /// Catalog to use when no `--source` is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            command_timeout_secs: default_command_timeout_secs(),
            brew_program: default_brew_program(),
            flatpak_remote: default_flatpak_remote(),
            script_shell: default_script_shell(),
            bin_dir: default_bin_dir(),
            application_dirs: default_application_dirs(),
            system_applications_dir: default_system_applications_dir(),
            catalog: None,
        }
    }
}

impl InstallerConfig {
    pub fn config_path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join("config.toml"))
    }

    /// Load the config from disk. If the config file does not exist,
    /// create a default config file and return the default.
    pub fn load() -> Result<Self> {
        let cfg_path = Self::config_path()?;
        Self::load_from(&cfg_path)
    }

    pub fn load_from(cfg_path: &Path) -> Result<Self> {
        if !cfg_path.exists() {
            let default = Self::default();
            let toml = toml::to_string_pretty(&default).context("serializing default config")?;
            fs::write(cfg_path, toml)
                .with_context(|| format!("writing default config to {}", cfg_path.display()))?;
            return Ok(default);
        }
        let s = fs::read_to_string(cfg_path)
            .with_context(|| format!("reading config {}", cfg_path.display()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(s).context("parsing config toml")?;
        if config.workers == 0 {
            config.workers = 1;
        }
        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn bin_dir(&self) -> PathBuf {
        expand_path(&self.bin_dir)
    }

    pub fn application_dirs(&self) -> Vec<PathBuf> {
        self.application_dirs.iter().map(|d| expand_path(d)).collect()
    }

    pub fn system_applications_dir(&self) -> PathBuf {
        expand_path(&self.system_applications_dir)
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.as_deref().map(expand_path)
    }
}

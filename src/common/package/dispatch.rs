//! Per-package detection and installation.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::catalog::Package;
use super::detect::DetectionCache;
use super::manual::{self, ManualContext};
use super::method::{InstallMethod, ManualKind, MethodKind};
use super::release::{FetchError, Fetcher};
use super::report::InstallResult;
use super::resolve::{ResolvedMethod, resolve};
use crate::common::config::InstallerConfig;
use crate::common::process::{CommandError, CommandRunner, CommandSpec};
use crate::ui::prelude::*;

/// Cask output when the app bundle exists but brew does not own it
const CASK_APP_EXISTS: &str = "It seems there is already an App at";
const FLATHUB_REPO_URL: &str = "https://dl.flathub.org/repo/flathub.flatpakrepo";

/// The parts of [`InstallerConfig`] install procedures need.
#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub brew_program: String,
    pub flatpak_remote: String,
    pub script_shell: String,
    pub bin_dir: PathBuf,
    pub application_dirs: Vec<PathBuf>,
    pub system_applications_dir: PathBuf,
}

impl InstallSettings {
    pub fn from_config(config: &InstallerConfig) -> Self {
        Self {
            brew_program: config.brew_program.clone(),
            flatpak_remote: config.flatpak_remote.clone(),
            script_shell: config.script_shell.clone(),
            bin_dir: config.bin_dir(),
            application_dirs: config.application_dirs(),
            system_applications_dir: config.system_applications_dir(),
        }
    }
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self::from_config(&InstallerConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not find a /Volumes mount point in hdiutil output")]
    MountPointNotFound,

    #[error("no .app bundle in {}", .0.display())]
    NoAppBundle(PathBuf),

    #[error("invalid script arguments `{args}`: {source}")]
    ScriptArgs {
        args: String,
        #[source]
        source: shell_words::ParseError,
    },
}

/// What an install action did when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Installed,
    Skipped(String),
}

/// Detects and installs single packages for one platform target.
pub struct Installer {
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn Fetcher>,
    cache: DetectionCache,
    settings: InstallSettings,
    target: String,
    flathub_ready: OnceCell<()>,
}

impl Installer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn Fetcher>,
        settings: InstallSettings,
        target: impl Into<String>,
    ) -> Self {
        let cache = DetectionCache::new(runner.clone(), settings.application_dirs.clone());
        Self {
            runner,
            fetcher,
            cache,
            settings,
            target: target.into(),
            flathub_ready: OnceCell::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn resolve<'a>(&self, package: &'a Package) -> Option<ResolvedMethod<'a>> {
        resolve(package, &self.target)
    }

    pub async fn is_installed(&self, name: &str, method: &InstallMethod) -> bool {
        self.cache.is_installed(name, method).await
    }

    /// Detection status of a package on this target, `None` without a method.
    pub async fn detect(&self, package: &Package) -> Option<bool> {
        let resolved = self.resolve(package)?;
        Some(self.is_installed(&package.name, resolved.method).await)
    }

    /// Resolve, detect and install one package.
    pub async fn install(&self, package: &Package) -> InstallResult {
        let Some(ResolvedMethod { method, kind }) = self.resolve(package) else {
            return InstallResult::no_method(&package.name, &self.target);
        };

        if self.is_installed(&package.name, method).await {
            return InstallResult::already_installed(&package.name, kind);
        }

        match self.install_method(&package.name, method).await {
            Ok(ActionOutcome::Installed) => InstallResult::installed(&package.name, kind),
            Ok(ActionOutcome::Skipped(reason)) => {
                InstallResult::skipped(&package.name, Some(kind), reason)
            }
            Err(err) => {
                emit(
                    Level::Debug,
                    "install.error",
                    &format!("{}: {:?}", package.name, err),
                    None,
                );
                InstallResult::failed(&package.name, kind, err.to_string())
            }
        }
    }

    /// Command that installs a single package, for every kind but `manual`.
    pub fn install_command(&self, method: &InstallMethod) -> Option<CommandSpec> {
        let s = &self.settings;
        let cmd = match method {
            InstallMethod::Brew(_)
            | InstallMethod::Cask(_)
            | InstallMethod::Apt(_)
            | InstallMethod::Dnf(_) => {
                return self.batch_install_command(method.kind(), &[method.specifier()?]);
            }
            InstallMethod::UvTool(tool) => CommandSpec::new("uv").args(["tool", "install"]).arg(tool),
            InstallMethod::Cargo(krate) => CommandSpec::new("cargo").arg("install").arg(krate),
            InstallMethod::GoTool(module) => CommandSpec::new("go").arg("install").arg(module),
            InstallMethod::Snap(snap) => {
                let cmd = CommandSpec::sudo("snap").arg("install").arg(&snap.name);
                if snap.classic {
                    cmd.arg("--classic")
                } else {
                    cmd
                }
            }
            InstallMethod::Flatpak(app) => CommandSpec::new("flatpak")
                .args(["install", "-y"])
                .arg(&s.flatpak_remote)
                .arg(app),
            InstallMethod::Yay(pkg) => CommandSpec::new("yay").args(["-S", "--noconfirm"]).arg(pkg),
            InstallMethod::GhExtension(repo) => {
                CommandSpec::new("gh").args(["extension", "install"]).arg(repo)
            }
            InstallMethod::Eget(repo) => CommandSpec::new("eget")
                .arg(repo)
                .arg("--to")
                .arg(s.bin_dir.display().to_string()),
            InstallMethod::Manual(_) => return None,
        };
        Some(cmd)
    }

    /// One command installing every specifier of a native kind.
    ///
    /// Compound specifiers are split so each package is its own argument.
    pub fn batch_install_command(&self, kind: MethodKind, specs: &[&str]) -> Option<CommandSpec> {
        let packages = specs.iter().flat_map(|s| s.split_whitespace());
        let cmd = match kind {
            MethodKind::Brew => CommandSpec::new(&self.settings.brew_program).arg("install"),
            MethodKind::Cask => CommandSpec::new("brew").args(["install", "--cask"]),
            MethodKind::Apt => CommandSpec::sudo("apt").args(["install", "-y"]),
            MethodKind::Dnf => CommandSpec::sudo("dnf").args(["install", "-y"]),
            _ => return None,
        };
        Some(cmd.args(packages))
    }

    /// Human description of what installing `method` would do.
    pub fn planned_action(&self, method: &InstallMethod) -> String {
        match method {
            InstallMethod::Manual(spec) => match &spec.kind {
                ManualKind::Script { url, args } => match args {
                    Some(args) => format!("{} <{}> {}", self.settings.script_shell, url, args),
                    None => format!("{} <{}>", self.settings.script_shell, url),
                },
                ManualKind::GitClone { url } => format!(
                    "git clone {} {}",
                    url,
                    spec.dest.as_deref().unwrap_or_default()
                ),
                other => match other.release_asset() {
                    Some(asset) => format!(
                        "{} from the latest {} release (*{})",
                        other.type_name(),
                        asset.repo,
                        asset.asset_pattern
                    ),
                    None => other.type_name().to_string(),
                },
            },
            other => self
                .install_command(other)
                .map(|cmd| cmd.command_line())
                .unwrap_or_else(|| other.describe()),
        }
    }

    /// Install without detecting first.
    pub async fn install_method(
        &self,
        name: &str,
        method: &InstallMethod,
    ) -> Result<ActionOutcome, InstallError> {
        match method {
            InstallMethod::Manual(spec) => {
                let ctx = ManualContext {
                    runner: self.runner.as_ref(),
                    fetcher: self.fetcher.as_ref(),
                    settings: &self.settings,
                };
                manual::install(&ctx, name, spec).await?;
                Ok(ActionOutcome::Installed)
            }
            InstallMethod::GhExtension(_) => {
                let authed = self
                    .runner
                    .output(&CommandSpec::new("gh").args(["auth", "status"]))
                    .await
                    .is_ok_and(|out| out.success());
                if !authed {
                    return Ok(ActionOutcome::Skipped("gh not authenticated".to_string()));
                }
                self.run_install(method).await
            }
            InstallMethod::Eget(_) => {
                let bin_dir = &self.settings.bin_dir;
                std::fs::create_dir_all(bin_dir).map_err(|source| InstallError::Io {
                    action: "creating",
                    path: bin_dir.clone(),
                    source,
                })?;
                self.run_install(method).await
            }
            InstallMethod::Flatpak(_) => {
                self.ensure_flathub().await;
                self.run_install(method).await
            }
            InstallMethod::Cask(_) => {
                let Some(cmd) = self.install_command(method) else {
                    return Ok(ActionOutcome::Skipped("nothing to install".to_string()));
                };
                let output = self.runner.output(&cmd).await?;
                if output.success() {
                    Ok(ActionOutcome::Installed)
                } else if output.combined().contains(CASK_APP_EXISTS) {
                    Ok(ActionOutcome::Skipped(
                        "app already present outside Homebrew".to_string(),
                    ))
                } else {
                    Err(CommandError::failed(&cmd, &output).into())
                }
            }
            _ => self.run_install(method).await,
        }
    }

    async fn run_install(&self, method: &InstallMethod) -> Result<ActionOutcome, InstallError> {
        let Some(cmd) = self.install_command(method) else {
            return Ok(ActionOutcome::Skipped("nothing to install".to_string()));
        };
        self.runner.run(&cmd).await?;
        Ok(ActionOutcome::Installed)
    }

    /// Register the Flathub remote once before the first flatpak install.
    async fn ensure_flathub(&self) {
        if self.settings.flatpak_remote != "flathub" {
            return;
        }
        self.flathub_ready
            .get_or_init(|| async {
                let cmd = CommandSpec::new("flatpak").args([
                    "remote-add",
                    "--if-not-exists",
                    "flathub",
                    FLATHUB_REPO_URL,
                ]);
                if let Err(err) = self.runner.run(&cmd).await {
                    emit(
                        Level::Warn,
                        "install.flathub_failed",
                        &format!("Could not register the flathub remote: {}", err),
                        None,
                    );
                }
            })
            .await;
    }
}

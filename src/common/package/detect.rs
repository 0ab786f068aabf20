//! Installed-package detection.
//!
//! Each package manager is asked for its installed set at most once per run.
//! The result is shared by every later query for that kind, including queries
//! racing on the first lookup.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use super::method::{InstallMethod, ManualKind, ManualSpec, MethodKind, go_binary_name, last_segment};
use crate::common::process::{CommandRunner, CommandSpec};
use crate::common::shell::expand_path;
use crate::ui::prelude::*;

pub type InstalledSet = Arc<HashSet<String>>;

/// How an enumeration command's output maps to names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStyle {
    /// Every non-empty line is a name
    Lines,
    /// The first whitespace-separated token of every line is a name
    FirstToken,
}

impl ParseStyle {
    pub fn parse(self, output: &str) -> HashSet<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match self {
                ParseStyle::Lines => Some(line.to_string()),
                ParseStyle::FirstToken => line.split_whitespace().next().map(str::to_string),
            })
            .collect()
    }
}

/// The command listing installed packages of `kind`, if the kind has one.
pub fn enumeration_command(kind: MethodKind) -> Option<(CommandSpec, ParseStyle)> {
    use ParseStyle::*;
    let entry = match kind {
        MethodKind::Brew => (
            CommandSpec::new("brew").args(["list", "--formula", "-1"]),
            Lines,
        ),
        MethodKind::Cask => (CommandSpec::new("brew").args(["list", "--cask", "-1"]), Lines),
        MethodKind::Apt => (
            CommandSpec::new("dpkg-query").args(["-W", "-f=${Package}\\n"]),
            Lines,
        ),
        MethodKind::Dnf => (
            CommandSpec::new("rpm").args(["-qa", "--qf", "%{NAME}\\n"]),
            Lines,
        ),
        MethodKind::UvTool => (CommandSpec::new("uv").args(["tool", "list"]), FirstToken),
        MethodKind::Cargo => (
            CommandSpec::new("cargo").args(["install", "--list"]),
            FirstToken,
        ),
        MethodKind::Snap => (CommandSpec::new("snap").arg("list"), FirstToken),
        MethodKind::Flatpak => (
            CommandSpec::new("flatpak").args(["list", "--columns=application"]),
            Lines,
        ),
        MethodKind::Yay => (CommandSpec::new("yay").arg("-Qq"), Lines),
        MethodKind::GhExtension => (CommandSpec::new("gh").args(["extension", "list"]), Lines),
        MethodKind::GoTool | MethodKind::Eget | MethodKind::Manual => return None,
    };
    Some(entry)
}

/// Normalize an application bundle name the way casks are named:
/// `Visual Studio Code.app` becomes `visual-studio-code`.
pub fn cask_name_from_bundle(bundle: &str) -> String {
    bundle
        .strip_suffix(".app")
        .unwrap_or(bundle)
        .replace(' ', "-")
        .to_lowercase()
}

/// Names of the `.app` bundles directly inside `dir`. Unreadable dirs yield nothing.
fn app_bundles(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".app"))
        .collect()
}

/// Per-run memo of installed packages, keyed by method kind.
pub struct DetectionCache {
    runner: Arc<dyn CommandRunner>,
    application_dirs: Vec<PathBuf>,
    sets: Mutex<HashMap<MethodKind, Arc<OnceCell<InstalledSet>>>>,
}

impl DetectionCache {
    pub fn new(runner: Arc<dyn CommandRunner>, application_dirs: Vec<PathBuf>) -> Self {
        Self {
            runner,
            application_dirs,
            sets: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, kind: MethodKind) -> Arc<OnceCell<InstalledSet>> {
        // A poisoned map still holds valid cells
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        sets.entry(kind).or_default().clone()
    }

    /// The installed set for `kind`, enumerating on first use.
    pub async fn installed(&self, kind: MethodKind) -> InstalledSet {
        self.cell(kind)
            .get_or_init(|| self.enumerate(kind))
            .await
            .clone()
    }

    async fn enumerate(&self, kind: MethodKind) -> InstalledSet {
        let mut names = match enumeration_command(kind) {
            Some((cmd, style)) => match self.runner.output(&cmd).await {
                Ok(output) if output.success() => style.parse(&output.stdout),
                Ok(output) => {
                    emit(
                        Level::Debug,
                        "detect.enumeration_failed",
                        &format!("{} exited with {:?}; assuming nothing installed", cmd, output.code),
                        None,
                    );
                    HashSet::new()
                }
                Err(err) => {
                    emit(
                        Level::Debug,
                        "detect.enumeration_failed",
                        &format!("{}; assuming nothing installed", err),
                        None,
                    );
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        if kind == MethodKind::Cask {
            for dir in &self.application_dirs {
                names.extend(app_bundles(dir).iter().map(|b| cask_name_from_bundle(b)));
            }
        }

        emit(
            Level::Debug,
            "detect.enumerated",
            &format!("{}: {} installed", kind, names.len()),
            None,
        );
        Arc::new(names)
    }

    /// Whether the package `name`, installed through `method`, is already present.
    pub async fn is_installed(&self, name: &str, method: &InstallMethod) -> bool {
        match method {
            InstallMethod::GoTool(module) => self.runner.command_exists(go_binary_name(module)),
            InstallMethod::Eget(repo) => self.runner.command_exists(last_segment(repo)),
            InstallMethod::Manual(spec) => self.is_manual_installed(name, spec),
            InstallMethod::GhExtension(repo) => {
                let extension = last_segment(repo);
                self.installed(MethodKind::GhExtension)
                    .await
                    .iter()
                    .any(|line| line.contains(extension))
            }
            InstallMethod::Brew(formula) | InstallMethod::Cask(formula) => {
                // Tapped names like `dlvhdr/formulae/gh-dash` list as `gh-dash`
                self.installed(method.kind())
                    .await
                    .contains(last_segment(formula))
            }
            other => {
                let kind = other.kind();
                let installed = self.installed(kind).await;
                if kind.supports_compound_spec() {
                    let tokens = other.spec_tokens();
                    !tokens.is_empty() && tokens.iter().all(|t| installed.contains(*t))
                } else {
                    other
                        .specifier()
                        .is_some_and(|spec| installed.contains(spec.trim()))
                }
            }
        }
    }

    fn is_manual_installed(&self, name: &str, spec: &ManualSpec) -> bool {
        if let Some(check_command) = non_empty(&spec.check_command) {
            return self.runner.command_exists(check_command);
        }
        if let Some(check_dir) = non_empty(&spec.check_dir) {
            if expand_path(check_dir).is_dir() {
                return true;
            }
        }
        if let Some(dest) = non_empty(&spec.dest) {
            if expand_path(dest).exists() {
                return true;
            }
        }
        if matches!(spec.kind, ManualKind::Dmg(_)) && self.has_app_bundle_named(name) {
            return true;
        }
        self.runner.command_exists(name)
    }

    fn has_app_bundle_named(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        self.application_dirs
            .iter()
            .flat_map(|dir| app_bundles(dir))
            .any(|bundle| bundle.to_lowercase().contains(&needle))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

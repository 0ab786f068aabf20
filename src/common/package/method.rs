//! Install methods - how one package is installed on one platform target.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The tag of an [`InstallMethod`].
///
/// Variant order is the canonical priority order: native managers first, in
/// the order their batches run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Brew,
    Cask,
    Apt,
    Dnf,
    UvTool,
    Cargo,
    GoTool,
    Snap,
    Flatpak,
    Yay,
    GhExtension,
    Eget,
    Manual,
}

impl MethodKind {
    pub const ALL: [MethodKind; 13] = [
        Self::Brew,
        Self::Cask,
        Self::Apt,
        Self::Dnf,
        Self::UvTool,
        Self::Cargo,
        Self::GoTool,
        Self::Snap,
        Self::Flatpak,
        Self::Yay,
        Self::GhExtension,
        Self::Eget,
        Self::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Cask => "cask",
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::UvTool => "uv_tool",
            Self::Cargo => "cargo",
            Self::GoTool => "go_tool",
            Self::Snap => "snap",
            Self::Flatpak => "flatpak",
            Self::Yay => "yay",
            Self::GhExtension => "gh_extension",
            Self::Eget => "eget",
            Self::Manual => "manual",
        }
    }

    /// Native system package managers, installed in one batched invocation per kind.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::Brew | Self::Cask | Self::Apt | Self::Dnf)
    }

    /// Whether this kind belongs to the Homebrew family (needs taps first).
    pub fn is_brew_family(&self) -> bool {
        matches!(self, Self::Brew | Self::Cask)
    }

    /// Kinds whose specifier may name several packages separated by whitespace.
    pub fn supports_compound_spec(&self) -> bool {
        matches!(self, Self::Apt | Self::Dnf)
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snap package, written either as `"name"` or `{"name": ..., "classic": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "SnapField")]
pub struct SnapSpec {
    pub name: String,
    pub classic: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapField {
    Name(String),
    Spec {
        name: String,
        #[serde(default)]
        classic: bool,
    },
}

impl From<SnapField> for SnapSpec {
    fn from(field: SnapField) -> Self {
        match field {
            SnapField::Name(name) => SnapSpec {
                name,
                classic: false,
            },
            SnapField::Spec { name, classic } => SnapSpec { name, classic },
        }
    }
}

/// A GitHub release asset selected by filename suffix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAssetSpec {
    /// `owner/name`
    pub repo: String,
    /// Suffix the asset filename must end with
    pub asset_pattern: String,
}

impl ReleaseAssetSpec {
    /// Last path segment of the repository, e.g. `zebar` for `glzr-io/zebar`.
    pub fn repo_name(&self) -> &str {
        last_segment(&self.repo)
    }
}

/// The procedure-specific part of a manual install.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManualKind {
    /// Download a script and run it
    Script {
        url: String,
        #[serde(default)]
        args: Option<String>,
    },
    /// Clone a git repository into `dest`
    GitClone { url: String },
    Dmg(ReleaseAssetSpec),
    Deb(ReleaseAssetSpec),
    Rpm(ReleaseAssetSpec),
    #[serde(rename = "appimage")]
    AppImage(ReleaseAssetSpec),
}

impl ManualKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Script { .. } => "script",
            Self::GitClone { .. } => "git_clone",
            Self::Dmg(_) => "dmg",
            Self::Deb(_) => "deb",
            Self::Rpm(_) => "rpm",
            Self::AppImage(_) => "appimage",
        }
    }

    pub fn release_asset(&self) -> Option<&ReleaseAssetSpec> {
        match self {
            Self::Dmg(spec) | Self::Deb(spec) | Self::Rpm(spec) | Self::AppImage(spec) => {
                Some(spec)
            }
            Self::Script { .. } | Self::GitClone { .. } => None,
        }
    }
}

/// A manual install plus the optional hints used to detect it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManualSpec {
    #[serde(flatten)]
    pub kind: ManualKind,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub check_command: Option<String>,
    #[serde(default)]
    pub check_dir: Option<String>,
}

/// How to install a package on one platform target.
///
/// Exactly one method per target. Catalog objects setting several method
/// fields are rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawInstallMethod")]
pub enum InstallMethod {
    Brew(String),
    Cask(String),
    Apt(String),
    Dnf(String),
    UvTool(String),
    Cargo(String),
    GoTool(String),
    Snap(SnapSpec),
    Flatpak(String),
    Yay(String),
    GhExtension(String),
    Eget(String),
    Manual(ManualSpec),
}

impl InstallMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            Self::Brew(_) => MethodKind::Brew,
            Self::Cask(_) => MethodKind::Cask,
            Self::Apt(_) => MethodKind::Apt,
            Self::Dnf(_) => MethodKind::Dnf,
            Self::UvTool(_) => MethodKind::UvTool,
            Self::Cargo(_) => MethodKind::Cargo,
            Self::GoTool(_) => MethodKind::GoTool,
            Self::Snap(_) => MethodKind::Snap,
            Self::Flatpak(_) => MethodKind::Flatpak,
            Self::Yay(_) => MethodKind::Yay,
            Self::GhExtension(_) => MethodKind::GhExtension,
            Self::Eget(_) => MethodKind::Eget,
            Self::Manual(_) => MethodKind::Manual,
        }
    }

    /// The string handed to the package manager, if this method has one.
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::Brew(s)
            | Self::Cask(s)
            | Self::Apt(s)
            | Self::Dnf(s)
            | Self::UvTool(s)
            | Self::Cargo(s)
            | Self::GoTool(s)
            | Self::Flatpak(s)
            | Self::Yay(s)
            | Self::GhExtension(s)
            | Self::Eget(s) => Some(s),
            Self::Snap(snap) => Some(&snap.name),
            Self::Manual(_) => None,
        }
    }

    /// Whitespace-separated package names of the specifier.
    pub fn spec_tokens(&self) -> Vec<&str> {
        self.specifier()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn is_system(&self) -> bool {
        self.kind().is_system()
    }

    /// Short human description, e.g. `apt: gcc make` or `manual (dmg)`.
    pub fn describe(&self) -> String {
        match self {
            Self::Manual(manual) => format!("manual ({})", manual.kind.type_name()),
            Self::Snap(SnapSpec { name, classic: true }) => format!("snap: {} (classic)", name),
            other => format!(
                "{}: {}",
                other.kind(),
                other.specifier().unwrap_or_default()
            ),
        }
    }
}

/// Last `/`-separated segment of a repository or module path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Executable name installed by `go install <path>[@version]`.
pub fn go_binary_name(module: &str) -> &str {
    let name = last_segment(module);
    name.split('@').next().unwrap_or(name)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MethodError {
    #[error("no install method set")]
    Empty,

    #[error("more than one install method set: {}", join_kinds(.0))]
    Ambiguous(Vec<MethodKind>),

    #[error("{kind} method is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

fn join_kinds(kinds: &[MethodKind]) -> String {
    kinds
        .iter()
        .map(MethodKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The flat on-disk shape of a method object.
#[derive(Debug, Default, Deserialize)]
struct RawInstallMethod {
    #[serde(default)]
    brew: Option<String>,
    #[serde(default)]
    cask: Option<String>,
    #[serde(default)]
    apt: Option<String>,
    #[serde(default)]
    dnf: Option<String>,
    #[serde(default)]
    uv_tool: Option<String>,
    #[serde(default)]
    cargo: Option<String>,
    #[serde(default)]
    go_tool: Option<String>,
    #[serde(default)]
    snap: Option<SnapSpec>,
    #[serde(default)]
    flatpak: Option<String>,
    #[serde(default)]
    yay: Option<String>,
    #[serde(default)]
    gh_extension: Option<String>,
    #[serde(default)]
    eget: Option<String>,
    #[serde(default)]
    manual: Option<ManualSpec>,
}

/// Empty strings count as unset.
fn push_string(
    candidates: &mut Vec<InstallMethod>,
    value: Option<String>,
    ctor: fn(String) -> InstallMethod,
) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        candidates.push(ctor(value));
    }
}

impl TryFrom<RawInstallMethod> for InstallMethod {
    type Error = MethodError;

    fn try_from(raw: RawInstallMethod) -> Result<Self, Self::Error> {
        let mut candidates: Vec<InstallMethod> = Vec::new();
        let c = &mut candidates;

        push_string(c, raw.brew, InstallMethod::Brew);
        push_string(c, raw.cask, InstallMethod::Cask);
        push_string(c, raw.apt, InstallMethod::Apt);
        push_string(c, raw.dnf, InstallMethod::Dnf);
        push_string(c, raw.uv_tool, InstallMethod::UvTool);
        push_string(c, raw.cargo, InstallMethod::Cargo);
        push_string(c, raw.go_tool, InstallMethod::GoTool);
        if let Some(snap) = raw.snap.filter(|s| !s.name.trim().is_empty()) {
            c.push(InstallMethod::Snap(snap));
        }
        push_string(c, raw.flatpak, InstallMethod::Flatpak);
        push_string(c, raw.yay, InstallMethod::Yay);
        push_string(c, raw.gh_extension, InstallMethod::GhExtension);
        push_string(c, raw.eget, InstallMethod::Eget);

        if let Some(manual) = raw.manual {
            if matches!(manual.kind, ManualKind::GitClone { .. })
                && manual.dest.as_deref().is_none_or(|d| d.trim().is_empty())
            {
                return Err(MethodError::MissingField {
                    kind: "git_clone",
                    field: "dest",
                });
            }
            candidates.push(InstallMethod::Manual(manual));
        }

        match candidates.len() {
            0 => Err(MethodError::Empty),
            1 => Ok(candidates.remove(0)),
            _ => Err(MethodError::Ambiguous(
                candidates.iter().map(InstallMethod::kind).collect(),
            )),
        }
    }
}

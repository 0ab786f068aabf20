use std::fs;
use std::path::Path;

/// Operating system families the catalog knows by name.
///
/// The catalog is keyed by target identifier strings, so every variant maps to
/// exactly one identifier via [`OperatingSystem::target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingSystem {
    MacOS,
    Ubuntu,
    /// Pop!_OS (Ubuntu-based)
    PopOS,
    Debian,
    Fedora,
    Arch,
    /// Linux distribution with an `ID=` we have no special handling for
    Other(String),
    /// Linux without a readable os-release file
    GenericLinux,
}

impl OperatingSystem {
    /// Detect the running operating system.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            return Self::MacOS;
        }

        let os_release_path = Path::new("/etc/os-release");
        match fs::read_to_string(os_release_path) {
            Ok(content) => Self::parse_os_release(&content),
            Err(_) => Self::GenericLinux,
        }
    }

    /// Parse os-release content
    fn parse_os_release(content: &str) -> Self {
        let id = content
            .lines()
            .find_map(|line| line.strip_prefix("ID="))
            .map(|val| val.trim().trim_matches('"').to_string());

        match id.as_deref() {
            Some("ubuntu") => Self::Ubuntu,
            Some("pop") => Self::PopOS,
            Some("debian") => Self::Debian,
            Some("fedora") => Self::Fedora,
            Some("arch") => Self::Arch,
            Some("") | None => Self::GenericLinux,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// The catalog key used to look up install methods for this OS.
    pub fn target(&self) -> &str {
        match self {
            Self::MacOS => "darwin",
            Self::Ubuntu => "ubuntu",
            Self::PopOS => "pop_os",
            Self::Debian => "debian",
            Self::Fedora => "fedora",
            Self::Arch => "arch",
            Self::Other(id) => id,
            Self::GenericLinux => "linux",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::MacOS => "macOS",
            Self::Ubuntu => "Ubuntu",
            Self::PopOS => "Pop!_OS",
            Self::Debian => "Debian",
            Self::Fedora => "Fedora",
            Self::Arch => "Arch Linux",
            Self::Other(_) | Self::GenericLinux => "Linux",
        }
    }
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(id) => write!(f, "Linux ({})", id),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Host facts shown before an install run.
#[derive(Debug, Clone)]
pub struct OsInfo {
    pub os: OperatingSystem,
    pub hostname: String,
    pub user: String,
}

impl OsInfo {
    pub fn detect() -> Self {
        let hostname = nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default();
        let user = std::env::var("USER").unwrap_or_default();

        Self {
            os: OperatingSystem::detect(),
            hostname,
            user,
        }
    }

    pub fn target(&self) -> &str {
        self.os.target()
    }
}

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const SAMPLE_CATALOG: &str = r#"{
    "_brew_taps": ["dlvhdr/formulae"],
    "ripgrep": {
        "description": "Fast grep",
        "packages": {
            "darwin": {"brew": "ripgrep"},
            "fedora": {"dnf": "ripgrep"},
            "ubuntu": {"apt": "ripgrep"}
        }
    },
    "gh-dash": {
        "description": "GitHub dashboard",
        "packages": {
            "darwin": {"gh_extension": "dlvhdr/gh-dash"},
            "fedora": {"gh_extension": "dlvhdr/gh-dash"}
        }
    },
    "ghostty": {
        "description": "Terminal emulator",
        "packages": {"darwin": {"cask": "ghostty"}}
    },
    "broken": "not an object",
    "double": {
        "description": "Two methods on one target",
        "packages": {"fedora": {"dnf": "x", "cargo": "x"}}
    }
}"#;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Isolated HOME and XDG directories plus a catalog source directory.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        for dir in ["home", "config", "data", "source"] {
            fs::create_dir_all(temp_dir.path().join(dir))?;
        }
        Ok(Self { temp_dir })
    }

    pub fn with_catalog(catalog: &str) -> Result<Self> {
        let env = Self::new()?;
        fs::write(env.source_dir().join("packages.json"), catalog)?;
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.path().join("source")
    }

    pub fn config_file(&self) -> PathBuf {
        self.path().join("config").join("dotinstall").join("config.toml")
    }

    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(env!("CARGO_BIN_EXE_dotinstall"))
            .args(args)
            .current_dir(self.path())
            .env("HOME", self.path().join("home"))
            .env("XDG_CONFIG_HOME", self.path().join("config"))
            .env("XDG_DATA_HOME", self.path().join("data"))
            .env("NO_COLOR", "1")
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Run with `--source` pointing at the environment's catalog.
    pub fn run_with_source(&self, args: &[&str]) -> Result<CommandOutput> {
        let source = self.source_dir();
        let source = source.to_string_lossy();
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--source", source.as_ref()]);
        self.run(&full)
    }
}

/// Parse every stdout line as a JSON event.
pub fn json_events(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("stdout line is JSON"))
        .collect()
}

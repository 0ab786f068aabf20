//! Per-package outcomes and the run summary.

use serde::Serialize;
use std::sync::Mutex;

use super::method::MethodKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// Present before the run
    AlreadyInstalled,
    Installed,
    Skipped,
    Failed,
}

impl InstallStatus {
    /// Short label used in tables and event codes.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyInstalled => "ok",
            Self::Installed => "done",
            Self::Skipped => "skip",
            Self::Failed => "fail",
        }
    }
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub name: String,
    /// `None` when the package has no method for the target
    pub method: Option<MethodKind>,
    pub status: InstallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstallResult {
    fn new(name: &str, method: Option<MethodKind>, status: InstallStatus, error: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            method,
            status,
            error,
        }
    }

    pub fn already_installed(name: &str, method: MethodKind) -> Self {
        Self::new(name, Some(method), InstallStatus::AlreadyInstalled, None)
    }

    pub fn installed(name: &str, method: MethodKind) -> Self {
        Self::new(name, Some(method), InstallStatus::Installed, None)
    }

    pub fn skipped(name: &str, method: Option<MethodKind>, reason: impl Into<String>) -> Self {
        Self::new(name, method, InstallStatus::Skipped, Some(reason.into()))
    }

    pub fn failed(name: &str, method: MethodKind, error: impl Into<String>) -> Self {
        Self::new(name, Some(method), InstallStatus::Failed, Some(error.into()))
    }

    /// Skip result for a package without a method on the target.
    pub fn no_method(name: &str, target: &str) -> Self {
        Self::skipped(name, None, format!("no install method for {}", target))
    }
}

/// Results recorded by concurrent workers, in completion order.
#[derive(Debug, Default)]
pub struct ResultLog {
    results: Mutex<Vec<InstallResult>>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: InstallResult) {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }

    pub fn into_results(self) -> Vec<InstallResult> {
        self.results.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub installed: usize,
    pub already_installed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_packages: Vec<String>,
}

impl Summary {
    pub fn from_results(results: &[InstallResult]) -> Self {
        let mut summary = Summary::default();
        for result in results {
            match result.status {
                InstallStatus::Installed => summary.installed += 1,
                InstallStatus::AlreadyInstalled => summary.already_installed += 1,
                InstallStatus::Skipped => summary.skipped += 1,
                InstallStatus::Failed => {
                    summary.failed += 1;
                    summary.failed_packages.push(result.name.clone());
                }
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.installed + self.already_installed + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let results = vec![
            InstallResult::installed("ripgrep", MethodKind::Brew),
            InstallResult::already_installed("git", MethodKind::Brew),
            InstallResult::failed("zebar", MethodKind::Manual, "no .app bundle in image"),
            InstallResult::no_method("podman", "darwin"),
            InstallResult::failed("gama", MethodKind::GhExtension, "boom"),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.installed, 1);
        assert_eq!(summary.already_installed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failed_packages, vec!["zebar", "gama"]);
        assert_eq!(summary.total(), results.len());
        assert!(summary.has_failures());
    }

    #[test]
    fn test_result_log_keeps_order() {
        let log = ResultLog::new();
        log.record(InstallResult::installed("b", MethodKind::Cargo));
        log.record(InstallResult::installed("a", MethodKind::Cargo));
        let names: Vec<String> = log.into_results().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_result_json() {
        let json = serde_json::to_value(InstallResult::no_method("podman", "darwin")).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["method"], serde_json::Value::Null);
        assert_eq!(json["error"], "no install method for darwin");
    }
}

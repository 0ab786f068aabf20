//! Terminal rendering for setup commands.

use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use indicatif::ProgressBar;
use serde_json::json;

use crate::common::package::{
    InstallObserver, InstallResult, InstallStatus, MethodKind, Phase, Summary,
};
use crate::common::process::CommandError;
use crate::common::progress::create_spinner;
use crate::ui::prelude::*;

pub fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h)));
    if !crate::ui::color_enabled() {
        table.force_no_tty();
    }
    table
}

pub fn status_cell(status: InstallStatus) -> Cell {
    let cell = Cell::new(status.label());
    match status {
        InstallStatus::AlreadyInstalled => cell.fg(Color::Blue),
        InstallStatus::Installed => cell.fg(Color::Green),
        InstallStatus::Skipped => cell.fg(Color::Yellow),
        InstallStatus::Failed => cell.fg(Color::Red),
    }
}

fn status_level(status: InstallStatus) -> Level {
    match status {
        InstallStatus::AlreadyInstalled => Level::Info,
        InstallStatus::Installed => Level::Success,
        InstallStatus::Skipped => Level::Warn,
        InstallStatus::Failed => Level::Error,
    }
}

fn status_glyph(status: InstallStatus) -> &'static str {
    match status {
        InstallStatus::AlreadyInstalled => "✓",
        InstallStatus::Installed => "+",
        InstallStatus::Skipped => "-",
        InstallStatus::Failed => "✗",
    }
}

pub fn method_label(method: Option<MethodKind>) -> &'static str {
    method.map(|m| m.as_str()).unwrap_or("n/a")
}

/// One line per result, printed as results arrive.
pub fn result_line(result: &InstallResult) -> String {
    let mut line = format!(
        "  {} {} {}",
        status_glyph(result.status),
        result.name,
        format!("({})", method_label(result.method)).dimmed()
    );
    if let Some(detail) = &result.error {
        line.push_str(&format!(" {}", detail.dimmed()));
    }
    line
}

/// Renders run progress: a spinner in text mode, events in JSON mode.
pub struct CliObserver {
    spinner: ProgressBar,
}

impl CliObserver {
    pub fn new() -> Self {
        Self {
            spinner: create_spinner("Preparing install"),
        }
    }

    fn say(&self, level: Level, code: &str, message: &str, data: Option<serde_json::Value>) {
        self.spinner.suspend(|| emit(level, code, message, data));
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl InstallObserver for CliObserver {
    fn phase_started(&self, phase: Phase, count: usize) {
        self.spinner.suspend(|| section(phase.title()));
        self.spinner
            .set_message(format!("{} ({} packages)", phase.title(), count));
    }

    fn batch_started(&self, kind: MethodKind, count: usize) {
        self.spinner
            .set_message(format!("Installing {} {} packages", count, kind));
        self.say(
            Level::Debug,
            "install.batch",
            &format!("Installing {} {} packages", count, kind),
            None,
        );
    }

    fn tap_finished(&self, tap: &str, outcome: Result<(), &CommandError>) {
        match outcome {
            Ok(()) => self.say(
                Level::Success,
                "install.tap",
                &format!("  ✓ {}", tap),
                Some(json!({ "tap": tap, "ok": true })),
            ),
            Err(err) => self.say(
                Level::Error,
                "install.tap",
                &format!("  ✗ {} {}", tap, err.to_string().dimmed()),
                Some(json!({ "tap": tap, "ok": false, "error": err.to_string() })),
            ),
        }
    }

    fn package_finished(&self, result: &InstallResult) {
        self.say(
            status_level(result.status),
            &format!("install.{}", result.status.label()),
            &result_line(result),
            serde_json::to_value(result).ok(),
        );
    }
}

/// Counts plus every result that needs attention.
pub fn print_summary(results: &[InstallResult], summary: &Summary) {
    if matches!(get_output_format(), OutputFormat::Json) {
        emit(
            Level::Info,
            "install.summary",
            "Install summary",
            Some(json!({ "summary": summary, "results": results })),
        );
        return;
    }

    section("Summary");
    let mut counts = new_table(&["Status", "Packages"]);
    for (status, count) in [
        (InstallStatus::Installed, summary.installed),
        (InstallStatus::AlreadyInstalled, summary.already_installed),
        (InstallStatus::Skipped, summary.skipped),
        (InstallStatus::Failed, summary.failed),
    ] {
        counts.add_row(vec![status_cell(status), Cell::new(count)]);
    }
    println!("{counts}");

    let attention: Vec<&InstallResult> = results
        .iter()
        .filter(|r| matches!(r.status, InstallStatus::Failed | InstallStatus::Skipped))
        .collect();
    if attention.is_empty() {
        return;
    }

    let mut details = new_table(&["Package", "Method", "Status", "Detail"]);
    for result in attention {
        details.add_row(vec![
            Cell::new(&result.name),
            Cell::new(method_label(result.method)),
            status_cell(result.status),
            Cell::new(result.error.as_deref().unwrap_or_default()),
        ]);
    }
    println!("{details}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_line_mentions_method_and_detail() {
        colored::control::set_override(false);
        let line = result_line(&InstallResult::failed("zebar", MethodKind::Manual, "no .app"));
        assert_eq!(line, "  ✗ zebar (manual) no .app");

        let line = result_line(&InstallResult::no_method("podman", "darwin"));
        assert_eq!(line, "  - podman (n/a) no install method for darwin");
    }
}

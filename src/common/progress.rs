use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::prelude::*;

/// Spinner for long-running steps. Hidden in JSON mode so stdout stays parseable.
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    if matches!(get_output_format(), OutputFormat::Json) {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        pb.set_style(style.tick_chars("⠁⠉⠙⠚⠒⠂⠒⠲⠴⠤⠄⠤⠦⠖⠒⠐⠒⠓⠋✓"));
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}


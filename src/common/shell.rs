//! Shell utility functions
//!
//! Quoting for displaying command lines, and the `~`/`$VAR` expansion catalog
//! paths rely on.

use std::path::PathBuf;

/// Escape a string for use in a shell command
///
/// This function quotes the string only if necessary (i.e., if it contains characters
/// that have special meaning in the shell). It uses single quotes for safety.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars().all(|c| {
        c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '+' | '@')
    }) {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Join a program and its arguments into a copy-pasteable command line.
pub fn join_command<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(shell_quote(program))
        .chain(args.iter().map(|a| shell_quote(a.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand `~`, `$VAR`, `${VAR}` and `${VAR:-default}` in a path.
///
/// Undefined variables leave the path with only `~` expanded rather than
/// failing, matching what `echo` would print for an unset variable minus the
/// empty substitution.
pub fn expand_path(input: &str) -> PathBuf {
    let trimmed = input.trim();
    match shellexpand::full(trimmed) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(trimmed).into_owned()),
    }
}

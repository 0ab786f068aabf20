mod common;

use anyhow::Result;
use common::{SAMPLE_CATALOG, TestEnvironment, json_events};

#[test]
fn test_list_groups_packages_for_target() -> Result<()> {
    let env = TestEnvironment::with_catalog(SAMPLE_CATALOG)?;

    let output = env.run_with_source(&["list", "--target", "darwin"])?;
    assert_eq!(output.exit_code, 0, "list failed: {}", output.stderr);
    assert!(output.stdout.contains("System Tools"));
    assert!(output.stdout.contains("Terminal Tools"));
    assert!(output.stdout.contains("ghostty"));
    assert!(output.stdout.contains("3 packages for darwin"));

    let output = env.run_with_source(&["list", "--target", "fedora"])?;
    assert_eq!(output.exit_code, 0);
    assert!(!output.stdout.contains("ghostty"));
    assert!(output.stdout.contains("2 packages for fedora"));
    Ok(())
}

#[test]
fn test_malformed_entries_are_reported_on_stderr() -> Result<()> {
    let env = TestEnvironment::with_catalog(SAMPLE_CATALOG)?;

    let output = env.run_with_source(&["list", "--target", "fedora"])?;
    assert_eq!(output.exit_code, 0);
    assert!(output.stderr.contains("broken"), "stderr: {}", output.stderr);
    assert!(output.stderr.contains("double [fedora]"), "stderr: {}", output.stderr);
    assert!(!output.stdout.contains("double"));
    Ok(())
}

#[test]
fn test_list_json_output_is_parseable() -> Result<()> {
    let env = TestEnvironment::with_catalog(SAMPLE_CATALOG)?;

    let output = env.run_with_source(&["list", "--target", "fedora", "--output", "json"])?;
    assert_eq!(output.exit_code, 0, "list failed: {}", output.stderr);

    let events = json_events(&output.stdout);
    let listing = events
        .iter()
        .find(|e| e["code"] == "list.catalog")
        .expect("list.catalog event");
    assert_eq!(listing["data"]["target"], "fedora");

    let names: Vec<&str> = listing["data"]["categories"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|c| c["packages"].as_array().unwrap())
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"ripgrep"));
    assert!(names.contains(&"gh-dash"));
    Ok(())
}

#[test]
fn test_missing_catalog_fails() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = env.run_with_source(&["list", "--target", "fedora"])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("packages.json"), "stderr: {}", output.stderr);
    Ok(())
}

#[test]
fn test_first_run_writes_default_config() -> Result<()> {
    let env = TestEnvironment::with_catalog(SAMPLE_CATALOG)?;
    assert!(!env.config_file().exists());

    let output = env.run_with_source(&["list", "--target", "darwin"])?;
    assert_eq!(output.exit_code, 0);

    let config = std::fs::read_to_string(env.config_file())?;
    assert!(config.contains("workers = 4"));
    Ok(())
}

#[test]
fn test_install_without_methods_skips_everything() -> Result<()> {
    let env = TestEnvironment::with_catalog(SAMPLE_CATALOG)?;

    let output = env.run_with_source(&[
        "install", "--yes", "--target", "plan9", "--output", "json", "ripgrep", "ghostty",
    ])?;
    assert_eq!(output.exit_code, 0, "install failed: {}", output.stderr);

    let events = json_events(&output.stdout);
    let summary = events
        .iter()
        .find(|e| e["code"] == "install.summary")
        .expect("install.summary event");
    assert_eq!(summary["data"]["summary"]["skipped"], 2);
    assert_eq!(summary["data"]["summary"]["failed"], 0);
    Ok(())
}

#[test]
fn test_target_override() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = env.run(&["target", "--target", "ubuntu", "--output", "json"])?;
    assert_eq!(output.exit_code, 0);
    let events = json_events(&output.stdout);
    assert_eq!(events[0]["code"], "target.detected");
    assert_eq!(events[0]["data"]["target"], "ubuntu");
    Ok(())
}

#[test]
fn test_completions_generate() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = env.run(&["completions", "generate", "zsh"])?;
    assert_eq!(output.exit_code, 0);
    assert!(output.stdout.contains("#compdef dotinstall"));
    Ok(())
}

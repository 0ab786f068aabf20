//! Setup command implementations

use anyhow::{Context, Result, anyhow};
use colored::*;
use comfy_table::{Cell, Color};
use dialoguer::Confirm;
use serde_json::json;
use std::io::IsTerminal;
use std::sync::Arc;

use super::render::{CliObserver, method_label, new_table, print_summary, status_cell};
use super::{CatalogArgs, InstallArgs, SelectionArgs};
use crate::common::config::InstallerConfig;
use crate::common::distro::OsInfo;
use crate::common::package::{
    HttpFetcher, InstallSettings, InstallStatus, Installer, Package, PackageCatalog, Scheduler,
    Summary, categorize,
};
use crate::common::paths::resolve_catalog_path;
use crate::common::process::SystemRunner;
use crate::common::progress::create_spinner;
use crate::ui::prelude::*;

/// Exit code after Ctrl-C
const INTERRUPTED_EXIT_CODE: i32 = 130;

struct SetupContext {
    config: InstallerConfig,
    catalog: PackageCatalog,
    target: String,
}

impl SetupContext {
    fn load(args: &CatalogArgs) -> Result<Self> {
        let config = InstallerConfig::load()?;
        let path = resolve_catalog_path(args.source.as_deref(), config.catalog_path().as_deref());
        let catalog = PackageCatalog::load(&path)
            .with_context(|| format!("loading package catalog {}", path.display()))?;

        for skipped in catalog.skipped_entries() {
            emit(
                Level::Warn,
                "catalog.entry_skipped",
                &format!("Skipping malformed entry: {}", skipped),
                Some(json!({
                    "package": skipped.package,
                    "target": skipped.target,
                    "reason": skipped.reason,
                })),
            );
        }
        emit(
            Level::Debug,
            "catalog.loaded",
            &format!(
                "Loaded {} packages from {}",
                catalog.packages.len(),
                path.display()
            ),
            None,
        );

        let target = match &args.target {
            Some(target) => target.clone(),
            None => OsInfo::detect().target().to_string(),
        };

        Ok(Self {
            config,
            catalog,
            target,
        })
    }

    /// Named packages, or every package for the target when none are named.
    fn select(&self, names: &[String]) -> Vec<&Package> {
        if names.is_empty() {
            return self.catalog.filter_for_target(&self.target);
        }

        let mut selected: Vec<&Package> = Vec::with_capacity(names.len());
        for name in names {
            match self.catalog.get(name) {
                Some(pkg) if !selected.iter().any(|p| p.name == pkg.name) => selected.push(pkg),
                Some(_) => {}
                None => emit(
                    Level::Warn,
                    "setup.unknown_package",
                    &format!("Unknown package '{}' is not in the catalog", name),
                    Some(json!({ "package": name })),
                ),
            }
        }
        selected
    }

    fn installer(&self) -> Result<Installer> {
        let runner = Arc::new(SystemRunner::new(self.config.command_timeout()));
        let fetcher = Arc::new(HttpFetcher::new(self.config.command_timeout()).context("setting up GitHub client")?);
        Ok(Installer::new(
            runner,
            fetcher,
            InstallSettings::from_config(&self.config),
            self.target.clone(),
        ))
    }
}

pub fn handle_list(args: &CatalogArgs) -> Result<i32> {
    let ctx = SetupContext::load(args)?;
    let packages = ctx.catalog.filter_for_target(&ctx.target);
    let categories = categorize(packages.iter().copied());

    if matches!(get_output_format(), OutputFormat::Json) {
        let mut data = Vec::with_capacity(categories.len());
        for category in &categories {
            let entries: Vec<_> = category
                .packages
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "description": p.description,
                        "method": p.method_for(&ctx.target).map(|m| m.kind()),
                    })
                })
                .collect();
            data.push(json!({ "category": category.name, "packages": entries }));
        }
        emit(
            Level::Info,
            "list.catalog",
            &format!("{} packages for {}", packages.len(), ctx.target),
            Some(json!({ "target": ctx.target, "categories": data })),
        );
        return Ok(0);
    }

    for category in &categories {
        section(category.name);
        let mut table = new_table(&["Package", "Method", "Description"]);
        for pkg in &category.packages {
            let method = pkg
                .method_for(&ctx.target)
                .map(|m| m.describe())
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(&pkg.name),
                Cell::new(method),
                Cell::new(&pkg.description),
            ]);
        }
        println!("{table}");
    }
    println!();
    println!("{} packages for {}", packages.len(), ctx.target.bold());
    Ok(0)
}

pub async fn handle_status(args: &SelectionArgs) -> Result<i32> {
    let ctx = SetupContext::load(&args.catalog)?;
    let packages = ctx.select(&args.packages);
    let installer = ctx.installer()?;

    let spinner = create_spinner("Checking installed packages");
    let mut rows = Vec::with_capacity(packages.len());
    for pkg in &packages {
        let method = installer.resolve(pkg).map(|r| r.kind);
        let installed = installer.detect(pkg).await;
        rows.push((pkg.name.as_str(), method, installed));
    }
    spinner.finish_and_clear();

    if matches!(get_output_format(), OutputFormat::Json) {
        for (name, method, installed) in &rows {
            emit(
                Level::Info,
                "status.package",
                name,
                Some(json!({ "name": name, "method": method, "installed": installed })),
            );
        }
        return Ok(0);
    }

    let mut table = new_table(&["Package", "Method", "Status"]);
    for (name, method, installed) in &rows {
        let status = match installed {
            Some(true) => Cell::new("installed").fg(Color::Green),
            Some(false) => Cell::new("missing").fg(Color::Yellow),
            None => Cell::new("unsupported").fg(Color::DarkGrey),
        };
        table.add_row(vec![Cell::new(name), Cell::new(method_label(*method)), status]);
    }
    println!("{table}");

    let missing = rows.iter().filter(|(_, _, i)| *i == Some(false)).count();
    println!("{} of {} packages missing on {}", missing, rows.len(), ctx.target.bold());
    Ok(0)
}

pub async fn handle_plan(args: &SelectionArgs) -> Result<i32> {
    let ctx = SetupContext::load(&args.catalog)?;
    let packages = ctx.select(&args.packages);
    let installer = Arc::new(ctx.installer()?);
    let scheduler = Scheduler::new(installer.clone(), ctx.config.workers);

    let spinner = create_spinner("Checking installed packages");
    let plan = scheduler.plan(&packages, &ctx.catalog.brew_taps).await;
    let mut secondary = Vec::with_capacity(plan.secondary.len());
    for pkg in &plan.secondary {
        let Some(resolved) = installer.resolve(pkg) else {
            continue;
        };
        let installed = installer.is_installed(&pkg.name, resolved.method).await;
        secondary.push((*pkg, resolved.kind, installed, installer.planned_action(resolved.method)));
    }
    spinner.finish_and_clear();

    let batches = plan.batch.commands(&installer);

    if matches!(get_output_format(), OutputFormat::Json) {
        let batch_data: Vec<_> = batches
            .iter()
            .map(|(kind, cmds)| {
                let lines: Vec<String> = cmds.iter().map(|c| c.command_line()).collect();
                json!({ "method": kind, "commands": lines })
            })
            .collect();
        let secondary_data: Vec<_> = secondary
            .iter()
            .map(|(pkg, kind, installed, action)| {
                json!({
                    "name": pkg.name,
                    "method": kind,
                    "installed": installed,
                    "action": action,
                })
            })
            .collect();
        emit(
            Level::Info,
            "plan.summary",
            &format!("Install plan for {}", ctx.target),
            Some(json!({
                "target": ctx.target,
                "taps": plan.taps,
                "settled": plan.settled,
                "batches": batch_data,
                "secondary": secondary_data,
                "workers": scheduler.workers(),
            })),
        );
        return Ok(0);
    }

    if !plan.taps.is_empty() {
        section("Homebrew Taps");
        for tap in &plan.taps {
            println!("  brew tap {}", tap);
        }
    }

    section("System Packages");
    for result in &plan.settled {
        println!(
            "  {} {} {}",
            result.status.label(),
            result.name,
            result.error.as_deref().unwrap_or_default().dimmed()
        );
    }
    if plan.batch.is_empty() {
        println!("  {}", "nothing to install".dimmed());
    }
    for (_, commands) in &batches {
        for cmd in commands {
            println!("  $ {}", cmd);
        }
    }

    section(&format!("Secondary Packages ({} workers)", scheduler.workers()));
    let mut table = new_table(&["Package", "Method", "Status", "Action"]);
    for (pkg, kind, installed, action) in &secondary {
        let (status, action) = if *installed {
            (status_cell(InstallStatus::AlreadyInstalled), "")
        } else {
            (Cell::new("pending").fg(Color::Yellow), action.as_str())
        };
        table.add_row(vec![
            Cell::new(&pkg.name),
            Cell::new(kind.as_str()),
            status,
            Cell::new(action),
        ]);
    }
    println!("{table}");
    Ok(0)
}

/// Completes on Ctrl-C. Never completes when the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn confirm_install(count: usize, target: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes || matches!(get_output_format(), OutputFormat::Json) {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow!(
            "refusing to install without confirmation; pass --yes in non-interactive shells"
        ));
    }
    Confirm::new()
        .with_prompt(format!("Install {} packages for {}?", count, target))
        .default(true)
        .interact()
        .context("reading confirmation")
}

pub async fn handle_install(args: &InstallArgs) -> Result<i32> {
    let ctx = SetupContext::load(&args.selection.catalog)?;
    let packages = ctx.select(&args.selection.packages);
    if packages.is_empty() {
        emit(
            Level::Info,
            "install.nothing",
            &format!("No packages to install for {}", ctx.target),
            None,
        );
        return Ok(0);
    }

    let os = OsInfo::detect();
    emit(
        Level::Info,
        "install.host",
        &format!(
            "{} on {} ({}@{})",
            ctx.target.bold(),
            os.os,
            os.user,
            os.hostname
        ),
        Some(json!({ "target": ctx.target, "user": os.user, "hostname": os.hostname })),
    );

    if !confirm_install(packages.len(), &ctx.target, args.yes)? {
        emit(Level::Warn, "install.cancelled", "Install cancelled", None);
        return Ok(0);
    }

    let workers = args.workers.unwrap_or(ctx.config.workers);
    let scheduler = Scheduler::new(Arc::new(ctx.installer()?), workers);
    let observer = Arc::new(CliObserver::new());

    let outcome = scheduler
        .run(&packages, &ctx.catalog.brew_taps, observer.clone(), interrupted())
        .await;
    observer.finish();
    let Ok(results) = outcome else {
        emit(
            Level::Warn,
            "install.interrupted",
            "Interrupted, running installs were stopped",
            None,
        );
        return Ok(INTERRUPTED_EXIT_CODE);
    };

    let summary = Summary::from_results(&results);
    print_summary(&results, &summary);
    Ok(if summary.has_failures() { 1 } else { 0 })
}

pub fn handle_target(args: &CatalogArgs) -> Result<i32> {
    let os = OsInfo::detect();
    let target = args
        .target
        .clone()
        .unwrap_or_else(|| os.target().to_string());

    if matches!(get_output_format(), OutputFormat::Json) {
        emit(
            Level::Info,
            "target.detected",
            &target,
            Some(json!({
                "target": target,
                "os": os.os.to_string(),
                "user": os.user,
                "hostname": os.hostname,
            })),
        );
        return Ok(0);
    }

    println!("{}", target.bold());
    println!("  OS:   {}", os.os);
    println!("  User: {}@{}", os.user, os.hostname);
    Ok(0)
}

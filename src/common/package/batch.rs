//! Batched package installation.
//!
//! Native package managers install every pending package of one kind in a
//! single invocation, which keeps sudo prompts and index locks to one per kind.

use std::collections::BTreeMap;

use super::catalog::Package;
use super::dispatch::Installer;
use super::method::MethodKind;
use super::report::InstallResult;
use super::scheduler::InstallObserver;
use crate::common::process::{CommandError, CommandSpec};
use crate::ui::prelude::*;

/// `dnf check-update` exits with 100 when updates are available
const DNF_UPDATES_AVAILABLE: i32 = 100;

/// A package waiting in a native batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchEntry<'a> {
    pub package: &'a Package,
    pub specifier: &'a str,
}

/// Pending native installs grouped by kind, iterated in priority order.
#[derive(Debug, Default)]
pub struct InstallBatch<'a> {
    batches: BTreeMap<MethodKind, Vec<BatchEntry<'a>>>,
}

/// Command refreshing the package index before installs of `kind`.
pub fn refresh_command(kind: MethodKind) -> Option<CommandSpec> {
    match kind {
        MethodKind::Apt => Some(CommandSpec::sudo("apt").arg("update")),
        MethodKind::Dnf => Some(CommandSpec::sudo("dnf").arg("check-update")),
        _ => None,
    }
}

impl<'a> InstallBatch<'a> {
    pub fn add(&mut self, kind: MethodKind, package: &'a Package, specifier: &'a str) {
        self.batches
            .entry(kind)
            .or_default()
            .push(BatchEntry { package, specifier });
    }

    pub fn is_empty(&self) -> bool {
        self.batches.values().all(|v| v.is_empty())
    }

    pub fn package_count(&self) -> usize {
        self.batches.values().map(|v| v.len()).sum()
    }

    /// Kinds with pending entries, in priority order.
    pub fn kinds(&self) -> impl Iterator<Item = (MethodKind, &[BatchEntry<'a>])> {
        self.batches
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(kind, entries)| (*kind, entries.as_slice()))
    }

    /// Every command the batch would run, per kind, in order.
    pub fn commands(&self, installer: &Installer) -> Vec<(MethodKind, Vec<CommandSpec>)> {
        self.kinds()
            .map(|(kind, entries)| {
                let specs: Vec<&str> = entries.iter().map(|e| e.specifier).collect();
                let commands = refresh_command(kind)
                    .into_iter()
                    .chain(installer.batch_install_command(kind, &specs))
                    .collect();
                (kind, commands)
            })
            .collect()
    }

    /// Run one install per kind.
    ///
    /// A failed invocation fails every package of that kind and moves on to
    /// the next kind.
    pub async fn execute(
        &self,
        installer: &Installer,
        observer: &dyn InstallObserver,
    ) -> Vec<InstallResult> {
        let mut results = Vec::with_capacity(self.package_count());

        for (kind, entries) in self.kinds() {
            observer.batch_started(kind, entries.len());

            if let Some(refresh) = refresh_command(kind) {
                refresh_index(installer, kind, &refresh).await;
            }

            let specs: Vec<&str> = entries.iter().map(|e| e.specifier).collect();
            let Some(cmd) = installer.batch_install_command(kind, &specs) else {
                continue;
            };

            let outcome = installer.runner().run(&cmd).await;
            if let Err(err) = &outcome {
                emit(
                    Level::Debug,
                    "install.batch_failed",
                    &format!("{} batch failed: {}", kind, err),
                    None,
                );
            }

            for entry in entries {
                let result = match &outcome {
                    Ok(_) => InstallResult::installed(&entry.package.name, kind),
                    Err(err) => InstallResult::failed(&entry.package.name, kind, err.to_string()),
                };
                observer.package_finished(&result);
                results.push(result);
            }
        }

        results
    }
}

async fn refresh_index(installer: &Installer, kind: MethodKind, cmd: &CommandSpec) {
    let outcome = match installer.runner().output(cmd).await {
        Ok(out) if out.success() => Ok(()),
        Ok(out) if kind == MethodKind::Dnf && out.code == Some(DNF_UPDATES_AVAILABLE) => Ok(()),
        Ok(out) => Err(CommandError::failed(cmd, &out)),
        Err(err) => Err(err),
    };
    if let Err(err) = outcome {
        emit(
            Level::Warn,
            "install.refresh_failed",
            &format!("Refreshing the {} index failed, installing anyway: {}", kind, err),
            None,
        );
    }
}

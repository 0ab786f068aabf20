//! Install scheduling.
//!
//! A run has three phases. Homebrew taps are applied first. Native packages
//! then go through [`InstallBatch`] one kind at a time. Everything else is
//! installed by a bounded worker pool, one task per package.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::batch::InstallBatch;
use super::catalog::Package;
use super::dispatch::Installer;
use super::method::MethodKind;
use super::report::{InstallResult, ResultLog};
use crate::common::process::{CommandError, CommandSpec};
use crate::ui::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Taps,
    SystemPackages,
    SecondaryPackages,
}

impl Phase {
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Taps => "Homebrew Taps",
            Phase::SystemPackages => "System Packages",
            Phase::SecondaryPackages => "Secondary Packages",
        }
    }
}

/// Receives progress while a run is in flight.
///
/// `package_finished` is called from worker tasks concurrently.
pub trait InstallObserver: Send + Sync {
    fn phase_started(&self, _phase: Phase, _count: usize) {}
    fn batch_started(&self, _kind: MethodKind, _count: usize) {}
    fn tap_finished(&self, _tap: &str, _outcome: Result<(), &CommandError>) {}
    fn package_finished(&self, _result: &InstallResult) {}
}

/// The run was stopped by its shutdown signal. Every worker has been dropped
/// by the time this is returned, killing any child it was waiting on.
#[derive(Debug, Error)]
#[error("install run interrupted")]
pub struct Interrupted;

/// What a run will do, after native detection.
#[derive(Debug, Default)]
pub struct InstallPlan<'a> {
    /// Taps to apply before the native lane
    pub taps: Vec<&'a str>,
    /// Results settled during planning: already installed or no method
    pub settled: Vec<InstallResult>,
    pub batch: InstallBatch<'a>,
    /// Non-native packages, detected by their worker
    pub secondary: Vec<&'a Package>,
}

pub struct Scheduler {
    installer: Arc<Installer>,
    workers: usize,
}

impl Scheduler {
    pub fn new(installer: Arc<Installer>, workers: usize) -> Self {
        Self {
            installer,
            workers: workers.max(1),
        }
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Taps are needed when any selected package installs through Homebrew
    /// and brew itself is available.
    pub fn taps_needed<'a>(&self, packages: &[&Package], taps: &'a [String]) -> Vec<&'a str> {
        let wants_brew = packages.iter().any(|pkg| {
            self.installer
                .resolve(pkg)
                .is_some_and(|r| r.kind.is_brew_family())
        });
        if taps.is_empty() || !wants_brew || !self.installer.runner().command_exists("brew") {
            return Vec::new();
        }
        taps.iter().map(String::as_str).collect()
    }

    /// Split packages into lanes, detecting native packages on the way.
    pub async fn plan<'a>(&self, packages: &[&'a Package], taps: &'a [String]) -> InstallPlan<'a> {
        let mut plan = InstallPlan {
            taps: self.taps_needed(packages, taps),
            ..Default::default()
        };

        for &pkg in packages {
            let Some(resolved) = self.installer.resolve(pkg) else {
                plan.settled
                    .push(InstallResult::no_method(&pkg.name, self.installer.target()));
                continue;
            };
            if !resolved.kind.is_system() {
                plan.secondary.push(pkg);
                continue;
            }
            if self.installer.is_installed(&pkg.name, resolved.method).await {
                plan.settled
                    .push(InstallResult::already_installed(&pkg.name, resolved.kind));
                continue;
            }
            if let Some(specifier) = resolved.method.specifier() {
                plan.batch.add(resolved.kind, pkg, specifier);
            }
        }

        plan
    }

    /// Install `packages`, returning one result per package.
    ///
    /// When `shutdown` completes first the run stops, waiting for aborted
    /// workers to be dropped before returning [`Interrupted`].
    pub async fn run<'a, F>(
        &self,
        packages: &[&'a Package],
        taps: &[String],
        observer: Arc<dyn InstallObserver>,
        shutdown: F,
    ) -> Result<Vec<InstallResult>, Interrupted>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let (mut results, secondary) = tokio::select! {
            native = self.run_native(packages, taps, observer.as_ref()) => native,
            _ = &mut shutdown => return Err(Interrupted),
        };

        if !secondary.is_empty() {
            observer.phase_started(Phase::SecondaryPackages, secondary.len());
            results.extend(self.run_secondary(&secondary, observer, shutdown).await?);
        }

        Ok(results)
    }

    /// Taps, detection and the batched lane. Returns the settled and batch
    /// results plus the packages left for the pool.
    async fn run_native<'a>(
        &self,
        packages: &[&'a Package],
        taps: &[String],
        observer: &dyn InstallObserver,
    ) -> (Vec<InstallResult>, Vec<&'a Package>) {
        let pending_taps = self.taps_needed(packages, taps);
        if !pending_taps.is_empty() {
            observer.phase_started(Phase::Taps, pending_taps.len());
            self.apply_taps(&pending_taps, observer).await;
        }

        // Detection runs after tapping so tapped formulae are visible
        let plan = self.plan(packages, &[]).await;
        let mut results = Vec::with_capacity(packages.len());

        let native_count = plan.batch.package_count()
            + plan
                .settled
                .iter()
                .filter(|r| r.method.is_some_and(|m| m.is_system()))
                .count();
        if native_count > 0 {
            observer.phase_started(Phase::SystemPackages, native_count);
        }
        for result in plan.settled {
            observer.package_finished(&result);
            results.push(result);
        }
        results.extend(plan.batch.execute(&self.installer, observer).await);

        (results, plan.secondary)
    }

    async fn apply_taps(&self, taps: &[&str], observer: &dyn InstallObserver) {
        for tap in taps {
            let cmd = CommandSpec::new("brew").arg("tap").arg(*tap);
            match self.installer.runner().run(&cmd).await {
                Ok(_) => observer.tap_finished(tap, Ok(())),
                Err(err) => observer.tap_finished(tap, Err(&err)),
            }
        }
    }

    /// Detect-then-install each package on a pool of `workers` tasks.
    async fn run_secondary<F>(
        &self,
        packages: &[&Package],
        observer: Arc<dyn InstallObserver>,
        shutdown: F,
    ) -> Result<Vec<InstallResult>, Interrupted>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let permits = Arc::new(Semaphore::new(self.workers));
        let log = Arc::new(ResultLog::new());
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();

        for &pkg in packages {
            let package = pkg.clone();
            let installer = self.installer.clone();
            let permits = permits.clone();
            let log = log.clone();
            let observer = observer.clone();

            let kind = installer.resolve(pkg).map(|r| r.kind).unwrap_or(MethodKind::Manual);
            let handle = tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let result = installer.install(&package).await;
                observer.package_finished(&result);
                log.record(result);
            });
            owners.insert(handle.id(), (pkg.name.clone(), kind));
        }

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let Err(err) = joined else {
                        continue;
                    };
                    let Some((name, kind)) = owners.remove(&err.id()) else {
                        continue;
                    };
                    emit(
                        Level::Error,
                        "install.worker_failed",
                        &format!("Install task for {} did not finish: {}", name, err),
                        None,
                    );
                    let result = InstallResult::failed(&name, kind, "install task aborted");
                    observer.package_finished(&result);
                    log.record(result);
                }
                _ = &mut shutdown => {
                    tasks.shutdown().await;
                    return Err(Interrupted);
                }
            }
        }

        Ok(match Arc::try_unwrap(log) {
            Ok(log) => log.into_results(),
            Err(_) => Vec::new(),
        })
    }
}

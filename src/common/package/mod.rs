//! Package resolution, detection and installation engine.
//!
//! # Architecture
//!
//! - [`PackageCatalog`]: the parsed `packages.json`, one [`Package`] per entry
//! - [`InstallMethod`](method::InstallMethod): how a package installs on one platform target
//! - [`DetectionCache`](detect::DetectionCache): installed sets per [`MethodKind`], enumerated once per run
//! - [`Installer`]: detects and installs a single package
//! - [`Scheduler`]: runs taps, the batched native lane and the worker pool
//!
//! # Lanes
//!
//! Native managers (brew, cask, apt, dnf) install in one invocation per kind,
//! sequentially and in that order. Every other method runs as its own task on
//! a bounded pool, 4 workers by default.
//!
//! # Example
//!
//! ```ignore
//! let catalog = PackageCatalog::load(&path)?;
//! let installer = Installer::new(runner, fetcher, settings, "fedora");
//! let scheduler = Scheduler::new(Arc::new(installer), 4);
//! let packages = catalog.filter_for_target("fedora");
//! // `shutdown` is any future; the run stops when it completes
//! let results = scheduler
//!     .run(&packages, &catalog.brew_taps, observer, shutdown)
//!     .await?;
//! let summary = Summary::from_results(&results);
//! ```

mod batch;
mod catalog;
mod category;
mod detect;
mod dispatch;
mod manual;
mod method;
mod release;
mod report;
mod resolve;
mod scheduler;

#[cfg(test)]
mod testing;

pub use catalog::{Package, PackageCatalog};
pub use category::categorize;
pub use dispatch::{InstallSettings, Installer};
pub use method::MethodKind;
pub use release::HttpFetcher;
pub use report::{InstallResult, InstallStatus, Summary};
pub use scheduler::{InstallObserver, Phase, Scheduler};

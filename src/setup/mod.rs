//! Package setup commands.
//!
//! `list`, `status`, `plan` and `install` all load the catalog the same way
//! and act on the packages selected for one platform target.

mod commands;
mod render;

use clap::Args;
use std::path::PathBuf;

pub use commands::{handle_install, handle_list, handle_plan, handle_status, handle_target};

/// Where the catalog comes from and which platform it is read for.
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// Directory containing packages.json (defaults to the configured catalog,
    /// ./packages.json, then the chezmoi source directory)
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Platform target to use instead of the detected one (darwin, ubuntu, fedora, ...)
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Only these packages (defaults to every package for the target)
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Size of the worker pool for non-native installs
    #[arg(short, long)]
    pub workers: Option<usize>,
}

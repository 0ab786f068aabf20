mod common;
mod completions;
mod setup;
mod ui;

use clap::{CommandFactory, Parser, Subcommand};
use std::io::IsTerminal;

use crate::completions::CompletionCommands;
use crate::setup::{CatalogArgs, InstallArgs, SelectionArgs};
use crate::ui::prelude::*;

/// Install the packages of a dotfiles package catalog
#[derive(Parser, Debug)]
#[command(name = "dotinstall", author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode (echo every external command)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List catalog packages for the target, grouped by category
    List(CatalogArgs),

    /// Show which packages are installed
    Status(SelectionArgs),

    /// Show what an install would do without changing anything
    Plan(SelectionArgs),

    /// Install missing packages
    Install(InstallArgs),

    /// Print the detected platform target
    Target(CatalogArgs),

    /// Shell completion scripts
    Completions {
        #[command(subcommand)]
        command: CompletionCommands,
    },
}

pub fn cli_command() -> clap::Command {
    Cli::command()
}

async fn dispatch(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::List(args) => setup::handle_list(&args),
        Commands::Status(args) => setup::handle_status(&args).await,
        Commands::Plan(args) => setup::handle_plan(&args).await,
        Commands::Install(args) => setup::handle_install(&args).await,
        Commands::Target(args) => setup::handle_target(&args),
        Commands::Completions { command } => match command {
            CompletionCommands::Generate { shell } => {
                print!("{}", completions::generate(shell)?);
                Ok(0)
            }
            CompletionCommands::Install {
                shell,
                path,
                force,
            } => {
                let path = completions::install(shell, path, force)?;
                emit(
                    Level::Success,
                    "completions.installed",
                    &format!("Installed {} completions to {}", shell, path.display()),
                    None,
                );
                emit(
                    Level::Info,
                    "completions.instructions",
                    &completions::instructions(shell, &path),
                    None,
                );
                Ok(0)
            }
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
    colored::control::set_override(color);
    ui::init(cli.output, color);
    ui::set_debug_mode(cli.debug);

    match dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            emit(Level::Error, "dotinstall.error", &format!("Error: {:#}", e), None);
            std::process::exit(1);
        }
    }
}

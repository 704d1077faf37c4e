use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(name = "ghget", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// Extra configuration file, layered over the user config.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(name = "run-once", about = "Check every subscription for a new release once")]
    RunOnce(RunOnce),
}

#[derive(Clone, Debug, Args)]
pub struct RunOnce {
    /// Only check the subscription with this id.
    #[arg(long, value_name = "ID")]
    pub subscription: Option<String>,

    /// Skip announcing new releases.
    #[arg(long)]
    pub no_notify: bool,

    /// Download and install new releases. Defaults to `install_assets` from
    /// the configuration.
    #[arg(long)]
    pub install: bool,
}

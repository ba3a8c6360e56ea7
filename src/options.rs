use std::path::PathBuf;

use crate::commands::Command;
use clap::Parser;

#[derive(Debug, Parser)]
#[clap(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Options {
    #[command(flatten)]
    pub global: Global,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Parser)]
pub struct Global {
    /// Path to a TOML config file. If not specified, imgharvest will use
    /// 'imgharvest.toml' from the current directory when it exists, and
    /// built-in defaults otherwise.
    #[clap(long, global(true), env("IMGHARVEST_CONFIG"))]
    pub config: Option<PathBuf>,

    /// Sets verbosity level. Can be specified multiple times to increase the verbosity
    /// of this program.
    #[clap(long = "verbose", short, global(true), action(clap::ArgAction::Count))]
    pub verbosity: u8,
}

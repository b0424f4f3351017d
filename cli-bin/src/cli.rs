// src/cli.rs

pub mod limits;
pub mod watch;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Output format for commands.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Warden – filesystem change monitor
#[derive(Parser, Debug)]
#[command(name = "warden", author, version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch paths and print normalized change events until Ctrl+C
    ///
    /// Example:
    ///     warden watch ~/Documents --recursive --skip '*/.git'
    Watch(watch::WatchOpts),

    /// Show the resolved configuration and watch limit
    Limits,

    /// Generate shell completions (hidden)
    #[command(hide = true)]
    Completions {
        /// Shell to generate for
        #[arg(value_enum)]
        shell: Shell,
    },
}

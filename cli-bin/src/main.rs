//! Warden CLI entry-point
//!
//! All monitoring lives in the `libwarden` crate; this file handles
//! argument parsing, logging and dispatch.

mod cli; // sub-command definitions and argument structs

use libwarden::{config::MonitorConfig, logging};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use std::{env, io};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    /* ── CLI parsing & logging ────────────────────────────────── */
    let args = Cli::parse();
    if args.verbose {
        env::set_var("RUST_LOG", "debug");
    }
    logging::init();

    /* ── shell-completion shortcut ────────────────────────────── */
    if let Commands::Completions { shell } = &args.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "warden", &mut io::stdout());
        return Ok(());
    }

    /* ── config (env overrides are validated here) ────────────── */
    let cfg = MonitorConfig::load()?;

    /* ── command dispatch ────────────────────────────────────── */
    match args.command {
        Commands::Completions { .. } => {} // handled above
        Commands::Watch(opts) => cli::watch::run(&opts, cfg, args.format)?,
        Commands::Limits => cli::limits::run(&cfg, args.format)?,
    }

    Ok(())
}

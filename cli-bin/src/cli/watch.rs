// src/cli/watch.rs

use crate::cli::Format;
use anyhow::{bail, Context, Result};
use clap::Args;
use glob::Pattern;
use libwarden::{config::MonitorConfig, Monitor, MonitorEvent};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Options for the `watch` command
#[derive(Args, Debug)]
pub struct WatchOpts {
    /// Paths to watch (`~` is expanded)
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Also watch every directory below each path
    #[arg(long, short)]
    pub recursive: bool,

    /// Glob of directories to leave out with --recursive (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub skip: Vec<String>,

    /// Pairing window for renames, in milliseconds
    #[arg(long)]
    pub pairing_ms: Option<u64>,

    /// Quiet period before a created/updated path is reported, in milliseconds
    #[arg(long)]
    pub quiet_ms: Option<u64>,

    /// Stop after this many milliseconds instead of waiting for Ctrl+C
    #[arg(long, hide = true)]
    pub duration_ms: Option<u64>,
}

pub fn run(opts: &WatchOpts, mut cfg: MonitorConfig, fmt: Format) -> Result<()> {
    if let Some(ms) = opts.pairing_ms {
        cfg.pairing_window_ms = ms;
    }
    if let Some(ms) = opts.quiet_ms {
        cfg.update_quiet_ms = ms;
    }

    let skip = opts
        .skip
        .iter()
        .map(|s| {
            let expanded = shellexpand::tilde(s).into_owned();
            Pattern::new(&expanded).with_context(|| format!("Invalid glob pattern `{expanded}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let roots = opts
        .paths
        .iter()
        .map(|raw| {
            let p = PathBuf::from(shellexpand::tilde(raw).into_owned());
            if !p.exists() {
                bail!("no such path: {}", p.display());
            }
            Ok(p)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut monitor = Monitor::with_config(cfg);
    for root in &roots {
        if opts.recursive && root.is_dir() {
            monitor.add_tree(root, &skip);
        } else {
            monitor.add(root);
        }
    }
    if monitor.get_ignored() > 0 {
        info!(
            "{} directories skipped: watch limit reached",
            monitor.get_ignored()
        );
    }
    let watched = monitor.get_count();
    info!("Watching {watched} paths. Press Ctrl+C to stop.");

    let running = Arc::new(AtomicBool::new(true));
    let r_clone = running.clone();
    ctrlc::set_handler(move || {
        r_clone.store(false, Ordering::SeqCst);
    })?;

    let events = monitor.events();
    let stop_at = opts
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        if stop_at.is_some_and(|t| Instant::now() >= t) {
            break;
        }
        monitor.poll(Duration::from_millis(200));
        for ev in events.try_iter() {
            print_event(&ev, fmt)?;
            printed += 1;
        }
    }

    info!("Stopping; flushing pending events");
    monitor.flush();
    for ev in events.try_iter() {
        print_event(&ev, fmt)?;
        printed += 1;
    }

    if fmt == Format::Text {
        println!("watched {watched} paths, {printed} events");
    }
    Ok(())
}

fn print_event(ev: &MonitorEvent, fmt: Format) -> Result<()> {
    let now = chrono::Local::now();
    match fmt {
        Format::Text => println!("{} {}", now.format("%H:%M:%S%.3f"), ev),
        Format::Json => {
            let mut v = event_json(ev);
            v["time"] = Value::String(now.to_rfc3339());
            println!("{}", serde_json::to_string(&v)?);
        }
    }
    Ok(())
}

fn event_json(ev: &MonitorEvent) -> Value {
    match ev {
        MonitorEvent::Moved {
            from,
            to,
            is_directory,
            is_source_monitored,
        } => json!({
            "signal": ev.kind(),
            "from": from.to_string_lossy(),
            "to": to.to_string_lossy(),
            "is_directory": is_directory,
            "is_source_monitored": is_source_monitored,
        }),
        _ => json!({
            "signal": ev.kind(),
            "path": ev.path().to_string_lossy(),
            "is_directory": ev.is_directory(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn moved_event_json_carries_both_ends() {
        let ev = MonitorEvent::Moved {
            from: PathBuf::from("/w/a"),
            to: PathBuf::from("/w/b"),
            is_directory: true,
            is_source_monitored: true,
        };
        let v = event_json(&ev);
        assert_eq!(v["signal"], "item-moved");
        assert_eq!(v["from"], "/w/a");
        assert_eq!(v["to"], "/w/b");
        assert_eq!(v["is_directory"], true);
    }

    #[test]
    fn plain_event_json_has_path() {
        let ev = MonitorEvent::Deleted {
            path: PathBuf::from("/w/gone"),
            is_directory: false,
        };
        let v = event_json(&ev);
        assert_eq!(v["signal"], "item-deleted");
        assert_eq!(v["path"], "/w/gone");
        assert!(v.get("from").is_none());
    }
}

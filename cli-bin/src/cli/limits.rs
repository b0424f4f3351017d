// src/cli/limits.rs
use crate::cli::Format;
use anyhow::Result;
use libwarden::config::MonitorConfig;

pub fn run(cfg: &MonitorConfig, fmt: Format) -> Result<()> {
    match fmt {
        Format::Text => {
            println!("pairing_window_ms  {}", cfg.pairing_window_ms);
            println!("update_quiet_ms    {}", cfg.update_quiet_ms);
            println!("update_max_age_ms  {}", cfg.update_max_age_ms);
            println!("max_pending_moves  {}", cfg.max_pending_moves);
            println!("batch_size         {}", cfg.batch_size);
            println!("max_queue_size     {}", cfg.max_queue_size);
            match cfg.monitor_limit {
                Some(n) => println!("monitor_limit      {n}"),
                None => println!("monitor_limit      unlimited"),
            }
        }
        Format::Json => {
            let v = serde_json::json!({
                "pairing_window_ms": cfg.pairing_window_ms,
                "update_quiet_ms": cfg.update_quiet_ms,
                "update_max_age_ms": cfg.update_max_age_ms,
                "max_pending_moves": cfg.max_pending_moves,
                "batch_size": cfg.batch_size,
                "max_queue_size": cfg.max_queue_size,
                "monitor_limit": cfg.monitor_limit,
            });
            println!("{}", serde_json::to_string(&v)?);
        }
    }
    Ok(())
}

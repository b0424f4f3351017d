use anyhow::{Context, Result};
use std::time::Duration;

/// Where the kernel publishes the per-user inotify watch budget.
const INOTIFY_MAX_WATCHES: &str = "/proc/sys/fs/inotify/max_user_watches";

/// Watches left to other applications when we size ourselves from the
/// inotify budget, which is shared by everything the user runs.
const INOTIFY_HEADROOM: usize = 500;

/// Fallback when the backend gives us no way to discover its limit.
const DEFAULT_MONITOR_LIMIT: usize = 8192;

/// Tunables for the monitor engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// How long a `moved_from` waits for its `moved_to` before it is
    /// reported as a deletion.
    pub pairing_window_ms: u64,
    /// A created/updated path must be quiet this long before it is emitted.
    pub update_quiet_ms: u64,
    /// Upper bound on how long a constantly changing path can be held back.
    /// `0` disables forced emission.
    pub update_max_age_ms: u64,
    /// Pending moves kept at most; the oldest is evicted as a deletion.
    pub max_pending_moves: usize,
    /// Raw events handled per `poll` before signals are flushed.
    pub batch_size: usize,
    /// Capacity of the raw event channel between backend and loop.
    pub max_queue_size: usize,
    /// Maximum number of watch entries. `None` means unlimited.
    pub monitor_limit: Option<usize>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pairing_window_ms: 500,
            update_quiet_ms: 100,
            update_max_age_ms: 60_000,
            max_pending_moves: 512,
            batch_size: 1_000,
            max_queue_size: 100_000,
            monitor_limit: Some(default_monitor_limit()),
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by environment variables.
    ///
    /// Recognised:
    /// * `WARDEN_PAIRING_WINDOW_MS`
    /// * `WARDEN_UPDATE_QUIET_MS`
    /// * `WARDEN_UPDATE_MAX_AGE_MS`
    /// * `WARDEN_MONITOR_LIMIT` (`0` = unlimited)
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_u64("WARDEN_PAIRING_WINDOW_MS")? {
            cfg.pairing_window_ms = v;
        }
        if let Some(v) = env_u64("WARDEN_UPDATE_QUIET_MS")? {
            cfg.update_quiet_ms = v;
        }
        if let Some(v) = env_u64("WARDEN_UPDATE_MAX_AGE_MS")? {
            cfg.update_max_age_ms = v;
        }
        if let Some(v) = env_u64("WARDEN_MONITOR_LIMIT")? {
            cfg.monitor_limit = if v == 0 { None } else { Some(v as usize) };
        }

        Ok(cfg)
    }

    pub fn pairing_window(&self) -> Duration {
        Duration::from_millis(self.pairing_window_ms)
    }

    pub fn update_quiet(&self) -> Duration {
        Duration::from_millis(self.update_quiet_ms)
    }

    pub fn update_max_age(&self) -> Option<Duration> {
        (self.update_max_age_ms > 0).then(|| Duration::from_millis(self.update_max_age_ms))
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a non-negative integer, got `{raw}`"))?;
            Ok(Some(v))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {key}")),
    }
}

/// Size the watch budget from the inotify limit when we can read it.
pub fn default_monitor_limit() -> usize {
    match std::fs::read_to_string(INOTIFY_MAX_WATCHES) {
        Ok(contents) => limit_from_max_user_watches(&contents).unwrap_or(DEFAULT_MONITOR_LIMIT),
        Err(_) => DEFAULT_MONITOR_LIMIT,
    }
}

fn limit_from_max_user_watches(contents: &str) -> Option<usize> {
    let max: usize = contents.trim().parse().ok()?;
    // a kernel budget below the headroom leaves nothing usable
    max.checked_sub(INOTIFY_HEADROOM).filter(|&n| n > 0)
}

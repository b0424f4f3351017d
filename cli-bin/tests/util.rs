//! tests/util.rs
//! Small helpers shared across integration tests.

use assert_cmd::Command;
use std::path::PathBuf;

/// Absolute path to the freshly-built `warden` binary.
pub fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_warden"))
}

/// Build a `Command` for `warden` with none of the tuning variables
/// inherited from the calling environment.
///
/// Each call yields a brand-new `Command`, so callers can freely add
/// arguments or environment without affecting other invocations.
pub fn warden() -> Command {
    let mut cmd = Command::new(bin());
    for var in [
        "WARDEN_PAIRING_WINDOW_MS",
        "WARDEN_UPDATE_QUIET_MS",
        "WARDEN_UPDATE_MAX_AGE_MS",
        "WARDEN_MONITOR_LIMIT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// libwarden/src/logging_tests.rs

use super::logging;
use crate::test_utils::EnvGuard;
use tracing::Level;

#[test]
fn init_is_idempotent() {
    let mut env = EnvGuard::new();
    // set RUST_LOG to exercise the EnvFilter path
    env.set("RUST_LOG", "debug");
    let _ = logging::init();
    // whoever installed the subscriber first, a second install never succeeds
    assert!(!logging::init());
    tracing::event!(Level::INFO, "this is a test log");
}

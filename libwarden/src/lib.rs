//! libwarden – filesystem change monitoring.
//!
//! Turns low-level OS notifications into four semantic events
//! (created / updated / deleted / moved) for a set of explicitly watched
//! paths. Down-stream crates should use the re-exports below; the pairing
//! and coalescing internals are private.
//!
//! ```no_run
//! use libwarden::{Monitor, MonitorEvent};
//! use std::time::Duration;
//!
//! let mut monitor = Monitor::new();
//! monitor.add("/home/me/Documents");
//! let events = monitor.events();
//! loop {
//!     monitor.poll(Duration::from_millis(250));
//!     for ev in events.try_iter() {
//!         if let MonitorEvent::Moved { from, to, .. } = &ev {
//!             println!("{} -> {}", from.display(), to.display());
//!         }
//!     }
//! }
//! ```

pub mod backend; // subscription capability + notify / manual backends
pub mod config;
pub mod error;
pub mod event;
pub mod logging; // expose the logging init helper
pub mod monitor;
pub mod table;
pub mod utils;

mod coalesce;
mod pairer;

pub use backend::{Backend, ManualBackend, NotifyBackend, RawEvent, RawEventKind, TokenId, WatchToken};
pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use event::MonitorEvent;
pub use monitor::Monitor;

#[cfg(test)]
mod logging_tests;
#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod utils_tests;

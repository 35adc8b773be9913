//! Daemon process lifecycle: singleton guard, detaching, and launch order.

pub(crate) mod daemonizer;
mod errors;
mod files;
mod guard;
pub(crate) mod launch;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::LaunchError;
pub use launch::{LaunchMode, LaunchPlan, run_daemon, run_daemon_with};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Environment variable that keeps the daemon attached to its terminal.
pub const FOREGROUND_ENV_VAR: &str = "MQ_FOREGROUND";

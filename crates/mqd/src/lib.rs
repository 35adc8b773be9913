//! The `mqd` job queue daemon.
//!
//! Clients submit commands over a Unix socket; the daemon keeps them in an
//! ordered table and runs at most one job per CPU, oldest first, on a single
//! thread. A readiness loop multiplexes the listener, every client, and a
//! wake pipe fed by signal handlers. Child termination is folded into the
//! table by the reaper, which only runs while `SIGCHLD` is masked, so the
//! table is never observed mid-update.
//!
//! [`run`] is the binary's entry point; [`run_daemon_with`] lets embedders
//! and tests supply their own daemoniser.

mod cli;
pub mod dispatch;
pub mod job;
mod process;
pub mod reaper;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod signals;
pub mod supervisor;
mod telemetry;
pub mod transport;

pub use cli::{DaemonCli, DaemonError, run};
pub use process::{
    DaemonizeError, Daemonizer, FOREGROUND_ENV_VAR, LaunchError, LaunchMode, LaunchPlan,
    SystemDaemonizer, run_daemon, run_daemon_with,
};
pub use server::StopReason;
pub use telemetry::{LogSink, TelemetryError, TelemetryHandle, VERBOSE_FILTER};

#[cfg(test)]
mod tests;

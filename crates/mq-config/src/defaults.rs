use std::env;
use std::num::NonZeroUsize;
use std::thread;

use camino::Utf8PathBuf;

use libc::geteuid;

use dirs::{config_dir, runtime_dir};

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Directory name used beneath the runtime and configuration roots.
pub const APPLICATION_DIR: &str = "mq";

/// File name of the daemon socket.
pub const SOCKET_FILE_NAME: &str = "mqd.sock";

/// File name of the optional configuration file.
pub const CONFIG_FILE_NAME: &str = "mq.toml";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}

/// Number of jobs allowed to run at once when no budget is configured.
///
/// Falls back to a single slot when the processor count is unavailable.
#[must_use]
pub fn default_cpu_budget() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Computes the default socket endpoint for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push(APPLICATION_DIR);
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join(SOCKET_FILE_NAME))
}

/// Location of the configuration file consulted when none is given explicitly.
#[must_use]
pub fn default_config_path() -> Option<Utf8PathBuf> {
    let base = config_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())?;
    Some(base.join(APPLICATION_DIR).join(CONFIG_FILE_NAME))
}

fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

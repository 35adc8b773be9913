//! Singleton enforcement and the runtime artefacts a live daemon leaves
//! behind: lock file, pid file, and health snapshot.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use mq_config::RuntimePaths;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::files::atomic_write;

/// Lifecycle stage published in the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum HealthState {
    Starting,
    Ready,
    Stopping,
}

#[derive(Debug, Serialize)]
struct HealthSnapshot<'a> {
    status: HealthState,
    pid: u32,
    socket: &'a str,
    timestamp: u64,
}

/// Holds the daemon lock until dropped, then removes every artefact.
#[derive(Debug)]
pub(crate) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
    pid: Option<u32>,
}

impl ProcessGuard {
    pub(crate) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid: None,
        })
    }

    pub(crate) const fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    pub(crate) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        atomic_write(path, format!("{pid}\n").as_bytes()).map_err(|source| {
            LaunchError::PidWrite {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.pid = Some(pid);
        info!(target: PROCESS_TARGET, pid, file = %path.display(), "pid file written");
        Ok(())
    }

    pub(crate) fn write_health(&self, status: HealthState) -> Result<(), LaunchError> {
        let pid = self.pid.ok_or(LaunchError::MissingPid)?;
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let socket = self.paths.socket_path().display().to_string();
        let mut payload = serde_json::to_vec(&HealthSnapshot {
            status,
            pid,
            socket: &socket,
            timestamp,
        })?;
        payload.push(b'\n');

        let path = self.paths.health_path();
        atomic_write(path, &payload).map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            target: PROCESS_TARGET,
            status = ?status,
            file = %path.display(),
            "health snapshot updated"
        );
        Ok(())
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for (path, label) in [
            (self.paths.health_path(), "health"),
            (self.paths.pid_path(), "pid"),
            (self.paths.lock_path(), "lock"),
        ] {
            if let Err(error) = remove_if_present(path) {
                warn!(
                    target: PROCESS_TARGET,
                    file = %path.display(),
                    error = %error,
                    "failed to remove {label} file"
                );
            }
        }
    }
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let opened = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(paths.lock_path());
    match opened {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            clear_stale_lock(paths)?;
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(paths.lock_path())
                .map_err(|source| LaunchError::LockCreate {
                    path: paths.lock_path().to_path_buf(),
                    source,
                })
        }
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

/// Fails when the recorded daemon is alive; otherwise removes what it left.
fn clear_stale_lock(paths: &RuntimePaths) -> Result<(), LaunchError> {
    if let Some(pid) = paths.read_pid()?.filter(|pid| *pid != 0) {
        if process_alive(pid)? {
            info!(target: PROCESS_TARGET, pid, "refusing to start: daemon already running");
            return Err(LaunchError::AlreadyRunning { pid });
        }
        warn!(target: PROCESS_TARGET, pid, "recorded daemon is gone; removing stale files");
    }
    for path in [paths.lock_path(), paths.pid_path(), paths.health_path()] {
        remove_if_present(path).map_err(|source| LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn process_alive(pid: u32) -> Result<bool, LaunchError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(LaunchError::CheckProcess { pid, source }),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

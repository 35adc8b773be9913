//! Derives runtime artefact paths shared by the client and daemon.
//!
//! The runtime directory is the socket's parent. It houses the daemon lock,
//! pid file, health snapshot and log file, so both binaries agree on where a
//! running daemon leaves its traces.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Canonical paths for runtime artefacts written by the daemon.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    socket_path: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
    log_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration, creating the
    /// runtime directory when needed.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let socket_path = config.daemon_socket().path().as_std_path().to_path_buf();
        let runtime_dir = socket_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| RuntimePathsError::MissingSocketParent {
                path: socket_path.display().to_string(),
            })?;
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&runtime_dir)
            .map_err(|source| RuntimePathsError::RuntimeDirectory {
                path: runtime_dir.clone(),
                source,
            })?;
        Ok(Self {
            lock_path: runtime_dir.join("mqd.lock"),
            pid_path: runtime_dir.join("mqd.pid"),
            health_path: runtime_dir.join("mqd.health"),
            log_path: runtime_dir.join("mqd.log"),
            socket_path,
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path of the listening socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.socket_path.as_path()
    }

    /// Path to the lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }

    /// Path to the daemon log used while detached.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.log_path.as_path()
    }

    /// Reads the pid recorded by a running daemon, if any.
    pub fn read_pid(&self) -> Result<Option<u32>, RuntimePathsError> {
        let content = match fs::read_to_string(&self.pid_path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RuntimePathsError::ReadPid {
                    path: self.pid_path.clone(),
                    source,
                });
            }
        };
        Ok(content.trim().parse().ok())
    }
}

/// Errors raised while deriving daemon runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent {
        /// Offending socket path.
        path: String,
    },
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// Reading the pid file failed.
    #[error("failed to read pid file '{path}': {source}")]
    ReadPid {
        /// Pid file path.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SocketEndpoint;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    #[rstest]
    fn derives_paths_beside_the_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("run")).expect("utf8");
        let config = Config::builder()
            .daemon_socket(SocketEndpoint::unix(root.join("mqd.sock")))
            .build();

        let paths = RuntimePaths::from_config(&config).expect("paths should derive");

        assert_eq!(paths.runtime_dir(), root.as_std_path());
        assert!(paths.lock_path().ends_with("mqd.lock"));
        assert!(paths.pid_path().ends_with("mqd.pid"));
        assert!(paths.health_path().ends_with("mqd.health"));
        assert!(paths.log_path().ends_with("mqd.log"));
        assert!(paths.runtime_dir().is_dir());
    }

    #[rstest]
    fn rejects_socket_without_parent() {
        let config = Config::builder()
            .daemon_socket(SocketEndpoint::unix("mqd.sock"))
            .build();
        let error = RuntimePaths::from_config(&config)
            .expect_err("paths should fail for sockets without parents");
        assert!(matches!(
            error,
            RuntimePathsError::MissingSocketParent { .. }
        ));
    }

    #[rstest]
    fn missing_pid_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        let config = Config::builder()
            .daemon_socket(SocketEndpoint::unix(root.join("mqd.sock")))
            .build();
        let paths = RuntimePaths::from_config(&config).expect("paths");
        assert_eq!(paths.read_pid().expect("read"), None);

        fs::write(paths.pid_path(), "4242\n").expect("write pid");
        assert_eq!(paths.read_pid().expect("read"), Some(4242));
    }
}

//! Unix listener with stale socket recovery.

use std::fs;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use mq_config::SocketEndpoint;
use tracing::{debug, info, warn};

use super::{LISTENER_TARGET, ListenerError};

/// Non-blocking listener that removes its socket file when dropped.
#[derive(Debug)]
pub struct SocketListener {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketListener {
    /// Binds the endpoint, replacing a stale socket file if one exists.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let path = endpoint.path().as_std_path().to_path_buf();
        let listener = bind_unix(&path)?;
        let bound = Self { path, listener };
        bound
            .listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        info!(
            target: LISTENER_TARGET,
            endpoint = %endpoint,
            "socket listener active"
        );
        Ok(bound)
    }

    /// Filesystem path of the socket.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts one pending connection, switched to non-blocking mode.
    ///
    /// Returns `Ok(None)` when no connection is waiting or the peer gave up
    /// before it was accepted. Any other error leaves the connection queued,
    /// so the listener stays readable and retrying cannot make progress.
    pub fn accept(&self) -> io::Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(stream))
            }
            Err(error) if is_transient(&error) => {
                debug!(target: LISTENER_TARGET, error = %error, "accept skipped");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

impl AsFd for SocketListener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(
                target: LISTENER_TARGET,
                path = %self.path.display(),
                "removed unix socket file"
            ),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: LISTENER_TARGET,
                error = %error,
                path = %self.path.display(),
                "failed to remove unix socket file"
            ),
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::Metadata {
            path: display(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotSocket { path: display() });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => return Err(ListenerError::InUse { path: display() }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                info!(
                    target: LISTENER_TARGET,
                    path = %path.display(),
                    "removing stale unix socket"
                );
                fs::remove_file(path).map_err(|source| ListenerError::Cleanup {
                    path: display(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::Probe {
                    path: display(),
                    source: error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        path: display(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Socket {
        _dir: TempDir,
        path: PathBuf,
        endpoint: SocketEndpoint,
    }

    #[fixture]
    fn socket() -> Socket {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mqd.sock");
        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        Socket {
            _dir: dir,
            path,
            endpoint,
        }
    }

    #[rstest]
    fn replaces_stale_socket_and_cleans_up(socket: Socket) {
        {
            let _stale = UnixListener::bind(&socket.path).expect("bind stale listener");
        }
        assert!(socket.path.exists(), "stale socket should remain");

        let listener = SocketListener::bind(&socket.endpoint).expect("bind new listener");
        let _client = UnixStream::connect(&socket.path).expect("connect client");
        assert!(listener.accept().expect("accept").is_some());
        assert!(listener.accept().expect("accept").is_none());

        drop(listener);
        assert!(!socket.path.exists(), "socket file should be removed");
    }

    #[rstest]
    #[case(Errno::EAGAIN, true)]
    #[case(Errno::EINTR, true)]
    #[case(Errno::ECONNABORTED, true)]
    #[case(Errno::EMFILE, false)]
    #[case(Errno::ENFILE, false)]
    #[case(Errno::ENOBUFS, false)]
    fn only_vanished_peers_are_skipped(#[case] errno: Errno, #[case] transient: bool) {
        assert_eq!(is_transient(&io::Error::from(errno)), transient);
    }

    #[rstest]
    fn refuses_live_socket(socket: Socket) {
        let _existing = UnixListener::bind(&socket.path).expect("bind existing listener");
        let error = SocketListener::bind(&socket.endpoint).expect_err("should fail bind");
        assert!(matches!(error, ListenerError::InUse { .. }));
    }

    #[rstest]
    fn refuses_regular_file(socket: Socket) {
        fs::write(&socket.path, b"not a socket").expect("write file");
        let error = SocketListener::bind(&socket.endpoint).expect_err("should fail bind");
        assert!(matches!(error, ListenerError::NotSocket { .. }));
        assert!(socket.path.exists());
    }
}

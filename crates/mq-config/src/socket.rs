use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNIX_SCHEME: &str = "unix://";

/// Filesystem-addressed stream socket the daemon listens on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct SocketEndpoint {
    path: Utf8PathBuf,
}

impl SocketEndpoint {
    /// Builds an endpoint for the given socket path.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Filesystem path of the socket.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }

    /// Ensures the socket's parent directory exists with restrictive permissions.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
        else {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{UNIX_SCHEME}{}", self.path)
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let path = match input.split_once("://") {
            Some(("unix", path)) => path,
            Some((scheme, _)) => return Err(SocketParseError::UnsupportedScheme(scheme.to_owned())),
            None => input,
        };
        if path.is_empty() {
            return Err(SocketParseError::MissingPath(input.to_owned()));
        }
        Ok(Self::unix(path))
    }
}

impl TryFrom<String> for SocketEndpoint {
    type Error = SocketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SocketEndpoint> for String {
    fn from(endpoint: SocketEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'; only unix:// endpoints are served")]
    UnsupportedScheme(String),
    /// The socket path was absent.
    #[error("missing socket path in '{0}'")]
    MissingPath(String),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Failed to create the socket directory.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn display_uses_unix_scheme() {
        let endpoint = SocketEndpoint::unix("/tmp/mq/mqd.sock");
        assert_eq!(endpoint.to_string(), "unix:///tmp/mq/mqd.sock");
    }

    #[rstest]
    #[case("unix:///run/mq.sock")]
    #[case("/run/mq.sock")]
    fn parses_scheme_and_bare_paths(#[case] input: &str) {
        let endpoint: SocketEndpoint = input.parse().expect("parse");
        assert_eq!(endpoint.path(), Utf8Path::new("/run/mq.sock"));
    }

    #[rstest]
    fn rejects_tcp_endpoints() {
        let error = "tcp://127.0.0.1:9000"
            .parse::<SocketEndpoint>()
            .expect_err("tcp is not served");
        assert!(matches!(error, SocketParseError::UnsupportedScheme(scheme) if scheme == "tcp"));
    }

    #[rstest]
    fn prepare_creates_private_parent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        let endpoint = SocketEndpoint::unix(root.join("nested").join("mqd.sock"));
        endpoint.prepare_filesystem().expect("prepare");

        let metadata = std::fs::metadata(root.join("nested")).expect("metadata");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(metadata.permissions().mode() & 0o777, 0o700);
        }
        assert!(metadata.is_dir());
    }
}

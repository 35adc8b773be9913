//! Socket transport helpers for the `mq` client.
//!
//! Connections use a bounded connect timeout so a wedged daemon cannot hang
//! the client before the request is even written.

use std::io;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use mq_config::SocketEndpoint;
use socket2::{Domain, SockAddr, Socket, Type};

use crate::errors::AppError;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn connect(endpoint: &SocketEndpoint) -> Result<UnixStream, AppError> {
    connect_unix(endpoint, CONNECTION_TIMEOUT).map_err(|source| AppError::Connect {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Whether something accepts connections on `endpoint` right now.
pub(crate) fn is_reachable(endpoint: &SocketEndpoint, timeout: Duration) -> bool {
    connect_unix(endpoint, timeout).is_ok()
}

fn connect_unix(endpoint: &SocketEndpoint, timeout: Duration) -> io::Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(endpoint.path().as_std_path())?;
    socket.connect_timeout(&address, timeout)?;
    Ok(socket.into())
}

//! Listening socket for client connections.
//!
//! The daemon binds a single Unix stream socket. A stale socket left behind
//! by a crashed daemon is replaced; a live one is never stolen.

mod errors;
mod listener;

pub use self::errors::ListenerError;
pub use self::listener::SocketListener;

pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

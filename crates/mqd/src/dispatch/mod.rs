//! Request dispatch.
//!
//! A request is decoded into a [`Command`], executed against the job table
//! under the child-signal mask, and answered with a [`Response`]. Per-request
//! failures become `KO` responses carrying one explanatory `ERR` line; an
//! unrecognised verb gets a bare `KO`.
//!
//! [`Response`]: mq_protocol::Response

mod command;
mod errors;
mod handler;

pub use self::command::{Command, USAGE};
pub use self::errors::DispatchError;
pub use self::handler::{CommandDispatcher, Dispatched};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Runtime switch between verbose and configured logging.
pub trait VerbosityControl {
    /// Enables debug output when `enabled`, otherwise restores the configured
    /// filter.
    fn set_verbose(&self, enabled: bool);
}

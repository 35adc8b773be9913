//! Behavioural suites for the daemon.

pub(crate) mod support;

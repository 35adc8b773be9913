//! Per-request failures surfaced to clients as `KO` responses.

use mq_protocol::RequestError;
use thiserror::Error;

use crate::job::JobError;
use crate::supervisor::QueueError;

/// Errors raised while parsing or executing a single request.
///
/// None of these affect other clients or jobs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request bytes could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(#[from] RequestError),
    /// The request carried no verb at all.
    #[error("empty request")]
    EmptyRequest,
    /// The verb is not recognised.
    #[error("unknown command '{verb}'")]
    UnknownVerb {
        /// Verb as received.
        verb: String,
    },
    /// `add` without a command to run.
    #[error("missing command")]
    MissingCommand,
    /// Arguments missing or not numeric.
    #[error("usage: {usage}")]
    Usage {
        /// Synopsis of the verb.
        usage: &'static str,
    },
    /// The job table rejected the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The job rejected the operation.
    #[error(transparent)]
    Job(#[from] JobError),
}

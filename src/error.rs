use std::io;

use thiserror::Error;

/// Errors returned by the reqline request pipeline.
///
/// These cover failures reported synchronously to the caller of a send,
/// cancel, or reuse method. A request that was successfully submitted but
/// finished with a non-success status is *not* an `Error` on the
/// asynchronous path; that status is delivered through the completion
/// callback instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request (bad kind/buffer combination).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Completion context pool has no free slots.
    #[error("completion context pool exhausted")]
    ContextPoolExhausted,
    /// Pending request table is at capacity.
    #[error("pending request table full")]
    RegistryFull,
    /// No live request matches the given cancel or reuse id.
    #[error("unknown request id")]
    UnknownId,
    /// A reusable request was matched but is still in flight.
    #[error("request already in flight")]
    AlreadyInUse,
    /// No I/O target is currently set.
    #[error("no I/O target set")]
    NoTarget,
    /// The target refused the submission. Carries a negative errno value.
    #[error("target rejected submission: {0}")]
    Rejected(i32),
    /// A synchronously sent request finished with a non-success status.
    /// Carries the raw completion status (negative errno).
    #[error("request failed with status {0}")]
    RequestFailed(i32),
    /// The instance is shutting down and refuses new work.
    #[error("shutting down")]
    ShuttingDown,
    /// Underlying I/O failure in the target.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

//! The endpoint contract: the abstract destination that executes requests.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::request::{CompletionParams, Request};

/// A destination that executes formatted requests and reports completion.
///
/// Implementations wrap whatever actually performs the I/O: a device node,
/// a lower driver in a layered stack, a network peer, or a test double.
///
/// # Contract
///
/// - `submit` either returns `Err` without having fired the request's
///   completion hook, or returns `Ok` after which the hook (installed by
///   this crate before the call) is invoked **exactly once** with the final
///   status and byte count. The hook may fire on any thread, including
///   inline before `submit` returns.
/// - `submit_sync` services the request inline, blocking the calling
///   thread, and returns the final status directly. No hook is installed
///   for synchronous requests.
/// - `cancel` is best-effort: it returns `true` only if a pending request
///   was actually unwound (in which case the hook fires with
///   `-libc::ECANCELED`), and `false` if the request already completed or
///   was never seen. Returning `false` while the real completion races in
///   is expected and not an error.
/// - A timeout, when present, bounds the transfer; expiry completes the
///   request with `-libc::ETIMEDOUT`.
pub trait IoTarget: Send + Sync {
    /// Submit a formatted request for asynchronous execution.
    fn submit(&self, request: &Arc<Request>, timeout: Option<Duration>) -> Result<(), Error>;

    /// Execute a formatted request inline and return its final status.
    fn submit_sync(&self, request: &Arc<Request>, timeout: Option<Duration>) -> CompletionParams;

    /// Request best-effort cancellation of an in-flight request.
    fn cancel(&self, request: &Arc<Request>) -> bool;
}

//! The operation handle: one read/write/control transfer directed at a
//! target.
//!
//! A [`Request`] is created fresh for one-shot sends or once-then-reused for
//! reusable sends. It is shared as an `Arc`: the clone held by the pending
//! table is the safety reference that keeps the handle alive while a
//! concurrent cancel is using it. Ownership of the wire state passes to the
//! target between submit and completion; the target reads the input payload,
//! writes the output buffer, and fires the installed completion hook exactly
//! once.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::Error;

/// The kind of transfer a request performs.
///
/// Control kinds carry an opaque caller-supplied code; this crate never
/// interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Data flows target -> caller (output buffer only).
    Read,
    /// Data flows caller -> target (input buffer only).
    Write,
    /// Device control transfer; input and output are both optional.
    Ioctl(u32),
    /// Internal (stack-private) control transfer.
    InternalIoctl(u32),
}

/// Raw completion parameters reported by the target.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    /// Final status: `0` on success, a negative errno value on failure
    /// (`-libc::ECANCELED` for cancelled, `-libc::ETIMEDOUT` for timed out).
    pub status: i32,
    /// Bytes actually transferred in the data direction of the request.
    pub bytes_transferred: usize,
}

impl CompletionParams {
    /// Whether the operation finished successfully.
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Low-level completion hook installed on a request before submission.
pub(crate) type CompletionHook = Box<dyn FnOnce(CompletionParams) + Send + 'static>;

/// Wire state for the current submission cycle. Reset between sends of a
/// reusable request.
#[derive(Default)]
struct WireState {
    kind: Option<RequestKind>,
    input: Option<Bytes>,
    output: Option<BytesMut>,
    timeout: Option<Duration>,
    hook: Option<CompletionHook>,
}

/// One I/O request directed at an [`IoTarget`](crate::IoTarget).
///
/// Opaque to callers of [`RequestTarget`](crate::RequestTarget); target
/// implementations use the accessor methods to service the transfer and
/// [`Request::complete`] to report the outcome.
pub struct Request {
    /// Reuse cookie, stable for the handle's lifetime. 0 for one-shot.
    reuse_id: u64,
    /// Cancel cookie for the current submission. 0 means not cancellable.
    cancel_id: AtomicU64,
    /// Reserved-for-sending flag. Only meaningful for reusable requests.
    in_use: AtomicBool,
    wire: Mutex<WireState>,
}

impl Request {
    pub(crate) fn new_oneshot() -> Self {
        Request {
            reuse_id: 0,
            cancel_id: AtomicU64::new(0),
            in_use: AtomicBool::new(false),
            wire: Mutex::new(WireState::default()),
        }
    }

    pub(crate) fn new_reusable(reuse_id: u64) -> Self {
        Request {
            reuse_id,
            cancel_id: AtomicU64::new(0),
            in_use: AtomicBool::new(false),
            wire: Mutex::new(WireState::default()),
        }
    }

    pub(crate) fn reuse_id(&self) -> u64 {
        self.reuse_id
    }

    pub(crate) fn cancel_id(&self) -> u64 {
        self.cancel_id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_cancel_id(&self, id: u64) {
        self.cancel_id.store(id, Ordering::Relaxed);
    }

    /// Read of `in_use`. Callers serialize through the reuse table lock.
    pub(crate) fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Relaxed)
    }

    pub(crate) fn set_in_use(&self, value: bool) {
        self.in_use.store(value, Ordering::Relaxed);
    }

    /// Validate the kind/buffer combination and attach buffers for one
    /// submission cycle.
    ///
    /// Zero-length buffers are normalized to absent before this is called.
    pub(crate) fn format(
        &self,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        match kind {
            RequestKind::Read => {
                if input.is_some() {
                    return Err(Error::InvalidArgument("read takes no input buffer"));
                }
            }
            RequestKind::Write => {
                if output.is_some() {
                    return Err(Error::InvalidArgument("write takes no output buffer"));
                }
            }
            RequestKind::Ioctl(_) | RequestKind::InternalIoctl(_) => {}
        }

        let mut wire = self.wire.lock().unwrap();
        wire.kind = Some(kind);
        wire.input = input;
        wire.output = output;
        wire.timeout = timeout;
        Ok(())
    }

    pub(crate) fn install_hook(&self, hook: CompletionHook) {
        let mut wire = self.wire.lock().unwrap();
        debug_assert!(wire.hook.is_none(), "hook already installed");
        wire.hook = Some(hook);
    }

    /// Remove an installed-but-unfired hook during failed-submission
    /// rollback. Returns `None` if the target already consumed it.
    pub(crate) fn take_hook(&self) -> Option<CompletionHook> {
        self.wire.lock().unwrap().hook.take()
    }

    /// Detach the buffers of the current cycle. Used by the dispatcher to
    /// build the caller-visible completion, and by rollback paths.
    pub(crate) fn take_buffers(&self) -> (Option<Bytes>, Option<BytesMut>) {
        let mut wire = self.wire.lock().unwrap();
        (wire.input.take(), wire.output.take())
    }

    /// Reinitialize a reusable request for a new submission cycle.
    pub(crate) fn reset(&self) {
        let mut wire = self.wire.lock().unwrap();
        wire.kind = None;
        wire.input = None;
        wire.output = None;
        wire.timeout = None;
        wire.hook = None;
        self.cancel_id.store(0, Ordering::Relaxed);
    }

    // ── Target-facing accessors ─────────────────────────────────────────

    /// The kind this request was formatted for.
    ///
    /// # Panics
    ///
    /// Panics if called on a request that has not been formatted; targets
    /// only ever see formatted requests.
    pub fn kind(&self) -> RequestKind {
        self.wire
            .lock()
            .unwrap()
            .kind
            .expect("request not formatted")
    }

    /// Clone of the input payload, if any. `Bytes` clones are cheap.
    pub fn input(&self) -> Option<Bytes> {
        self.wire.lock().unwrap().input.clone()
    }

    /// Capacity of the attached output buffer (0 if absent).
    pub fn output_capacity(&self) -> usize {
        self.wire
            .lock()
            .unwrap()
            .output
            .as_ref()
            .map_or(0, |b| b.capacity())
    }

    /// Timeout requested for the current submission, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.wire.lock().unwrap().timeout
    }

    /// Copy `data` into the output buffer, truncating to its capacity.
    /// Returns the number of bytes written. No-op (returns 0) if the
    /// request has no output buffer.
    pub fn write_output(&self, data: &[u8]) -> usize {
        let mut wire = self.wire.lock().unwrap();
        let Some(output) = wire.output.as_mut() else {
            return 0;
        };
        let n = data.len().min(output.capacity());
        output.clear();
        output.extend_from_slice(&data[..n]);
        n
    }

    /// Fire the installed completion hook with the final status.
    ///
    /// Targets must call this exactly once per successful `submit`. A
    /// second call is a target bug; it is ignored in release builds.
    pub fn complete(&self, params: CompletionParams) {
        let hook = self.wire.lock().unwrap().hook.take();
        debug_assert!(hook.is_some(), "request completed twice");
        if let Some(hook) = hook {
            hook(params);
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("reuse_id", &self.reuse_id)
            .field("cancel_id", &self.cancel_id.load(Ordering::Relaxed))
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn format_rejects_bad_combinations() {
        let request = Request::new_oneshot();
        assert!(matches!(
            request.format(
                RequestKind::Read,
                Some(Bytes::from_static(b"x")),
                None,
                None
            ),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            request.format(
                RequestKind::Write,
                None,
                Some(BytesMut::with_capacity(8)),
                None
            ),
            Err(Error::InvalidArgument(_))
        ));
        // Control transfers may carry both.
        assert!(
            request
                .format(
                    RequestKind::Ioctl(0x42),
                    Some(Bytes::from_static(b"x")),
                    Some(BytesMut::with_capacity(8)),
                    None
                )
                .is_ok()
        );
    }

    #[test]
    fn write_output_truncates_to_capacity() {
        let request = Request::new_oneshot();
        request
            .format(
                RequestKind::Read,
                None,
                Some(BytesMut::with_capacity(4)),
                None,
            )
            .unwrap();
        let written = request.write_output(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(written, 4);
        let (_, output) = request.take_buffers();
        assert_eq!(&output.unwrap()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn write_output_without_buffer_is_noop() {
        let request = Request::new_oneshot();
        request
            .format(RequestKind::Write, Some(Bytes::from_static(b"ab")), None, None)
            .unwrap();
        assert_eq!(request.write_output(&[1, 2, 3]), 0);
    }

    #[test]
    fn hook_fires_once() {
        let request = Request::new_oneshot();
        request
            .format(RequestKind::Ioctl(1), None, None, None)
            .unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_hook = fired.clone();
        request.install_hook(Box::new(move |params| {
            assert_eq!(params.status, 0);
            fired_in_hook.fetch_add(1, Ordering::SeqCst);
        }));
        request.complete(CompletionParams {
            status: 0,
            bytes_transferred: 0,
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_cycle_state() {
        let request = Request::new_reusable(7);
        request
            .format(
                RequestKind::Ioctl(1),
                Some(Bytes::from_static(b"in")),
                Some(BytesMut::with_capacity(8)),
                Some(Duration::from_millis(10)),
            )
            .unwrap();
        request.set_cancel_id(99);
        request.reset();
        assert_eq!(request.cancel_id(), 0);
        assert_eq!(request.reuse_id(), 7);
        let (input, output) = request.take_buffers();
        assert!(input.is_none());
        assert!(output.is_none());
    }
}

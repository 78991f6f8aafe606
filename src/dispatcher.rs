//! Completion dispatch: the routine that runs when the target finishes a
//! request.
//!
//! The low-level hook installed at send time either processes the
//! completion inline ([`CompletionOption::Inline`]) or captures the raw
//! parameters and re-runs on the deferred work queue
//! ([`CompletionOption::Deferred`]), for callers whose callbacks need a
//! context where blocking is permitted. Either way each submitted request
//! is processed exactly once.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::context_pool::CtxSlot;
use crate::gate::ActivityGuard;
use crate::metrics::{COMPLETIONS_DEFERRED, COMPLETIONS_DELIVERED, COMPLETIONS_FAILED_STATUS};
use crate::request::{CompletionHook, CompletionParams, Request, RequestKind};
use crate::request_target::Shared;

/// Where the caller's completion callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOption {
    /// In whatever context the target fires its completion hook. The
    /// callback must not block.
    Inline,
    /// On the deferred work queue, where blocking is permitted.
    Deferred,
}

/// The caller-visible outcome of one asynchronous request.
pub struct Completion {
    /// Final status: `0` success, negative errno on failure.
    pub status: i32,
    /// Input payload as transferred (write: truncated to the byte count;
    /// control: the full payload; read: absent).
    pub input: Option<Bytes>,
    /// Output data as transferred, truncated to the reported byte count.
    pub output: Option<Bytes>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == -libc::ECANCELED
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == -libc::ETIMEDOUT
    }
}

/// Caller-supplied completion callback. Client state is captured by the
/// closure.
pub type SendCompletion = Box<dyn FnOnce(Completion) + Send + 'static>;

/// Build the low-level hook installed on a request before submission.
///
/// The hook owns the activity guard taken at submission time; it is
/// released as the final dispatch step, so teardown drain observes the
/// completion fully processed.
pub(crate) fn completion_hook(
    shared: Arc<Shared>,
    request: Arc<Request>,
    slot: CtxSlot,
    option: CompletionOption,
    guard: ActivityGuard,
) -> CompletionHook {
    match option {
        CompletionOption::Inline => Box::new(move |params| {
            process_completion(&shared, request, params, slot, guard);
        }),
        CompletionOption::Deferred => Box::new(move |params| {
            COMPLETIONS_DEFERRED.increment();
            let shared_for_job = Arc::clone(&shared);
            shared.workqueue.enqueue(move || {
                process_completion(&shared_for_job, request, params, slot, guard);
            });
        }),
    }
}

/// Process one completion: registry removal, buffer extraction, callback,
/// resource recycling.
pub(crate) fn process_completion(
    shared: &Shared,
    request: Arc<Request>,
    params: CompletionParams,
    slot: CtxSlot,
    guard: ActivityGuard,
) {
    // The entry may be absent: a cancel raced, or no cancel cookie was
    // requested and the request was never registered.
    shared.pending.remove(&request);

    let context = shared.contexts.take(slot);
    let (input, output) = request.take_buffers();
    let (input, output) = extract_buffers(context.kind, input, output, params.bytes_transferred);

    if context.reuse {
        // Make the request sendable again before the callback runs, so a
        // callback that immediately resends cannot observe stale state.
        request.set_in_use(false);
    }

    COMPLETIONS_DELIVERED.increment();
    if !params.is_success() {
        COMPLETIONS_FAILED_STATUS.increment();
    }

    if let Some(callback) = context.callback {
        callback(Completion {
            status: params.status,
            input,
            output,
        });
    }

    shared.contexts.release(slot);

    // One-shot requests are destroyed here (last Arc drops); reusable
    // requests stay alive in the reuse table.
    drop(request);
    drop(guard);
}

/// Per-kind result buffer extraction.
///
/// The reported output length must never exceed the supplied capacity;
/// a target claiming otherwise is internally inconsistent.
fn extract_buffers(
    kind: RequestKind,
    input: Option<Bytes>,
    output: Option<BytesMut>,
    bytes_transferred: usize,
) -> (Option<Bytes>, Option<Bytes>) {
    match kind {
        RequestKind::Read => {
            let output = output.map(|mut buffer| {
                debug_assert!(
                    bytes_transferred <= buffer.capacity(),
                    "target reported {} bytes into a {}-byte buffer",
                    bytes_transferred,
                    buffer.capacity()
                );
                buffer.truncate(bytes_transferred);
                buffer.freeze()
            });
            (None, output)
        }
        RequestKind::Write => {
            let input = input.map(|buffer| {
                let n = bytes_transferred.min(buffer.len());
                buffer.slice(..n)
            });
            (input, None)
        }
        RequestKind::Ioctl(_) | RequestKind::InternalIoctl(_) => {
            let output = output.map(|mut buffer| {
                debug_assert!(
                    bytes_transferred <= buffer.capacity(),
                    "target reported {} bytes into a {}-byte buffer",
                    bytes_transferred,
                    buffer.capacity()
                );
                buffer.truncate(bytes_transferred);
                buffer.freeze()
            });
            // Control input is reported in full.
            (input, output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with(data: &[u8], capacity: usize) -> BytesMut {
        let mut buffer = BytesMut::with_capacity(capacity);
        buffer.extend_from_slice(data);
        buffer
    }

    #[test]
    fn read_truncates_output() {
        let (input, output) = extract_buffers(
            RequestKind::Read,
            None,
            Some(output_with(&[1, 2, 3, 4, 5], 8)),
            3,
        );
        assert!(input.is_none());
        assert_eq!(&output.unwrap()[..], &[1, 2, 3]);
    }

    #[test]
    fn write_truncates_input_to_transferred() {
        let (input, output) = extract_buffers(
            RequestKind::Write,
            Some(Bytes::from_static(b"abcdef")),
            None,
            4,
        );
        assert_eq!(&input.unwrap()[..], b"abcd");
        assert!(output.is_none());
    }

    #[test]
    fn control_reports_full_input_and_truncated_output() {
        let (input, output) = extract_buffers(
            RequestKind::Ioctl(0x10),
            Some(Bytes::from_static(b"query")),
            Some(output_with(&[9; 64], 64)),
            40,
        );
        assert_eq!(&input.unwrap()[..], b"query");
        assert_eq!(output.unwrap().len(), 40);
    }

    #[test]
    fn absent_buffers_stay_absent() {
        let (input, output) = extract_buffers(RequestKind::InternalIoctl(1), None, None, 0);
        assert!(input.is_none());
        assert!(output.is_none());
    }

    #[test]
    fn completion_status_helpers() {
        let ok = Completion {
            status: 0,
            input: None,
            output: None,
        };
        assert!(ok.is_success());

        let cancelled = Completion {
            status: -libc::ECANCELED,
            input: None,
            output: None,
        };
        assert!(!cancelled.is_success());
        assert!(cancelled.is_cancelled());

        let timed_out = Completion {
            status: -libc::ETIMEDOUT,
            input: None,
            output: None,
        };
        assert!(timed_out.is_timed_out());
    }
}

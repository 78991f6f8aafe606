//! The request pipeline: allocate-or-reuse, format, track, submit, and
//! tear down.
//!
//! [`RequestTarget`] is the caller-facing type. It owns the pending and
//! reuse tables, the completion context pool, the deferred work queue, and
//! the activity gate; the target itself is a collaborator set by the owner
//! after construction and cleared before teardown.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::context_pool::{CompletionContext, ContextPool, CtxSlot};
use crate::dispatcher::{CompletionOption, SendCompletion, completion_hook};
use crate::error::Error;
use crate::gate::ActivityGate;
use crate::metrics::{
    CANCELS_MISSED, CANCELS_REQUESTED, CONTEXT_POOL_EXHAUSTED, REUSE_CONFLICTS, SEND_ASYNC,
    SEND_REJECTED, SEND_REUSE, SEND_SYNC,
};
use crate::registry::{PendingTable, ReuseTable};
use crate::request::{Request, RequestKind};
use crate::target::IoTarget;
use crate::token::{CancelId, ReuseId, next_unique_id};
use crate::workqueue::WorkQueue;

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Completion context pool slots. Bounds the number of asynchronous
    /// requests in flight at once.
    pub context_pool_size: u16,
    /// Maximum entries in the pending (cancellable in-flight) table.
    pub max_pending: usize,
    /// Maximum pre-created reusable requests.
    pub max_reuse: usize,
    /// Poll interval for the advisory registry-drain check at shutdown.
    pub drain_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            context_pool_size: 64,
            max_pending: 4096,
            max_reuse: 256,
            drain_poll_interval: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), Error> {
        if self.context_pool_size == 0 {
            return Err(Error::InvalidArgument("context_pool_size must be > 0"));
        }
        if self.max_pending == 0 {
            return Err(Error::InvalidArgument("max_pending must be > 0"));
        }
        if self.max_reuse == 0 {
            return Err(Error::InvalidArgument("max_reuse must be > 0"));
        }
        Ok(())
    }
}

/// Result of a synchronous send.
///
/// The output buffer round-trips through the pipeline, so the data comes
/// back here rather than being written in place.
pub struct SyncCompletion {
    /// Bytes transferred in the data direction of the request.
    pub bytes_transferred: usize,
    /// Output data, truncated to the transferred length.
    pub output: Option<Bytes>,
}

/// State shared between the pipeline and its in-flight completion hooks.
pub(crate) struct Shared {
    pub(crate) target: Mutex<Option<Arc<dyn IoTarget>>>,
    pub(crate) pending: PendingTable,
    pub(crate) reuse: ReuseTable,
    pub(crate) contexts: ContextPool,
    pub(crate) workqueue: WorkQueue,
    pub(crate) gate: Arc<ActivityGate>,
}

/// Asynchronous I/O request pipeline for one target.
///
/// Submits read/write/control requests, tracks in-flight requests so they
/// can be cancelled safely, hands out reusable request handles, and
/// dispatches completion results inline or deferred. All methods are safe
/// to call from multiple threads concurrently.
pub struct RequestTarget {
    shared: Arc<Shared>,
    drain_poll_interval: Duration,
}

impl RequestTarget {
    /// Create a pipeline with the given configuration.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(RequestTarget {
            shared: Arc::new(Shared {
                target: Mutex::new(None),
                pending: PendingTable::new(config.max_pending),
                reuse: ReuseTable::new(config.max_reuse),
                contexts: ContextPool::new(config.context_pool_size),
                workqueue: WorkQueue::new(),
                gate: ActivityGate::new(),
            }),
            drain_poll_interval: config.drain_poll_interval,
        })
    }

    /// Set the target requests are sent to. Must be called exactly once
    /// before the first send; setting a second target without clearing the
    /// first is a caller bug.
    pub fn set_target(&self, target: Arc<dyn IoTarget>) {
        let Some(_guard) = self.shared.gate.try_acquire() else {
            return;
        };
        let mut current = self.shared.target.lock().unwrap();
        debug_assert!(current.is_none(), "target already set");
        *current = Some(target);
    }

    /// Clear the target. Subsequent sends fail with [`Error::NoTarget`].
    /// Clearing when no target was ever set is permitted; teardown paths
    /// may run before the target asynchronously appeared.
    pub fn clear_target(&self) {
        let Some(_guard) = self.shared.gate.try_acquire() else {
            return;
        };
        *self.shared.target.lock().unwrap() = None;
    }

    // ── One-shot sends ──────────────────────────────────────────────────

    /// Submit an asynchronous one-shot request. Fire-and-forget: no cancel
    /// cookie is minted, so the request cannot be cancelled individually.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &self,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
        option: CompletionOption,
        on_complete: Option<SendCompletion>,
    ) -> Result<(), Error> {
        self.submit_oneshot(kind, input, output, timeout, option, on_complete, false)
            .map(|_| ())
    }

    /// Submit an asynchronous one-shot request and mint a cancel cookie
    /// for it.
    #[allow(clippy::too_many_arguments)]
    pub fn send_with_cancel(
        &self,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
        option: CompletionOption,
        on_complete: Option<SendCompletion>,
    ) -> Result<CancelId, Error> {
        self.submit_oneshot(kind, input, output, timeout, option, on_complete, true)
            .map(|id| id.expect("cancel cookie minted"))
    }

    /// Submit a request and block until the target completes it inline.
    ///
    /// No completion callback is involved (cancelling a call that blocks
    /// its own thread is meaningless, and so is a callback for a result
    /// that is returned directly); the request handle is always destroyed
    /// on return. A non-success final status maps to
    /// [`Error::RequestFailed`].
    pub fn send_sync(
        &self,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
    ) -> Result<SyncCompletion, Error> {
        let _guard = self.shared.gate.try_acquire().ok_or(Error::ShuttingDown)?;
        let target = self.current_target()?;
        let (input, output) = normalize_buffers(input, output);

        let request = Arc::new(Request::new_oneshot());
        request.format(kind, input, output, timeout)?;

        SEND_SYNC.increment();
        let params = target.submit_sync(&request, timeout);
        let (_, output) = request.take_buffers();

        if !params.is_success() {
            return Err(Error::RequestFailed(params.status));
        }

        let output = output.map(|mut buffer| {
            debug_assert!(params.bytes_transferred <= buffer.capacity());
            buffer.truncate(params.bytes_transferred);
            buffer.freeze()
        });
        Ok(SyncCompletion {
            bytes_transferred: params.bytes_transferred,
            output,
        })
    }

    // ── Reusable requests ───────────────────────────────────────────────

    /// Pre-create a reusable request and return its cookie. The handle
    /// lives until [`reuse_delete`](Self::reuse_delete).
    pub fn reuse_create(&self) -> Result<ReuseId, Error> {
        let _guard = self.shared.gate.try_acquire().ok_or(Error::ShuttingDown)?;
        let id = ReuseId(next_unique_id());
        let request = Arc::new(Request::new_reusable(id.0));
        self.shared.reuse.insert(request)?;
        Ok(id)
    }

    /// Delete a reusable request. Returns `false` if the cookie is unknown
    /// or the request is currently in flight (the pool search excludes
    /// in-flight handles, so deletion never force-cancels anything).
    ///
    /// No activity gate: deletion stays callable while teardown drains the
    /// reuse table.
    pub fn reuse_delete(&self, id: ReuseId) -> bool {
        self.shared.reuse.take_available(id).is_some()
    }

    /// Submit a pre-created reusable request. Fails with
    /// [`Error::AlreadyInUse`] if the request is still in flight from a
    /// previous send, and [`Error::UnknownId`] if the cookie does not
    /// match a live handle. On completion the request returns to the
    /// available state instead of being destroyed.
    #[allow(clippy::too_many_arguments)]
    pub fn reuse_send(
        &self,
        id: ReuseId,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
        option: CompletionOption,
        on_complete: Option<SendCompletion>,
    ) -> Result<(), Error> {
        self.submit_reuse(id, kind, input, output, timeout, option, on_complete, false)
            .map(|_| ())
    }

    /// [`reuse_send`](Self::reuse_send) with a cancel cookie minted for
    /// this submission cycle.
    #[allow(clippy::too_many_arguments)]
    pub fn reuse_send_with_cancel(
        &self,
        id: ReuseId,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
        option: CompletionOption,
        on_complete: Option<SendCompletion>,
    ) -> Result<CancelId, Error> {
        self.submit_reuse(id, kind, input, output, timeout, option, on_complete, true)
            .map(|id| id.expect("cancel cookie minted"))
    }

    // ── Cancellation ────────────────────────────────────────────────────

    /// Request best-effort cancellation of an in-flight request.
    ///
    /// Returns `false` if the cookie matches no live request (already
    /// completed, already cancelled, or never issued) — never an error.
    /// The reference grabbed during lookup keeps the handle alive across
    /// the cancel call even if the completion races in between.
    pub fn cancel(&self, id: CancelId) -> bool {
        let Some(_guard) = self.shared.gate.try_acquire() else {
            return false;
        };
        let Some(request) = self.shared.pending.find_and_reference(id) else {
            CANCELS_MISSED.increment();
            return false;
        };
        CANCELS_REQUESTED.increment();
        let Ok(target) = self.current_target() else {
            return false;
        };
        // The target may report false if the completion won the race;
        // that is expected, the real result arrives via the callback.
        target.cancel(&request)
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Stop accepting new sends and wait for outstanding work to drain.
    ///
    /// Outstanding completions are not an error; they are given until the
    /// deadline to arrive. Reusable requests must be deleted by their
    /// owners ([`reuse_delete`](Self::reuse_delete) remains callable while
    /// draining). Returns `true` if everything drained in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.shared.gate.close();
        let drained = self.shared.gate.drain(timeout);

        // Advisory registry check: the gate already covers in-flight
        // sends, but reuse handles are caller-owned and may still be
        // getting deleted.
        while !(self.shared.pending.is_empty() && self.shared.reuse.is_empty()) {
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(self.drain_poll_interval);
        }

        drained && self.shared.pending.is_empty() && self.shared.reuse.is_empty()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn current_target(&self) -> Result<Arc<dyn IoTarget>, Error> {
        self.shared
            .target
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NoTarget)
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_oneshot(
        &self,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
        option: CompletionOption,
        on_complete: Option<SendCompletion>,
        want_cancel: bool,
    ) -> Result<Option<CancelId>, Error> {
        let guard = self.shared.gate.try_acquire().ok_or(Error::ShuttingDown)?;
        let target = self.current_target()?;
        let (input, output) = normalize_buffers(input, output);

        let request = Arc::new(Request::new_oneshot());
        request.format(kind, input, output, timeout)?;

        let slot = self
            .shared
            .contexts
            .acquire(CompletionContext {
                callback: on_complete,
                kind,
                reuse: false,
            })
            .inspect_err(|_| CONTEXT_POOL_EXHAUSTED.increment())?;

        let cancel_id = match self.register_for_cancel(&request, want_cancel) {
            Ok(id) => id,
            Err(err) => {
                self.release_slot(slot);
                return Err(err);
            }
        };

        request.install_hook(completion_hook(
            Arc::clone(&self.shared),
            Arc::clone(&request),
            slot,
            option,
            guard,
        ));

        SEND_ASYNC.increment();
        if let Err(err) = target.submit(&request, timeout) {
            SEND_REJECTED.increment();
            self.rollback_failed_submit(&request, slot);
            return Err(err);
        }
        // Ownership has passed to the in-flight state; final disposition
        // happens in the dispatcher.
        Ok(cancel_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_reuse(
        &self,
        id: ReuseId,
        kind: RequestKind,
        input: Option<Bytes>,
        output: Option<BytesMut>,
        timeout: Option<Duration>,
        option: CompletionOption,
        on_complete: Option<SendCompletion>,
        want_cancel: bool,
    ) -> Result<Option<CancelId>, Error> {
        let guard = self.shared.gate.try_acquire().ok_or(Error::ShuttingDown)?;
        let target = self.current_target()?;

        let request = self.shared.reuse.find_and_reserve(id).inspect_err(|err| {
            if matches!(err, Error::AlreadyInUse) {
                REUSE_CONFLICTS.increment();
            }
        })?;
        let (input, output) = normalize_buffers(input, output);

        // Reinitialize the handle for this cycle.
        request.reset();
        if let Err(err) = request.format(kind, input, output, timeout) {
            request.set_in_use(false);
            return Err(err);
        }

        let slot = match self.shared.contexts.acquire(CompletionContext {
            callback: on_complete,
            kind,
            reuse: true,
        }) {
            Ok(slot) => slot,
            Err(err) => {
                CONTEXT_POOL_EXHAUSTED.increment();
                let _ = request.take_buffers();
                request.set_in_use(false);
                return Err(err);
            }
        };

        let cancel_id = match self.register_for_cancel(&request, want_cancel) {
            Ok(id) => id,
            Err(err) => {
                self.release_slot(slot);
                let _ = request.take_buffers();
                request.set_in_use(false);
                return Err(err);
            }
        };

        request.install_hook(completion_hook(
            Arc::clone(&self.shared),
            Arc::clone(&request),
            slot,
            option,
            guard,
        ));

        SEND_REUSE.increment();
        if let Err(err) = target.submit(&request, timeout) {
            SEND_REJECTED.increment();
            self.rollback_failed_submit(&request, slot);
            // The handle itself survives a failed submission; only this
            // cycle is undone.
            request.set_in_use(false);
            return Err(err);
        }
        Ok(cancel_id)
    }

    /// Mint a cancel cookie and register the request in the pending table.
    fn register_for_cancel(
        &self,
        request: &Arc<Request>,
        want_cancel: bool,
    ) -> Result<Option<CancelId>, Error> {
        if !want_cancel {
            return Ok(None);
        }
        let id = CancelId(next_unique_id());
        request.set_cancel_id(id.0);
        self.shared.pending.insert(Arc::clone(request))?;
        Ok(Some(id))
    }

    /// Undo the side effects of a submission the target refused: reclaim
    /// the unfired hook (which releases the activity guard), drop the
    /// pending entry, detach buffers, and free the context slot.
    fn rollback_failed_submit(&self, request: &Arc<Request>, slot: CtxSlot) {
        let hook = request.take_hook();
        debug_assert!(hook.is_some(), "target rejected submit but fired the hook");
        drop(hook);
        self.shared.pending.remove(request);
        let _ = request.take_buffers();
        self.release_slot(slot);
    }

    fn release_slot(&self, slot: CtxSlot) {
        let _ = self.shared.contexts.take(slot);
        self.shared.contexts.release(slot);
    }
}

impl Drop for RequestTarget {
    fn drop(&mut self) {
        // Best-effort drain; owners that need a deterministic outcome call
        // shutdown() themselves.
        self.shared.gate.close();
        self.shared.gate.drain(Duration::from_secs(5));
    }
}

/// Zero-length buffers are legal and mean "no buffer of that direction".
fn normalize_buffers(
    input: Option<Bytes>,
    output: Option<BytesMut>,
) -> (Option<Bytes>, Option<BytesMut>) {
    (
        input.filter(|b| !b.is_empty()),
        output.filter(|b| b.capacity() > 0),
    )
}

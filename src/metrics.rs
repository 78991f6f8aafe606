//! Pipeline metrics.
//!
//! Counters for sends, completions, cancellation, and pool pressure.
//! Exposed through `metriken` when registered with an exposition endpoint.

use crate::counter::{Counter, CounterGroup};
use metriken::metric;

// Counter groups (sharded storage, see counter.rs).
static SEND: CounterGroup = CounterGroup::new();
static COMPLETE: CounterGroup = CounterGroup::new();
static CANCEL: CounterGroup = CounterGroup::new();
static POOL: CounterGroup = CounterGroup::new();

/// Counter slot indices for send metrics.
pub mod send {
    pub const ASYNC: usize = 0;
    pub const SYNC: usize = 1;
    pub const REUSE: usize = 2;
    pub const REJECTED: usize = 3;
}

/// Counter slot indices for completion metrics.
pub mod complete {
    pub const DELIVERED: usize = 0;
    pub const DEFERRED: usize = 1;
    pub const FAILED_STATUS: usize = 2;
}

/// Counter slot indices for cancellation metrics.
pub mod cancel {
    pub const REQUESTED: usize = 0;
    pub const MISSED: usize = 1;
}

/// Counter slot indices for pool pressure metrics.
pub mod pool {
    pub const CONTEXT_EXHAUSTED: usize = 0;
    pub const REUSE_CONFLICT: usize = 1;
    pub const DEFERRED_JOB_FAILED: usize = 2;
}

// ── Sends ────────────────────────────────────────────────────────

#[metric(
    name = "reqline/send/async",
    description = "Asynchronous one-shot requests submitted"
)]
pub static SEND_ASYNC: Counter = Counter::new(&SEND, send::ASYNC);

#[metric(
    name = "reqline/send/sync",
    description = "Synchronous requests submitted"
)]
pub static SEND_SYNC: Counter = Counter::new(&SEND, send::SYNC);

#[metric(
    name = "reqline/send/reuse",
    description = "Reusable-request submissions"
)]
pub static SEND_REUSE: Counter = Counter::new(&SEND, send::REUSE);

#[metric(
    name = "reqline/send/rejected",
    description = "Submissions refused by the target"
)]
pub static SEND_REJECTED: Counter = Counter::new(&SEND, send::REJECTED);

// ── Completions ──────────────────────────────────────────────────

#[metric(
    name = "reqline/complete/delivered",
    description = "Completions processed by the dispatcher"
)]
pub static COMPLETIONS_DELIVERED: Counter = Counter::new(&COMPLETE, complete::DELIVERED);

#[metric(
    name = "reqline/complete/deferred",
    description = "Completions routed through the deferred work queue"
)]
pub static COMPLETIONS_DEFERRED: Counter = Counter::new(&COMPLETE, complete::DEFERRED);

#[metric(
    name = "reqline/complete/failed_status",
    description = "Completions delivered with a non-success status"
)]
pub static COMPLETIONS_FAILED_STATUS: Counter = Counter::new(&COMPLETE, complete::FAILED_STATUS);

// ── Cancellation ─────────────────────────────────────────────────

#[metric(
    name = "reqline/cancel/requested",
    description = "Cancel calls that found a live request"
)]
pub static CANCELS_REQUESTED: Counter = Counter::new(&CANCEL, cancel::REQUESTED);

#[metric(
    name = "reqline/cancel/missed",
    description = "Cancel calls whose cookie matched no live request"
)]
pub static CANCELS_MISSED: Counter = Counter::new(&CANCEL, cancel::MISSED);

// ── Pool pressure ────────────────────────────────────────────────

#[metric(
    name = "reqline/pool/context_exhausted",
    description = "Completion context pool exhaustion events"
)]
pub static CONTEXT_POOL_EXHAUSTED: Counter = Counter::new(&POOL, pool::CONTEXT_EXHAUSTED);

#[metric(
    name = "reqline/pool/reuse_conflict",
    description = "Reuse sends refused because the request was in flight"
)]
pub static REUSE_CONFLICTS: Counter = Counter::new(&POOL, pool::REUSE_CONFLICT);

#[metric(
    name = "reqline/workqueue/job_failures",
    description = "Deferred jobs that reported failure via enqueue_tracked"
)]
pub static DEFERRED_JOB_FAILURES: Counter = Counter::new(&POOL, pool::DEFERRED_JOB_FAILED);

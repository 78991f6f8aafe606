//! Process-wide unique id generation for cancel and reuse cookies.
//!
//! Request handles can be recycled by the allocator, so a handle's identity
//! (its address) is not a safe key for cancellation. Instead every
//! submission that wants cancellation, and every reusable request at
//! creation time, is tagged with a value from a single process-wide
//! monotonically increasing 64-bit counter. A cookie therefore matches at
//! most one live request for the lifetime of the process, even if the
//! underlying handle memory is reused.
//!
//! One counter serves both cookie namespaces; they are only ever compared
//! within their own table, so they do not need to be disjoint.

use std::sync::atomic::{AtomicU64, Ordering};

/// Initialized once at process start, never reset. Shared by every
/// [`RequestTarget`](crate::RequestTarget) instance. Wrap-around after
/// 2^64 allocations is treated as impossible.
static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Mint the next unique id. Lock-free and wait-free.
#[inline]
pub(crate) fn next_unique_id() -> u64 {
    NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opaque cookie identifying one in-flight asynchronous request for
/// cancellation.
///
/// Returned by the `*_with_cancel` send methods and passed back to
/// [`RequestTarget::cancel`](crate::RequestTarget::cancel). Stale cookies
/// are harmless: cancel of an already-completed request returns `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelId(pub(crate) u64);

/// Opaque cookie identifying a pre-created reusable request across send
/// cycles.
///
/// Returned by [`RequestTarget::reuse_create`](crate::RequestTarget::reuse_create)
/// and stable until [`reuse_delete`](crate::RequestTarget::reuse_delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReuseId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic() {
        let a = next_unique_id();
        let b = next_unique_id();
        let c = next_unique_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn distinct_across_threads() {
        use std::collections::HashSet;
        use std::thread;

        let per_thread = 10_000;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                thread::spawn(move || {
                    (0..per_thread).map(|_| next_unique_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4 * per_thread);
    }
}

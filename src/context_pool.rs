//! Fixed-size pool of per-request completion contexts.
//!
//! One context is acquired before every asynchronous send and released
//! after the caller's callback returns. The pool is a slab with a free
//! list: acquire and release are O(1) pointer manipulation, never blocking,
//! because they run on the completion path.

use std::sync::Mutex;

use crate::dispatcher::SendCompletion;
use crate::error::Error;
use crate::request::RequestKind;

/// Per-request completion bookkeeping: which callback to invoke, the kind
/// (which decides buffer extraction), and whether the request is preserved
/// for reuse or destroyed after this completion.
pub(crate) struct CompletionContext {
    pub callback: Option<SendCompletion>,
    pub kind: RequestKind,
    pub reuse: bool,
}

/// Opaque tag for an acquired pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CtxSlot(u16);

struct PoolInner {
    records: Vec<Option<CompletionContext>>,
    free: Vec<u16>,
}

/// Slab of [`CompletionContext`] records with a free list.
pub(crate) struct ContextPool {
    inner: Mutex<PoolInner>,
}

impl ContextPool {
    pub fn new(capacity: u16) -> Self {
        let mut records = Vec::with_capacity(capacity as usize);
        let mut free = Vec::with_capacity(capacity as usize);
        for i in (0..capacity).rev() {
            records.push(None);
            free.push(i);
        }
        ContextPool {
            inner: Mutex::new(PoolInner { records, free }),
        }
    }

    /// Store a context and return its slot tag. Fails when the pool is
    /// exhausted; the send that triggered this rolls back and reports the
    /// exhaustion to the caller.
    pub fn acquire(&self, context: CompletionContext) -> Result<CtxSlot, Error> {
        let mut inner = self.inner.lock().unwrap();
        let index = inner.free.pop().ok_or(Error::ContextPoolExhausted)?;
        debug_assert!(inner.records[index as usize].is_none());
        inner.records[index as usize] = Some(context);
        Ok(CtxSlot(index))
    }

    /// Remove the record from a slot. The slot stays reserved until
    /// [`release`](Self::release); the dispatcher takes the record before
    /// invoking the callback and releases the slot afterwards.
    pub fn take(&self, slot: CtxSlot) -> CompletionContext {
        let mut inner = self.inner.lock().unwrap();
        inner.records[slot.0 as usize]
            .take()
            .expect("context slot empty")
    }

    /// Return a slot to the free list.
    pub fn release(&self, slot: CtxSlot) {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(inner.records[slot.0 as usize].is_none());
        inner.free.push(slot.0);
    }

    #[cfg(test)]
    fn free_slots(&self) -> usize {
        self.inner.lock().unwrap().free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CompletionContext {
        CompletionContext {
            callback: None,
            kind: RequestKind::Read,
            reuse: false,
        }
    }

    #[test]
    fn acquire_take_release_cycle() {
        let pool = ContextPool::new(2);
        let slot = pool.acquire(context()).unwrap();
        assert_eq!(pool.free_slots(), 1);

        let record = pool.take(slot);
        assert!(record.callback.is_none());
        assert!(!record.reuse);
        // Slot still reserved until release.
        assert_eq!(pool.free_slots(), 1);

        pool.release(slot);
        assert_eq!(pool.free_slots(), 2);
    }

    #[test]
    fn exhaustion() {
        let pool = ContextPool::new(1);
        let slot = pool.acquire(context()).unwrap();
        assert!(matches!(
            pool.acquire(context()),
            Err(Error::ContextPoolExhausted)
        ));
        pool.take(slot);
        pool.release(slot);
        assert!(pool.acquire(context()).is_ok());
    }
}

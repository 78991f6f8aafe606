//! In-flight and reusable request tables.
//!
//! Both tables are short-held-mutex collections of `Arc<Request>`. Lookups
//! by cookie do their side effect (reference grab, `in_use` reservation)
//! while still holding the lock; that closes the race between "find" and
//! "use" against a concurrent completion. No I/O or callback invocation
//! ever happens under a table lock.

use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::request::Request;
use crate::token::{CancelId, ReuseId};

/// The set of currently in-flight asynchronous requests.
///
/// Entries are added at submission time (only when the caller asked for a
/// cancel cookie) and removed at completion or failed-submission rollback.
pub(crate) struct PendingTable {
    entries: Mutex<Vec<Arc<Request>>>,
    capacity: usize,
}

impl PendingTable {
    pub fn new(capacity: usize) -> Self {
        PendingTable {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Add a request. A request appears at most once; inserting a handle
    /// that is already present is a pipeline bug.
    pub fn insert(&self, request: Arc<Request>) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            return Err(Error::RegistryFull);
        }
        debug_assert!(
            !entries.iter().any(|r| Arc::ptr_eq(r, &request)),
            "request already pending"
        );
        entries.push(request);
        Ok(())
    }

    /// Remove a request if present. The entry may legitimately be absent:
    /// the completion path removes it, and so does failed-submission
    /// rollback.
    pub fn remove(&self, request: &Arc<Request>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter().position(|r| Arc::ptr_eq(r, request)) {
            Some(index) => {
                entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Find the live request matching `id` and clone its `Arc` while still
    /// holding the lock.
    ///
    /// The clone is the safety reference: even if the request completes and
    /// is removed from the table immediately after the lock is released,
    /// the caller still holds the handle alive and can safely pass it to
    /// the target's cancel.
    pub fn find_and_reference(&self, id: CancelId) -> Option<Arc<Request>> {
        if id.0 == 0 {
            return None;
        }
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .find(|r| r.cancel_id() == id.0)
            .map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The set of pre-created reusable requests, keyed by reuse cookie.
///
/// Entries are added by `reuse_create` and removed by `reuse_delete`.
pub(crate) struct ReuseTable {
    entries: Mutex<Vec<Arc<Request>>>,
    capacity: usize,
}

impl ReuseTable {
    pub fn new(capacity: usize) -> Self {
        ReuseTable {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn insert(&self, request: Arc<Request>) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            return Err(Error::RegistryFull);
        }
        entries.push(request);
        Ok(())
    }

    /// Find the request matching `id` and mark it exclusively in-use,
    /// atomically under the table lock.
    ///
    /// Resending a request that is still in flight is an error, not
    /// silently proceeding: `AlreadyInUse` is distinct from `UnknownId` so
    /// the caller can tell a stale cookie from a premature resend.
    pub fn find_and_reserve(&self, id: ReuseId) -> Result<Arc<Request>, Error> {
        let entries = self.entries.lock().unwrap();
        let request = entries
            .iter()
            .find(|r| r.reuse_id() == id.0)
            .ok_or(Error::UnknownId)?;
        if request.is_in_use() {
            return Err(Error::AlreadyInUse);
        }
        request.set_in_use(true);
        Ok(Arc::clone(request))
    }

    /// Remove the request matching `id`, excluding one that is in flight.
    /// Used by reuse-delete: the exclusion means deletion never has to
    /// force-cancel anything.
    pub fn take_available(&self, id: ReuseId) -> Option<Arc<Request>> {
        let mut entries = self.entries.lock().unwrap();
        let index = entries
            .iter()
            .position(|r| r.reuse_id() == id.0 && !r.is_in_use())?;
        Some(entries.swap_remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

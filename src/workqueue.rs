//! Deferred work queue: runs jobs once, on a thread where blocking is
//! permitted.
//!
//! Completion hooks may fire in restricted contexts (a target's interrupt
//! or reactor thread). When the caller asked for deferred completion, the
//! hook only captures the raw completion parameters and hands the rest of
//! the work to this queue. Delivery is FIFO per queue instance; there is no
//! ordering guarantee between different queues.
//!
//! Two enqueue operations exist on purpose. [`WorkQueue::enqueue`] discards
//! the job's failure signal (matching the long-standing behavior callers
//! depend on), while [`WorkQueue::enqueue_tracked`] records a failed job in
//! [`metrics::DEFERRED_JOB_FAILURES`](crate::metrics::DEFERRED_JOB_FAILURES).
//! Pick per call site rather than guessing.

use std::thread;

use crate::error::Error;
use crate::metrics::DEFERRED_JOB_FAILURES;

type Job = Box<dyn FnOnce() -> Result<(), Error> + Send + 'static>;

/// A single worker thread draining a FIFO job channel.
pub(crate) struct WorkQueue {
    tx: Option<crossbeam_channel::Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name("reqline-workqueue".to_string())
            .spawn(move || {
                for job in rx.iter() {
                    if job().is_err() {
                        DEFERRED_JOB_FAILURES.increment();
                    }
                }
            })
            .expect("spawn workqueue thread");
        WorkQueue {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Enqueue a job whose outcome is deliberately discarded.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(move || {
            job();
            Ok(())
        }));
    }

    /// Enqueue a fallible job; a failure increments the job-failure metric.
    pub fn enqueue_tracked<F>(&self, job: F)
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        self.push(Box::new(job));
    }

    fn push(&self, job: Job) {
        // Send fails only after shutdown closed the channel; in-flight
        // completions are drained before shutdown, so this is unreachable
        // in correct teardown order.
        if let Some(tx) = &self.tx {
            let _ = tx.send(job);
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Close the channel so the worker exits after draining, then join.
        // A deferred job may hold the last reference to the owning state, in
        // which case this drop runs on the worker itself; a thread cannot
        // join itself, and the loop exits on its own once the channel closes.
        drop(self.tx.take());
        if let Some(handle) = self.handle.take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }
}

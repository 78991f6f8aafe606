//! Shared test double for the pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqline::{CompletionParams, Error, IoTarget, Request, RequestKind};

/// How the mock services submissions.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Complete inline, echoing the input payload into the output buffer.
    Echo,
    /// Stash the request; the test completes it later via
    /// [`MockTarget::complete_held`].
    Hold,
    /// Refuse the submission without firing the hook.
    Reject,
    /// Complete inline with the given non-success status.
    Fail(i32),
}

/// An in-process [`IoTarget`] with scriptable behavior.
pub struct MockTarget {
    mode: Mutex<Mode>,
    held: Mutex<Vec<Arc<Request>>>,
    submits: AtomicUsize,
    cancels: AtomicUsize,
}

impl MockTarget {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(MockTarget {
            mode: Mutex::new(mode),
            held: Mutex::new(Vec::new()),
            submits: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        })
    }

    pub fn echo() -> Arc<Self> {
        Self::new(Mode::Echo)
    }

    pub fn hold() -> Arc<Self> {
        Self::new(Mode::Hold)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Complete every held request with a success status, echoing input
    /// into output first.
    pub fn complete_held(&self) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for request in held {
            let params = echo_params(&request);
            request.complete(params);
        }
    }
}

fn echo_params(request: &Arc<Request>) -> CompletionParams {
    let echoed = match request.input() {
        // A write has no output buffer to echo into; the whole payload is
        // consumed by the target.
        Some(input) if request.kind() == RequestKind::Write => input.len(),
        Some(input) => request.write_output(&input),
        None => 0,
    };
    CompletionParams {
        status: 0,
        bytes_transferred: echoed,
    }
}

impl IoTarget for MockTarget {
    fn submit(&self, request: &Arc<Request>, _timeout: Option<Duration>) -> Result<(), Error> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Reject => return Err(Error::Rejected(-libc::EIO)),
            Mode::Echo => {
                self.submits.fetch_add(1, Ordering::SeqCst);
                let params = echo_params(request);
                request.complete(params);
            }
            Mode::Hold => {
                self.submits.fetch_add(1, Ordering::SeqCst);
                self.held.lock().unwrap().push(Arc::clone(request));
            }
            Mode::Fail(status) => {
                self.submits.fetch_add(1, Ordering::SeqCst);
                request.complete(CompletionParams {
                    status,
                    bytes_transferred: 0,
                });
            }
        }
        Ok(())
    }

    fn submit_sync(&self, request: &Arc<Request>, _timeout: Option<Duration>) -> CompletionParams {
        let mode = *self.mode.lock().unwrap();
        self.submits.fetch_add(1, Ordering::SeqCst);
        match mode {
            Mode::Fail(status) => CompletionParams {
                status,
                bytes_transferred: 0,
            },
            _ => echo_params(request),
        }
    }

    fn cancel(&self, request: &Arc<Request>) -> bool {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.lock().unwrap();
        let Some(index) = held.iter().position(|r| Arc::ptr_eq(r, request)) else {
            return false;
        };
        let request = held.swap_remove(index);
        drop(held);
        request.complete(CompletionParams {
            status: -libc::ECANCELED,
            bytes_transferred: 0,
        });
        true
    }
}

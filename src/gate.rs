//! Activity gate: a reentrant usage count on one pipeline instance.
//!
//! Every send and cancel acquires the gate before doing any work; the
//! acquisition taken at submission time is held (inside the completion
//! hook) until the dispatcher finishes. Teardown closes the gate so new
//! work is refused, then waits for the count to reach zero. The wait is a
//! condition-variable handshake, not a sleep/poll loop, so drain completes
//! deterministically as the last completion releases its guard.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct GateState {
    active: u64,
    closed: bool,
}

pub(crate) struct ActivityGate {
    state: Mutex<GateState>,
    drained: Condvar,
}

/// Holds one unit of activity; releasing is dropping.
pub(crate) struct ActivityGuard {
    gate: Arc<ActivityGate>,
}

impl ActivityGate {
    pub fn new() -> Arc<Self> {
        Arc::new(ActivityGate {
            state: Mutex::new(GateState {
                active: 0,
                closed: false,
            }),
            drained: Condvar::new(),
        })
    }

    /// Acquire a unit of activity. Fails once the gate has been closed.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ActivityGuard> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return None;
        }
        state.active += 1;
        Some(ActivityGuard {
            gate: Arc::clone(self),
        })
    }

    /// Refuse all further acquisitions.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Wait until the active count reaches zero or the deadline passes.
    /// Returns `true` if fully drained.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while state.active > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, wait) = self
                .drained
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
            if wait.timed_out() && state.active > 0 {
                return false;
            }
        }
        true
    }

    #[cfg(test)]
    pub fn active(&self) -> u64 {
        self.state.lock().unwrap().active
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock().unwrap();
        state.active -= 1;
        if state.active == 0 {
            self.gate.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn acquire_release() {
        let gate = ActivityGate::new();
        let guard = gate.try_acquire().unwrap();
        assert_eq!(gate.active(), 1);
        drop(guard);
        assert_eq!(gate.active(), 0);
    }

    #[test]
    fn closed_gate_refuses() {
        let gate = ActivityGate::new();
        gate.close();
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn drain_waits_for_outstanding_guard() {
        let gate = ActivityGate::new();
        let guard = gate.try_acquire().unwrap();
        gate.close();

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(guard);
        });

        assert!(gate.drain(Duration::from_secs(5)));
        releaser.join().unwrap();
    }

    #[test]
    fn drain_times_out() {
        let gate = ActivityGate::new();
        let _guard = gate.try_acquire().unwrap();
        assert!(!gate.drain(Duration::from_millis(20)));
    }
}

//! Sharded counters backing the pipeline metrics.
//!
//! Sends, completions, and cancels may run on many unrelated caller and
//! completion threads at once, so each counter spreads its storage across
//! cache-line-sized shards selected per thread. Reads sum the shards.
//! [`Counter`] implements [`metriken::Metric`] for exposition.

use std::sync::atomic::{AtomicU64, Ordering};

const CACHE_LINE: usize = 128;
const SLOTS: usize = CACHE_LINE / 8; // 16 counters per cache line
const NUM_SHARDS: usize = 64;

#[repr(C, align(128))]
struct Shard {
    slots: [AtomicU64; SLOTS],
}

/// Sharded storage for up to 16 counters.
///
/// Threads hash to shards by TLS address, so concurrent writers on
/// different threads rarely contend on the same cache line.
pub struct CounterGroup {
    shards: [Shard; NUM_SHARDS],
}

impl CounterGroup {
    #[allow(clippy::declare_interior_mutable_const)]
    pub const fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        const SHARD: Shard = Shard {
            slots: [ZERO; SLOTS],
        };
        Self {
            shards: [SHARD; NUM_SHARDS],
        }
    }

    #[inline]
    fn add(&self, slot: usize, value: u64) {
        debug_assert!(slot < SLOTS, "slot index out of bounds");
        self.shards[shard_index()].slots[slot].fetch_add(value, Ordering::Relaxed);
    }

    fn value(&self, slot: usize) -> u64 {
        debug_assert!(slot < SLOTS, "slot index out of bounds");
        self.shards
            .iter()
            .map(|s| s.slots[slot].load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for CounterGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// A counter referencing one slot in a [`CounterGroup`].
pub struct Counter {
    group: &'static CounterGroup,
    slot: usize,
}

impl Counter {
    pub const fn new(group: &'static CounterGroup, slot: usize) -> Self {
        Self { group, slot }
    }

    /// Increment the counter by 1.
    #[inline]
    pub fn increment(&self) {
        self.group.add(self.slot, 1);
    }

    /// Add a value to the counter.
    #[inline]
    pub fn add(&self, value: u64) {
        self.group.add(self.slot, value);
    }

    /// Current value, aggregated across all shards.
    pub fn value(&self) -> u64 {
        self.group.value(self.slot)
    }
}

impl metriken::Metric for Counter {
    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn value(&self) -> Option<metriken::Value<'_>> {
        Some(metriken::Value::Counter(Counter::value(self)))
    }
}

/// Shard index for the current thread: a hash of a TLS address, stable for
/// the thread's lifetime.
#[inline]
fn shard_index() -> usize {
    thread_local! {
        static ID: u8 = const { 0 };
    }
    ID.with(|x| x as *const u8 as usize) % NUM_SHARDS
}

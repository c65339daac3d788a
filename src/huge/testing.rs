//! Test doubles for the cache's collaborators: a steppable clock, a
//! bump-pointer upstream allocator, and an unback recorder that can be told
//! to refuse. Shared by the unit tests and the end-to-end scenarios.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use super::cache::{HugeAllocator, HugeCache};
use super::clock::CacheClock;
use super::pages::{HugeLength, HugeRange};
use super::unback::MemoryUnback;

/// Deterministic clock at 1000 ticks per second, stepped explicitly.
pub(crate) struct MockClock {
    ticks: Cell<i64>,
}

impl MockClock {
    pub fn new() -> Self {
        MockClock { ticks: Cell::new(0) }
    }

    pub fn advance(&self, d: Duration) {
        let step = (d.as_secs_f64() * self.freq()) as i64;
        self.ticks.set(self.ticks.get() + step);
    }
}

impl CacheClock for MockClock {
    fn now(&self) -> i64 {
        self.ticks.get()
    }

    fn freq(&self) -> f64 {
        1000.0
    }
}

/// Bump-pointer upstream: grants are consecutive (so two back-to-back grants
/// coalesce on release), always reported as unbacked, and permanent returns
/// are recorded.
pub(crate) struct MockBackingAllocator {
    next_page: usize,
    released: Vec<HugeRange>,
    exhausted: bool,
}

impl MockBackingAllocator {
    pub fn new() -> Self {
        MockBackingAllocator {
            next_page: 0,
            released: Vec::new(),
            exhausted: false,
        }
    }

    /// Make further `get` calls fail, as a fragmented or full system would.
    pub fn exhaust(&mut self) {
        self.exhausted = true;
    }

    /// Total hugepages ever granted.
    pub fn granted_pages(&self) -> usize {
        self.next_page
    }

    /// Total hugepages permanently returned.
    pub fn released_pages(&self) -> usize {
        self.released.iter().map(|r| r.len().raw()).sum()
    }
}

impl HugeAllocator for MockBackingAllocator {
    fn get(&mut self, n: HugeLength) -> Option<(HugeRange, bool)> {
        if self.exhausted {
            return None;
        }
        let start = self.next_page;
        self.next_page += n.raw();
        Some((HugeRange::from_raw(start, n.raw()), true))
    }

    fn release(&mut self, r: HugeRange) {
        self.released.push(r);
    }
}

/// Shared handle onto a [`MockUnback`], usable while the cache holds the
/// mock by mutable reference.
#[derive(Clone)]
pub(crate) struct UnbackCounters {
    unbacked: Rc<Cell<usize>>,
    fail: Rc<Cell<bool>>,
}

impl UnbackCounters {
    /// Total hugepages successfully unbacked.
    pub fn unbacked(&self) -> usize {
        self.unbacked.get()
    }

    /// Make subsequent unback calls refuse (memory pressure).
    pub fn fail_unbacks(&self, fail: bool) {
        self.fail.set(fail);
    }
}

pub(crate) struct MockUnback {
    counters: UnbackCounters,
}

impl MockUnback {
    pub fn new() -> Self {
        MockUnback {
            counters: UnbackCounters {
                unbacked: Rc::new(Cell::new(0)),
                fail: Rc::new(Cell::new(false)),
            },
        }
    }

    pub fn counters(&self) -> UnbackCounters {
        self.counters.clone()
    }
}

impl MemoryUnback for MockUnback {
    fn unback(&mut self, r: HugeRange) -> bool {
        if self.counters.fail.get() {
            return false;
        }
        self.counters
            .unbacked
            .set(self.counters.unbacked.get() + r.len().raw());
        true
    }
}

pub(crate) type TestCache<'u, 'c> = HugeCache<'u, MockBackingAllocator, &'c MockClock>;

/// A cache over the mocks with the default 1 s cache time.
pub(crate) fn new_cache<'u, 'c>(
    unback: &'u mut MockUnback,
    clock: &'c MockClock,
) -> TestCache<'u, 'c> {
    HugeCache::new(
        MockBackingAllocator::new(),
        unback,
        clock,
        Duration::from_secs(1),
    )
}

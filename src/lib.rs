//! Hot cache of backed hugepages, sitting between an upstream hugepage
//! allocator and the rest of a page heap.
//!
//! The cache keeps recently released runs in backed form so they can be
//! handed straight back, coalesces free runs by address, and adaptively
//! sizes itself against observed demand: growing its limit on misses the
//! working set should have covered, shrinking it once a doubled observation
//! window shows the capacity was never needed, and proactively unbacking
//! free pages that recent demand history says will not be missed.
//!
//! The crate assumes the caller serializes every entry point behind its own
//! page-heap lock; nothing here locks or spins.

#[cfg(not(target_pointer_width = "64"))]
compile_error!("hugecache supports only 64-bit targets.");

pub mod huge;

// core types
pub use huge::{HugeLength, HugePage, HugeRange, HUGE_PAGE_BYTES};

// the cache and its capabilities
pub use huge::SkipSubreleaseIntervals;
pub use huge::{CacheClock, HugeAllocator, HugeCache, MemoryUnback, MonotonicClock};
#[cfg(unix)]
pub use huge::{MadviseUnback, UnbackError};

// observability
pub use huge::{BackingStats, CacheSnapshot, LargeSpanStats};

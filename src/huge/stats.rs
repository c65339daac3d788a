use super::pages::HugeLength;

/// Byte-denominated view of the cache for the page heap's stats roll-up.
/// Everything the cache holds is backed, so `unmapped_bytes` is always zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackingStats {
    /// Bytes borrowed from the upstream allocator and not yet returned
    /// (in use by callers plus cached).
    pub system_bytes: usize,
    /// Bytes cached and immediately reusable.
    pub free_bytes: usize,
    pub unmapped_bytes: usize,
}

/// Census of the free runs held by the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LargeSpanStats {
    /// Number of free runs.
    pub spans: usize,
    /// Total hugepages across them.
    pub pages: HugeLength,
}

/// Point-in-time dump of every cache counter plus windowed statistics; the
/// machine-readable counterpart of the text stats block.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheSnapshot {
    pub size: HugeLength,
    pub limit: HugeLength,
    pub usage: HugeLength,

    pub hits: usize,
    pub misses: usize,
    pub fills: usize,
    pub overflows: usize,
    pub weighted_hits: u64,
    pub weighted_misses: u64,

    pub total_fast_unbacked: HugeLength,
    pub total_periodic_unbacked: HugeLength,

    /// Extremes of the cache size over the last ten minutes.
    pub size_min_10min: HugeLength,
    pub size_max_10min: HugeLength,

    /// Demand history over the five-minute summary window.
    pub demand_min_5min: HugeLength,
    pub demand_max_5min: HugeLength,
    pub free_min_5min: HugeLength,
    pub free_max_5min: HugeLength,
    pub subreleased_5min: HugeLength,
}

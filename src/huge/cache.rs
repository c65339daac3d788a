use std::fmt;
use std::time::Duration;

use log::{debug, warn};

use super::address_map::HugeAddressMap;
use super::clock::CacheClock;
use super::demand::{DemandSample, DemandTracker};
use super::minmax::MinMaxTracker;
use super::pages::{HugeLength, HugeRange};
use super::stats::{BackingStats, CacheSnapshot, LargeSpanStats};
use super::unback::MemoryUnback;

/// Upstream source of hugepage ranges and sink for permanent returns.
///
/// `get` hands out `n` contiguous hugepages, or `None` when the address
/// space is exhausted. The `bool` is true when the range is not currently
/// backed by the kernel and the caller must back it before use.
pub trait HugeAllocator {
    fn get(&mut self, n: HugeLength) -> Option<(HugeRange, bool)>;
    fn release(&mut self, r: HugeRange);
}

/// Demand-history windows for demand-based release. A zero interval is
/// disabled; with both short and long intervals zero the demand check is off
/// entirely and release degrades to the unconditional path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SkipSubreleaseIntervals {
    pub short_interval: Duration,
    pub long_interval: Duration,
    /// Bounds the peak so one ancient spike cannot block release forever.
    pub cap_interval: Duration,
}

impl Default for SkipSubreleaseIntervals {
    fn default() -> Self {
        SkipSubreleaseIntervals {
            short_interval: Duration::ZERO,
            long_interval: Duration::ZERO,
            cap_interval: CAP_DEMAND_INTERVAL,
        }
    }
}

impl SkipSubreleaseIntervals {
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.short_interval.is_zero() || !self.long_interval.is_zero()
    }
}

// A good baseline for the cache: easily wiped away by periodic release, and
// not much memory on any real server. The limit only drops below it after
// the cache has gone unused for UNUSED_BELOW_MIN_INTERVAL.
const MIN_CACHE_LIMIT: HugeLength = HugeLength::new(10);

const UNUSED_BELOW_MIN_INTERVAL: Duration = Duration::from_secs(30);

// Windows of the detailed (10 min) trackers and of the demand summary.
const DETAILED_WINDOW: Duration = Duration::from_secs(600);
const DEMAND_SUMMARY_WINDOW: Duration = Duration::from_secs(300);

// Demand peaks older than this no longer count against release.
const CAP_DEMAND_INTERVAL: Duration = Duration::from_secs(300);

// Realized fragmentation: free hugepages held continuously this long are
// releasable regardless of demand.
const REALIZED_FRAGMENTATION_INTERVAL: Duration = Duration::from_secs(300);

// The fraction of the cache a single demand-based call may release.
const FRACTION_TO_RELEASE_FROM_CACHE: f64 = 0.2;

/// Hot cache of backed hugepages between an upstream allocator and the rest
/// of the page heap.
///
/// Retains recently released runs in backed form so they can be handed back
/// without a kernel round trip, and adaptively resizes its limit against
/// observed demand: the limit grows on a miss whose working set the cache
/// should have covered, shrinks once a doubled observation window shows the
/// capacity was never needed, and demand-based release unbacks free pages a
/// likely near-future spike will not want back.
///
/// Every entry point must be called under the caller's page-heap lock; the
/// cache does no locking of its own and keeps plain counters. The unback
/// capability is invoked while that lock is held.
pub struct HugeCache<'u, A, C> {
    allocator: A,
    cache: HugeAddressMap,
    size: HugeLength,
    limit: HugeLength,

    hits: usize,
    misses: usize,
    fills: usize,
    overflows: usize,
    weighted_hits: u64,
    weighted_misses: u64,

    // Sum(size of gets) - sum(size of releases): the amount of backed
    // hugepages our callers currently want to have.
    usage: HugeLength,

    clock: C,
    cache_time_ticks: i64,
    last_limit_change: i64,

    detailed_tracker: MinMaxTracker<600>,
    usage_tracker: MinMaxTracker<16>,
    off_peak_tracker: MinMaxTracker<16>,
    size_tracker: MinMaxTracker<16>,

    total_fast_unbacked: HugeLength,
    total_periodic_unbacked: HugeLength,

    demand_tracker: DemandTracker,
    subreleased_since_report: HugeLength,

    unback: &'u mut dyn MemoryUnback,
}

impl<'u, A: HugeAllocator, C: CacheClock> HugeCache<'u, A, C> {
    /// `cache_time` is the ebb the cache sizes itself to protect: a working
    /// set that dips and comes back within roughly this duration should not
    /// fault. Shrinking deliberately observes twice this window so undoing
    /// an expansion needs twice the evidence that making it did.
    pub fn new(
        allocator: A,
        unback: &'u mut dyn MemoryUnback,
        clock: C,
        cache_time: Duration,
    ) -> Self {
        let freq = clock.freq();
        let t = |d: Duration| ((freq * d.as_secs_f64()) as i64).max(1);
        let now = clock.now();
        let cache_time_ticks = t(cache_time);
        HugeCache {
            allocator,
            cache: HugeAddressMap::new(),
            size: HugeLength::ZERO,
            limit: MIN_CACHE_LIMIT,
            hits: 0,
            misses: 0,
            fills: 0,
            overflows: 0,
            weighted_hits: 0,
            weighted_misses: 0,
            usage: HugeLength::ZERO,
            cache_time_ticks,
            last_limit_change: now,
            detailed_tracker: MinMaxTracker::new(t(DETAILED_WINDOW)),
            usage_tracker: MinMaxTracker::new(cache_time_ticks * 2),
            off_peak_tracker: MinMaxTracker::new(cache_time_ticks * 2),
            size_tracker: MinMaxTracker::new(cache_time_ticks * 2),
            total_fast_unbacked: HugeLength::ZERO,
            total_periodic_unbacked: HugeLength::ZERO,
            demand_tracker: DemandTracker::new(t(DETAILED_WINDOW), t(DEMAND_SUMMARY_WINDOW)),
            subreleased_since_report: HugeLength::ZERO,
            unback,
            clock,
        }
    }

    /// Backed memory available.
    pub fn size(&self) -> HugeLength {
        self.size
    }

    /// Current limit for how much backed memory we'll cache.
    pub fn limit(&self) -> HugeLength {
        self.limit
    }

    /// Sum total of unreleased requests.
    pub fn usage(&self) -> HugeLength {
        self.usage
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    pub fn stats(&self) -> BackingStats {
        BackingStats {
            system_bytes: (self.usage + self.size).in_bytes(),
            free_bytes: self.size.in_bytes(),
            unmapped_bytes: 0,
        }
    }

    /// Add this cache's free runs to a span census.
    pub fn add_span_stats(&self, stats: &mut LargeSpanStats) {
        for r in self.cache.ranges() {
            stats.spans += 1;
            stats.pages += r.len();
        }
    }

    /// Allocate a usable run of `n` contiguous hugepages, preferring memory
    /// that is already backed. The `bool` is true when the returned range
    /// came back unbacked and the caller must back it. `None` propagates
    /// upstream exhaustion (counters are still updated).
    pub fn get(&mut self, n: HugeLength) -> Option<(HugeRange, bool)> {
        debug_assert!(!n.is_zero());
        let result = self.do_get(n);
        self.update_size();
        self.update_stats_tracker();
        result
    }

    fn do_get(&mut self, n: HugeLength) -> Option<(HugeRange, bool)> {
        if let Some(found) = self.cache.find(n) {
            let r = self.cache.remove(found.start(), n);
            self.size -= n;
            self.hits += 1;
            self.weighted_hits += n.raw() as u64;
            self.inc_usage(n);
            return Some((r, false));
        }

        self.misses += 1;
        self.weighted_misses += n.raw() as u64;
        self.fills += 1;
        self.maybe_grow_cache_limit(n);

        let (r, from_released) = self.allocator.get(n)?;
        self.inc_usage(r.len());
        Some((r, from_released))
    }

    /// Return `r` (currently backed, previously handed out by `get`).
    ///
    /// With `demand_based_unback` set the range is only cached: shrinking
    /// and unbacking are deferred to `release_cached_pages_by_demand`, which
    /// separates the quick release path from the demand-driven one.
    pub fn release(&mut self, r: HugeRange, demand_based_unback: bool) {
        self.dec_usage(r.len());
        self.cache.insert(r);
        self.size += r.len();

        if !demand_based_unback {
            if self.size > self.limit {
                self.overflows += 1;
                let dropped = self.shrink_cache(self.limit);
                self.total_fast_unbacked += dropped;
            }
            let evicted = self.maybe_shrink_cache_limit();
            self.total_fast_unbacked += evicted;
        }

        self.update_size();
        self.update_stats_tracker();
    }

    /// As `release`, but the range is known to not be backed: skip the cache
    /// and hand it straight back upstream.
    pub fn release_unbacked(&mut self, r: HugeRange) {
        self.dec_usage(r.len());
        self.allocator.release(r);
    }

    /// Release to the system up to `n` hugepages of cache contents; returns
    /// the number released. Periodic release is also an opportunity to
    /// detect an oversized cache, so the limit check runs here too.
    pub fn release_cached_pages(&mut self, n: HugeLength) -> HugeLength {
        let released = self.do_release_cached_pages(n);
        self.total_periodic_unbacked += released;
        self.update_size();
        self.update_stats_tracker();
        released
    }

    fn do_release_cached_pages(&mut self, n: HugeLength) -> HugeLength {
        let mut released = self.maybe_shrink_cache_limit();
        if released < n {
            let target = self.size.saturating_sub(n - released);
            released += self.shrink_cache(target);
        }
        released
    }

    /// Release up to `n` hugepages if recent demand allows: the target is
    /// cut back so that a demand spike like those seen over the given
    /// intervals can still be served from what remains. Free pages held
    /// continuously for five minutes (realized fragmentation) are always
    /// releasable. With `hit_limit` set, or with no intervals configured,
    /// degrades to the unconditional `release_cached_pages`.
    pub fn release_cached_pages_by_demand(
        &mut self,
        n: HugeLength,
        intervals: SkipSubreleaseIntervals,
        hit_limit: bool,
    ) -> HugeLength {
        if hit_limit || !intervals.enabled() {
            return self.release_cached_pages(n);
        }

        // Fold the current state into the history before reading peaks.
        self.update_stats_tracker();
        let target = self.desired_releaseable_pages(n, intervals);
        let released = self.do_release_cached_pages(target);
        self.total_periodic_unbacked += released;
        self.update_size();
        self.update_stats_tracker();
        released
    }

    /// Write the human-readable stats block.
    pub fn print<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        let snap = self.snapshot();
        writeln!(out, "HugeCache: contains unused, backed hugepage(s)")?;
        writeln!(
            out,
            "HugeCache: {} / {} hugepages cached / cache limit ({:.3} hits/miss, {} fills, {} overflows)",
            snap.size,
            snap.limit,
            ratio(snap.hits, snap.misses),
            snap.fills,
            snap.overflows,
        )?;
        writeln!(
            out,
            "HugeCache: {} MiB fast unbacked, {} MiB periodic",
            mib(snap.total_fast_unbacked),
            mib(snap.total_periodic_unbacked),
        )?;
        writeln!(
            out,
            "HugeCache: 10 min cache size: {} MiB min, {} MiB max",
            mib(snap.size_min_10min),
            mib(snap.size_max_10min),
        )?;
        writeln!(
            out,
            "HugeCache: 5 min demand: {} - {} hugepages, {} subreleased",
            snap.demand_min_5min, snap.demand_max_5min, snap.subreleased_5min,
        )
    }

    /// Dump counters and windowed statistics as plain data.
    pub fn snapshot(&mut self) -> CacheSnapshot {
        let now = self.clock.now();
        let detailed = self.duration_ticks(DETAILED_WINDOW);
        let size_min_10min = self
            .detailed_tracker
            .min_over_time(now, detailed)
            .unwrap_or(HugeLength::ZERO);
        let size_max_10min = self.detailed_tracker.max_over_time(now, detailed);
        let demand = self.demand_tracker.summary(now);
        CacheSnapshot {
            size: self.size,
            limit: self.limit,
            usage: self.usage,
            hits: self.hits,
            misses: self.misses,
            fills: self.fills,
            overflows: self.overflows,
            weighted_hits: self.weighted_hits,
            weighted_misses: self.weighted_misses,
            total_fast_unbacked: self.total_fast_unbacked,
            total_periodic_unbacked: self.total_periodic_unbacked,
            size_min_10min,
            size_max_10min,
            demand_min_5min: demand.demand_min,
            demand_max_5min: demand.demand_max,
            free_min_5min: demand.free_min,
            free_max_5min: demand.free_max,
            subreleased_5min: demand.subreleased,
        }
    }

    // We just cache-missed a request for `missed` pages; should we grow?
    //
    // Protect a working set whose peak over the last cache_time exceeded
    // current usage: raise the limit to cover that peak on top of the
    // minimum cache we have been holding, plus what we just missed for.
    fn maybe_grow_cache_limit(&mut self, missed: HugeLength) {
        let now = self.clock.now();
        let usage_max = self.usage_tracker.max_over_time(now, self.cache_time_ticks);
        let size_min = self
            .size_tracker
            .min_over_time(now, self.cache_time_ticks)
            .unwrap_or(HugeLength::ZERO);
        let desired = usage_max.saturating_sub(self.usage) + size_min + missed;
        if desired > self.limit {
            debug!(
                "growing hugepage cache limit from {} to {} after missing {} page(s)",
                self.limit, desired, missed
            );
            self.limit = desired;
            self.last_limit_change = now;
        }
    }

    // Check whether the cache has been consistently too big; returns the
    // number of pages evicted (not the change in limit).
    //
    // Off-peak is the slack `limit - usage` at each report. If its maximum
    // over the doubled window stayed strictly below the limit, the part of
    // the limit that was never slack covers permanently-held usage and can
    // go. The doubled window is the hysteresis: twice the evidence to undo
    // an expansion as to make one.
    fn maybe_shrink_cache_limit(&mut self) -> HugeLength {
        let now = self.clock.now();
        if now - self.last_limit_change < 2 * self.cache_time_ticks {
            return HugeLength::ZERO;
        }

        let off_peak_max = self
            .off_peak_tracker
            .max_over_time(now, 2 * self.cache_time_ticks);
        if off_peak_max >= self.limit {
            return HugeLength::ZERO;
        }

        let floor = if self.unused_long_enough_to_drop_below_min(now) {
            HugeLength::ZERO
        } else {
            MIN_CACHE_LIMIT
        };
        let new_limit = off_peak_max.max(floor);
        if new_limit >= self.limit {
            return HugeLength::ZERO;
        }

        debug!(
            "shrinking hugepage cache limit from {} to {}",
            self.limit, new_limit
        );
        self.limit = new_limit;
        self.last_limit_change = now;
        self.shrink_cache(new_limit)
    }

    // The limit may drop below MIN_CACHE_LIMIT only once the cache has seen
    // no demand at all for UNUSED_BELOW_MIN_INTERVAL. The 16-epoch off-peak
    // window is far too short to answer that, so consult the 10-minute
    // demand series instead.
    fn unused_long_enough_to_drop_below_min(&mut self, now: i64) -> bool {
        let t = self.duration_ticks(UNUSED_BELOW_MIN_INTERVAL);
        self.demand_tracker.idle_for(now, t)
    }

    // Ensure the cache contains at most `target` hugepages, unbacking and
    // returning the excess upstream; returns the number removed. Evicts the
    // largest run first (fewest unback syscalls) and takes its high end. A
    // refused unback leaves the run cached as backed and ends the pass; a
    // later release retries.
    fn shrink_cache(&mut self, target: HugeLength) -> HugeLength {
        let mut removed = HugeLength::ZERO;
        while self.size > target {
            let Some(biggest) = self.cache.largest() else {
                debug_assert!(false, "cache size {} but no runs indexed", self.size);
                break;
            };
            let take = biggest.len().min(self.size - target);
            let r = self.cache.remove(biggest.start(), take);
            self.size -= take;
            if self.unback.unback(r) {
                self.subreleased_since_report += take;
                self.allocator.release(r);
                removed += take;
            } else {
                warn!(
                    "unback of {} hugepage(s) refused; keeping them cached",
                    take
                );
                self.cache.insert(r);
                self.size += take;
                break;
            }
        }
        removed
    }

    // The demand-capped release target: releasing `desired` must not force a
    // refault if demand returns to its recent peak, but realized
    // fragmentation is releasable regardless, and a single pass gives back
    // at most a fraction of the cache.
    fn desired_releaseable_pages(
        &mut self,
        desired: HugeLength,
        intervals: SkipSubreleaseIntervals,
    ) -> HugeLength {
        let now = self.clock.now();
        let cap = if intervals.cap_interval.is_zero() {
            CAP_DEMAND_INTERVAL
        } else {
            intervals.cap_interval
        };
        let peak = self.demand_tracker.recent_peak(
            now,
            self.duration_ticks(intervals.short_interval),
            self.duration_ticks(intervals.long_interval),
            self.duration_ticks(cap),
        );

        let current = self.usage + self.size;
        let mut target = desired.min(current.saturating_sub(peak));

        let floor = self
            .detailed_tracker
            .min_over_time(now, self.duration_ticks(REALIZED_FRAGMENTATION_INTERVAL))
            .unwrap_or(HugeLength::ZERO);
        if floor > target {
            target = desired.min(floor);
        }

        let pass_cap = self.size.scaled(FRACTION_TO_RELEASE_FROM_CACHE).max(floor);
        target.min(pass_cap)
    }

    fn inc_usage(&mut self, n: HugeLength) {
        let now = self.clock.now();
        self.usage += n;
        self.usage_tracker.report(now, self.usage);
        self.off_peak_tracker
            .report(now, self.limit.saturating_sub(self.usage));
    }

    fn dec_usage(&mut self, n: HugeLength) {
        let now = self.clock.now();
        self.usage -= n;
        self.usage_tracker.report(now, self.usage);
        self.off_peak_tracker
            .report(now, self.limit.saturating_sub(self.usage));
    }

    fn update_size(&mut self) {
        let now = self.clock.now();
        self.size_tracker.report(now, self.size);
        self.detailed_tracker.report(now, self.size);
    }

    fn update_stats_tracker(&mut self) {
        let now = self.clock.now();
        let sample = DemandSample {
            demand: self.usage,
            free: self.size,
            total: self.usage + self.size,
            subreleased: self.subreleased_since_report,
        };
        self.subreleased_since_report = HugeLength::ZERO;
        self.demand_tracker.report(now, sample);
    }

    fn duration_ticks(&self, d: Duration) -> i64 {
        (self.clock.freq() * d.as_secs_f64()) as i64
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        num as f64
    } else {
        num as f64 / den as f64
    }
}

fn mib(n: HugeLength) -> usize {
    n.in_bytes() / (1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huge::testing::{new_cache, MockClock, MockUnback};

    fn hl(n: usize) -> HugeLength {
        HugeLength::new(n)
    }

    #[test]
    fn test_miss_fills_from_upstream() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, from_released) = cache.get(hl(4)).unwrap();
        assert_eq!(r.len(), hl(4));
        assert!(from_released);
        assert_eq!(cache.usage(), hl(4));
        assert_eq!(cache.size(), HugeLength::ZERO);

        let snap = cache.snapshot();
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.fills, 1);
        assert_eq!(snap.weighted_misses, 4);
        assert_eq!(snap.hits, 0);
    }

    #[test]
    fn test_release_then_hit() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(4)).unwrap();
        cache.release(r, false);
        assert_eq!(cache.usage(), HugeLength::ZERO);
        assert_eq!(cache.size(), hl(4));

        let (r2, from_released) = cache.get(hl(4)).unwrap();
        assert_eq!(r2, r);
        assert!(!from_released);
        assert_eq!(cache.size(), HugeLength::ZERO);

        let snap = cache.snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.weighted_hits, 4);
    }

    #[test]
    fn test_partial_hit_returns_high_end() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(8)).unwrap();
        cache.release(r, false);

        let (high, from_released) = cache.get(hl(3)).unwrap();
        assert!(!from_released);
        assert_eq!(high.start(), r.start() + hl(5));
        assert_eq!(cache.size(), hl(5));
    }

    #[test]
    fn test_upstream_exhaustion_propagates() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);
        cache.allocator_mut().exhaust();

        assert!(cache.get(hl(2)).is_none());
        assert_eq!(cache.usage(), HugeLength::ZERO);
        let snap = cache.snapshot();
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.fills, 1);
    }

    #[test]
    fn test_miss_grows_limit_to_cover_working_set() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        // First miss larger than the baseline limit raises it.
        let (r, _) = cache.get(hl(14)).unwrap();
        assert_eq!(cache.limit(), hl(14));
        // A second miss while the first is still out does not: peak usage
        // minus current usage is zero, and nothing was cached to protect.
        let (r2, _) = cache.get(hl(6)).unwrap();
        assert_eq!(cache.limit(), hl(14));
        cache.release(r, false);
        cache.release(r2, false);
    }

    #[test]
    fn test_release_over_limit_unbacks_excess() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let counters = unback.counters();
        let mut cache = new_cache(&mut unback, &clock);

        // Limit settles at 14 after the first miss; 20 released pages
        // overflow it by 6.
        let (r, _) = cache.get(hl(14)).unwrap();
        let (r2, _) = cache.get(hl(6)).unwrap();
        cache.release(r, false);
        cache.release(r2, false);

        assert_eq!(cache.limit(), hl(14));
        assert_eq!(cache.size(), hl(14));
        assert_eq!(counters.unbacked(), 6);
        assert_eq!(cache.allocator().released_pages(), 6);
        let snap = cache.snapshot();
        assert_eq!(snap.overflows, 1);
        assert_eq!(snap.total_fast_unbacked, hl(6));
    }

    #[test]
    fn test_demand_based_release_flag_defers_unbacking() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let counters = unback.counters();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(14)).unwrap();
        let (r2, _) = cache.get(hl(6)).unwrap();
        cache.release(r, true);
        cache.release(r2, true);

        // Nothing unbacked, even though size exceeds the limit.
        assert_eq!(cache.size(), hl(20));
        assert!(cache.size() > cache.limit());
        assert_eq!(counters.unbacked(), 0);
        assert_eq!(cache.snapshot().overflows, 0);
    }

    #[test]
    fn test_release_unbacked_skips_cache() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(6)).unwrap();
        cache.release_unbacked(r);
        assert_eq!(cache.usage(), HugeLength::ZERO);
        assert_eq!(cache.size(), HugeLength::ZERO);
        assert_eq!(cache.allocator().released_pages(), 6);
    }

    #[test]
    fn test_release_cached_pages_partial() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(8)).unwrap();
        cache.release(r, false);
        assert_eq!(cache.size(), hl(8));

        let released = cache.release_cached_pages(hl(3));
        assert_eq!(released, hl(3));
        assert_eq!(cache.size(), hl(5));
        assert_eq!(cache.snapshot().total_periodic_unbacked, hl(3));
    }

    #[test]
    fn test_release_cached_pages_clamps_to_size() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(5)).unwrap();
        cache.release(r, false);

        let released = cache.release_cached_pages(hl(100));
        assert_eq!(released, hl(5));
        assert_eq!(cache.size(), HugeLength::ZERO);
    }

    #[test]
    fn test_failed_unback_keeps_pages_cached() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let counters = unback.counters();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(6)).unwrap();
        cache.release(r, false);

        counters.fail_unbacks(true);
        let released = cache.release_cached_pages(hl(6));
        assert_eq!(released, HugeLength::ZERO);
        assert_eq!(cache.size(), hl(6));
        assert_eq!(cache.allocator().released_pages(), 0);

        // Pressure clears; the same pages go on the next pass.
        counters.fail_unbacks(false);
        let released = cache.release_cached_pages(hl(6));
        assert_eq!(released, hl(6));
        assert_eq!(cache.size(), HugeLength::ZERO);
    }

    #[test]
    fn test_eviction_takes_largest_run_first() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        // Build two separated runs of 2 and 6 pages.
        let (a, _) = cache.get(hl(2)).unwrap();
        let (gap, _) = cache.get(hl(1)).unwrap();
        let (b, _) = cache.get(hl(6)).unwrap();
        cache.release(a, false);
        cache.release(b, false);

        // Releasing one page must split it off the 6-run, not break up the
        // 2-run.
        let released = cache.release_cached_pages(hl(1));
        assert_eq!(released, hl(1));
        let mut spans = LargeSpanStats::default();
        cache.add_span_stats(&mut spans);
        assert_eq!(spans.spans, 2);
        assert_eq!(spans.pages, hl(7));

        cache.release(gap, false);
    }

    #[test]
    fn test_stats_bytes() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);

        let (r, _) = cache.get(hl(3)).unwrap();
        let (keep, _) = cache.get(hl(2)).unwrap();
        cache.release(r, false);

        let s = cache.stats();
        assert_eq!(s.system_bytes, hl(5).in_bytes());
        assert_eq!(s.free_bytes, hl(3).in_bytes());
        assert_eq!(s.unmapped_bytes, 0);
        cache.release(keep, false);
    }

    #[test]
    fn test_print_does_not_panic() {
        let clock = MockClock::new();
        let mut unback = MockUnback::new();
        let mut cache = new_cache(&mut unback, &clock);
        let (r, _) = cache.get(hl(4)).unwrap();
        cache.release(r, false);

        let mut out = String::new();
        cache.print(&mut out).unwrap();
        assert!(out.contains("hugepages cached / cache limit"));
    }
}

use super::minmax::{EpochStats, Extrema, TimeSeriesTracker};
use super::pages::HugeLength;

/// One reading of the cache's demand state, taken after an operation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DemandSample {
    /// Hugepages currently out to callers.
    pub demand: HugeLength,
    /// Hugepages cached (backed, free).
    pub free: HugeLength,
    /// demand + free: everything borrowed from upstream.
    pub total: HugeLength,
    /// Hugepages unbacked since the previous sample.
    pub subreleased: HugeLength,
}

#[derive(Clone, Copy, Debug)]
struct DemandEpoch {
    demand: Extrema,
    free: Extrema,
    total_max: HugeLength,
    subreleased: HugeLength,
}

impl EpochStats for DemandEpoch {
    fn nil() -> Self {
        DemandEpoch {
            demand: Extrema::nil(),
            free: Extrema::nil(),
            total_max: HugeLength::ZERO,
            subreleased: HugeLength::ZERO,
        }
    }
}

/// Aggregates of the demand series over the summary window, for stats
/// output.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DemandSummary {
    pub demand_min: HugeLength,
    pub demand_max: HugeLength,
    pub free_min: HugeLength,
    pub free_max: HugeLength,
    pub subreleased: HugeLength,
}

/// Demand history over the last ten minutes, driving demand-based release:
/// how many hugepages were wanted recently, and how many were proactively
/// unbacked.
pub(crate) struct DemandTracker {
    series: TimeSeriesTracker<DemandEpoch, 600>,
    summary_ticks: i64,
}

impl DemandTracker {
    pub fn new(window_ticks: i64, summary_ticks: i64) -> Self {
        DemandTracker {
            series: TimeSeriesTracker::new(window_ticks),
            summary_ticks,
        }
    }

    pub fn report(&mut self, now: i64, s: DemandSample) {
        self.series.report(now, |e| {
            e.demand.report(s.demand);
            e.free.report(s.free);
            e.total_max = e.total_max.max(s.total);
            e.subreleased += s.subreleased;
        });
    }

    /// Maximum demand recorded in the last `t` ticks; zero when the window
    /// saw no traffic.
    pub fn max_demand_over(&mut self, now: i64, t: i64) -> HugeLength {
        let mut m = HugeLength::ZERO;
        self.series.iter_window(now, t, |e| {
            if !e.demand.is_nil() {
                m = m.max(e.demand.max);
            }
        });
        m
    }

    /// Peak demand for release decisions: the larger of the short- and
    /// long-interval peaks, bounded by the cap-interval peak so one ancient
    /// spike cannot paralyze release forever. Zero-tick intervals are
    /// disabled.
    pub fn recent_peak(&mut self, now: i64, short: i64, long: i64, cap: i64) -> HugeLength {
        let mut peak = if short > 0 {
            self.max_demand_over(now, short)
        } else {
            HugeLength::ZERO
        };
        if long > 0 {
            peak = peak.max(self.max_demand_over(now, long));
        }
        if cap > 0 {
            peak = peak.min(self.max_demand_over(now, cap));
        }
        peak
    }

    /// True when no demand at all was recorded in the last `t` ticks.
    pub fn idle_for(&mut self, now: i64, t: i64) -> bool {
        self.max_demand_over(now, t).is_zero()
    }

    pub fn summary(&mut self, now: i64) -> DemandSummary {
        let mut demand = Extrema::nil();
        let mut free = Extrema::nil();
        let mut subreleased = HugeLength::ZERO;
        self.series.iter_window(now, self.summary_ticks, |e| {
            if !e.demand.is_nil() {
                demand.report(e.demand.min);
                demand.report(e.demand.max);
            }
            if !e.free.is_nil() {
                free.report(e.free.min);
                free.report(e.free.max);
            }
            subreleased += e.subreleased;
        });
        DemandSummary {
            demand_min: if demand.is_nil() {
                HugeLength::ZERO
            } else {
                demand.min
            },
            demand_max: demand.max,
            free_min: if free.is_nil() {
                HugeLength::ZERO
            } else {
                free.min
            },
            free_max: free.max,
            subreleased,
        }
    }
}

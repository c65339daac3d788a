use super::pages::HugeLength;

/// Per-epoch statistic stored in a [`TimeSeriesTracker`] ring slot.
pub(crate) trait EpochStats: Copy {
    /// The empty slot value a stale epoch is re-initialized to.
    fn nil() -> Self;
}

/// Fixed ring of `EPOCHS` slots covering a rolling window of time.
///
/// The window length is fixed at construction; each slot covers
/// `window / EPOCHS` ticks. Reports and queries both rotate the ring first,
/// so epochs age out on quiescent series too: a window that saw no traffic
/// reads as all-Nil rather than replaying stale data.
pub(crate) struct TimeSeriesTracker<E: EpochStats, const EPOCHS: usize> {
    epochs: [E; EPOCHS],
    epoch_ticks: i64,
    last_epoch: i64,
    head: usize,
}

impl<E: EpochStats, const EPOCHS: usize> TimeSeriesTracker<E, EPOCHS> {
    pub fn new(window_ticks: i64) -> Self {
        TimeSeriesTracker {
            epochs: [E::nil(); EPOCHS],
            epoch_ticks: (window_ticks / EPOCHS as i64).max(1),
            last_epoch: 0,
            head: 0,
        }
    }

    /// Rotate so the head slot is the epoch containing `now`.
    fn roll(&mut self, now: i64) {
        let epoch = now.max(0) / self.epoch_ticks;
        let steps = epoch - self.last_epoch;
        if steps <= 0 {
            return;
        }
        if steps >= EPOCHS as i64 {
            self.epochs = [E::nil(); EPOCHS];
        } else {
            for _ in 0..steps {
                self.head = (self.head + 1) % EPOCHS;
                self.epochs[self.head] = E::nil();
            }
        }
        self.last_epoch = epoch;
    }

    /// Record into the epoch containing `now`.
    pub fn report(&mut self, now: i64, f: impl FnOnce(&mut E)) {
        self.roll(now);
        f(&mut self.epochs[self.head]);
    }

    /// Visit the epochs covering the last `t` ticks, newest first. `t` is
    /// rounded up to whole epochs; anything below one epoch reads just the
    /// current one, and lookbacks beyond the window clamp to the window.
    pub fn iter_window(&mut self, now: i64, t: i64, mut f: impl FnMut(&E)) {
        self.roll(now);
        let n = self.epochs_for(t);
        for i in 0..n {
            f(&self.epochs[(self.head + EPOCHS - i) % EPOCHS]);
        }
    }

    fn epochs_for(&self, t: i64) -> usize {
        let n = (t.max(0) + self.epoch_ticks - 1) / self.epoch_ticks;
        (n.max(1) as usize).min(EPOCHS)
    }
}

/// Min/max pair for one epoch. Nil is `min = MAX, max = 0`, which no report
/// can produce (a report sets `min <= max`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Extrema {
    pub min: HugeLength,
    pub max: HugeLength,
}

impl Extrema {
    pub fn report(&mut self, v: HugeLength) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    pub fn is_nil(&self) -> bool {
        self.min > self.max
    }
}

impl EpochStats for Extrema {
    fn nil() -> Self {
        Extrema {
            min: HugeLength::MAX,
            max: HugeLength::ZERO,
        }
    }
}

/// Extreme values of a reported HugeLength over a rolling window.
pub(crate) struct MinMaxTracker<const EPOCHS: usize> {
    series: TimeSeriesTracker<Extrema, EPOCHS>,
}

impl<const EPOCHS: usize> MinMaxTracker<EPOCHS> {
    pub fn new(window_ticks: i64) -> Self {
        MinMaxTracker {
            series: TimeSeriesTracker::new(window_ticks),
        }
    }

    pub fn report(&mut self, now: i64, v: HugeLength) {
        self.series.report(now, |e| e.report(v));
    }

    /// Largest value reported in the last `t` ticks; zero over an all-Nil
    /// window.
    pub fn max_over_time(&mut self, now: i64, t: i64) -> HugeLength {
        let mut m = HugeLength::ZERO;
        self.series.iter_window(now, t, |e| {
            if !e.is_nil() {
                m = m.max(e.max);
            }
        });
        m
    }

    /// Smallest value reported in the last `t` ticks, skipping empty epochs.
    /// `None` when nothing was reported in the window at all.
    pub fn min_over_time(&mut self, now: i64, t: i64) -> Option<HugeLength> {
        let mut m: Option<HugeLength> = None;
        self.series.iter_window(now, t, |e| {
            if !e.is_nil() {
                m = Some(m.map_or(e.min, |cur| cur.min(e.min)));
            }
        });
        m
    }
}

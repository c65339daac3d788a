use std::collections::{BTreeMap, BTreeSet};

use super::pages::{HugeLength, HugePage, HugeRange};

/// A cached free run: its length plus the stamp of the insertion that
/// created it. Stamps increase monotonically per map, so the smallest stamp
/// among candidates is the least recently freed.
#[derive(Clone, Copy, Debug)]
struct FreeNode {
    len: HugeLength,
    stamp: u64,
}

/// Address-ordered index of free cached hugepage runs.
///
/// Two structures cover the two access patterns:
///
/// - `by_start` (keyed by start page index) drives coalescing: a released
///   range's neighbors, if free, are the entries straddling its key.
/// - `by_size` (ordered by `(len, stamp, start)`) drives best-fit: the first
///   entry at or past a requested length is the smallest run that fits, and
///   among equal lengths the one freed longest ago.
///
/// Maintained invariants: entries never overlap, no two entries are adjacent
/// (insertion always coalesces), and `total` equals the sum of entry lengths.
/// Splits return the *high* end of a run, so the low, colder addresses stay
/// put and keep accumulating into large runs.
pub(crate) struct HugeAddressMap {
    by_start: BTreeMap<usize, FreeNode>,
    by_size: BTreeSet<(HugeLength, u64, usize)>,
    total: HugeLength,
    next_stamp: u64,
}

impl HugeAddressMap {
    pub fn new() -> Self {
        HugeAddressMap {
            by_start: BTreeMap::new(),
            by_size: BTreeSet::new(),
            total: HugeLength::ZERO,
            next_stamp: 0,
        }
    }

    /// Sum of all free run lengths.
    pub fn total(&self) -> HugeLength {
        self.total
    }

    /// Number of free runs.
    pub fn nranges(&self) -> usize {
        self.by_start.len()
    }

    /// All free runs in address order.
    pub fn ranges(&self) -> impl Iterator<Item = HugeRange> + '_ {
        self.by_start
            .iter()
            .map(|(&start, node)| HugeRange::from_raw(start, node.len.raw()))
    }

    /// Insert a released range, coalescing with free neighbors on both sides.
    /// The surviving run gets a fresh stamp. Overlap with an existing run is
    /// caller accounting corruption and is fatal.
    pub fn insert(&mut self, r: HugeRange) {
        let mut start = r.start().index();
        let mut len = r.len();
        let end = r.end().index();

        let left = self
            .by_start
            .range(..start)
            .next_back()
            .map(|(&s, &node)| (s, node));
        if let Some((left_start, left_node)) = left {
            let left_end = left_start + left_node.len.raw();
            assert!(
                left_end <= start,
                "inserted range [{start}, {end}) overlaps cached run starting at {left_start}"
            );
            if left_end == start {
                self.detach(left_start, left_node);
                start = left_start;
                len += left_node.len;
            }
        }

        let right = self
            .by_start
            .range(r.start().index() + 1..)
            .next()
            .map(|(&s, &node)| (s, node));
        if let Some((right_start, right_node)) = right {
            assert!(
                right_start >= end,
                "inserted range [{start}, {end}) overlaps cached run starting at {right_start}"
            );
            if right_start == end {
                self.detach(right_start, right_node);
                len += right_node.len;
            }
        }

        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.by_start.insert(start, FreeNode { len, stamp });
        self.by_size.insert((len, stamp, start));
        self.total += r.len();
    }

    /// Best-fit lookup: among runs of length >= `n`, the shortest, and among
    /// those the least recently freed. Returns the whole candidate run
    /// without removing it.
    pub fn find(&self, n: HugeLength) -> Option<HugeRange> {
        let &(len, _, start) = self.by_size.range((n, 0, 0)..).next()?;
        Some(HugeRange::from_raw(start, len.raw()))
    }

    /// The longest run, least recently freed among equals.
    pub fn largest(&self) -> Option<HugeRange> {
        let &(len, _, _) = self.by_size.iter().next_back()?;
        let &(_, _, start) = self.by_size.range((len, 0, 0)..).next()?;
        Some(HugeRange::from_raw(start, len.raw()))
    }

    /// Take `n` pages from the run starting at `start`. A partial take splits
    /// off the high end; the low remainder keeps its original stamp. The run
    /// must exist and be long enough (the caller found it via `find` or
    /// `largest`).
    pub fn remove(&mut self, start: HugePage, n: HugeLength) -> HugeRange {
        let start = start.index();
        let node = match self.by_start.remove(&start) {
            Some(node) => node,
            None => panic!("remove of untracked run at page {start}"),
        };
        assert!(
            n <= node.len,
            "remove of {n} pages from a {}-page run at {start}",
            node.len
        );
        self.by_size.remove(&(node.len, node.stamp, start));
        self.total -= n;

        if node.len == n {
            return HugeRange::from_raw(start, n.raw());
        }
        let keep = node.len - n;
        self.by_start.insert(
            start,
            FreeNode {
                len: keep,
                stamp: node.stamp,
            },
        );
        self.by_size.insert((keep, node.stamp, start));
        HugeRange::from_raw(start + keep.raw(), n.raw())
    }

    fn detach(&mut self, start: usize, node: FreeNode) {
        self.by_start.remove(&start);
        self.by_size.remove(&(node.len, node.stamp, start));
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        let mut sum = HugeLength::ZERO;
        let mut prev_end: Option<usize> = None;
        for (&start, node) in &self.by_start {
            if let Some(end) = prev_end {
                assert!(end < start, "adjacent or overlapping runs at {start}");
            }
            assert!(
                self.by_size.contains(&(node.len, node.stamp, start)),
                "size index out of sync at {start}"
            );
            sum += node.len;
            prev_end = Some(start + node.len.raw());
        }
        assert_eq!(sum, self.total, "total out of sync");
        assert_eq!(self.by_size.len(), self.by_start.len());
    }
}

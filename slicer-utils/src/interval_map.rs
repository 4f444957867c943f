//! `DisjointIntervalSet` and `IntervalMap<V>` — sorted, coalescing containers
//! keyed on [`Interval`].
//!
//! `IntervalMap` backs the reaching-definitions SSA builder's per-block
//! `definitions` sidecar (§4.6.1): it records which node most recently wrote
//! which byte range and lets a query recover, without re-scanning the whole
//! graph, exactly the set of writes that (partially) cover a queried range.

use crate::offset::Interval;

/// A set of pairwise-disjoint intervals, collapsing overlapping or
/// end-to-end-touching intervals into one on insert.
#[derive(Debug, Clone, Default)]
pub struct DisjointIntervalSet {
    intervals: Vec<Interval>,
}

impl DisjointIntervalSet {
    pub fn new() -> Self {
        DisjointIntervalSet::default()
    }

    /// Inserts `interval`, uniting it with every interval already present
    /// that it overlaps or touches.
    pub fn insert(&mut self, mut interval: Interval) {
        let mut i = 0;
        while i < self.intervals.len() {
            if interval.unite(&self.intervals[i]) {
                self.intervals.swap_remove(i);
            } else {
                i += 1;
            }
        }
        self.intervals.push(interval);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl<C: IntoIterator<Item = Interval>> From<C> for DisjointIntervalSet {
    fn from(c: C) -> Self {
        let mut set = DisjointIntervalSet::new();
        for interval in c {
            set.insert(interval);
        }
        set
    }
}

/// `interval` is fully accounted for by the union of `covered`; an unknown
/// interval is conservatively treated as always covered (this is an
/// under-approximation that the caller must be aware biases towards "stop
/// searching", never towards "report more defs than exist").
fn is_covered(interval: &Interval, covered: &DisjointIntervalSet) -> bool {
    if interval.is_unknown() {
        return true;
    }
    covered
        .iter()
        .any(|i| interval.overlaps(i) && interval.is_subset_of(i))
}

/// A bucket list `(Interval, V)`, queried in reverse insertion order so the
/// most recently added (i.e. most recent, in program order) bucket wins.
#[derive(Debug, Clone, Default)]
pub struct IntervalMap<V> {
    buckets: Vec<(Interval, V)>,
}

impl<V: Clone> IntervalMap<V> {
    pub fn new() -> Self {
        IntervalMap { buckets: Vec::new() }
    }

    /// Adds a new `(interval, value)` mapping; does not kill overlapping
    /// entries (call [`kill_overlapping`](Self::kill_overlapping) first for that).
    pub fn add(&mut self, interval: Interval, value: V) {
        self.buckets.push((interval, value));
    }

    /// Removes `ki` from every existing bucket's interval, splitting a
    /// bucket into zero, one, or two surviving sub-buckets that keep the
    /// bucket's original value.
    pub fn kill_overlapping(&mut self, ki: &Interval) {
        if ki.is_unknown() {
            return;
        }
        let mut kept = Vec::with_capacity(self.buckets.len());
        for (interval, value) in self.buckets.drain(..) {
            if interval.is_unknown() || !interval.overlaps(ki) {
                kept.push((interval, value));
                continue;
            }
            if ki.is_subset_of(&interval) {
                // ki splits interval into a left and right remainder.
                if let Some(left) = sub_interval(interval.start, ki.start) {
                    kept.push((left, value.clone()));
                }
                let right_start = ki.start + ki.len;
                let interval_end = interval.start + interval.len;
                if let Some(right) = sub_interval(right_start, interval_end) {
                    kept.push((right, value));
                }
            } else if !ki.is_subset_of(&interval) {
                // partial overlap on one side: keep the non-overlapping remainder.
                let (start, end) = if ki.start <= interval.start {
                    (ki.start + ki.len, interval.start + interval.len)
                } else {
                    (interval.start, ki.start)
                };
                if let Some(remainder) = sub_interval(start, end) {
                    kept.push((remainder, value));
                }
            }
            // else: ki fully covers interval, so interval is entirely killed.
        }
        self.buckets = kept;
    }

    /// Scans buckets newest-first, collecting every value whose interval
    /// overlaps `query`, stopping as soon as `query` is a subset of the
    /// union of the intervals collected so far (including `already_covered`).
    ///
    /// Returns `(values, covering_intervals, fully_covered)`.
    pub fn collect(
        &self,
        query: &Interval,
        already_covered: &DisjointIntervalSet,
    ) -> (Vec<V>, DisjointIntervalSet, bool) {
        let mut result = Vec::new();
        let mut covered = already_covered.clone();
        let mut fully_covered = is_covered(query, &covered);

        for (interval, value) in self.buckets.iter().rev() {
            if fully_covered {
                break;
            }
            if query.is_unknown() || interval.is_unknown() || interval.overlaps(query) {
                covered.insert(*interval);
                result.push(value.clone());
                fully_covered = is_covered(query, &covered);
            }
        }

        (result, covered, fully_covered)
    }

    /// All values whose interval overlaps `query`, newest-first, with no
    /// early termination.
    pub fn collect_all(&self, query: &Interval) -> Vec<V> {
        self.buckets
            .iter()
            .rev()
            .filter(|(interval, _)| {
                query.is_unknown() || interval.is_unknown() || interval.overlaps(query)
            })
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// `[start, end)` as a closed `Interval`, or `None` if the range is empty.
fn sub_interval(start: crate::offset::Offset, end: crate::offset::Offset) -> Option<Interval> {
    let len = end.checked_sub(start)?;
    match len.value() {
        Some(0) | None => None,
        Some(_) => Some(Interval::new(start, len)),
    }
}

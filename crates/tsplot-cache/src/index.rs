//! Per-(series, resolution) ordered map from fragment end-time to fragment.
//!
//! A `BTreeMap` keyed by a boundary value, shared via `Arc<Mutex<..>>` so
//! fragments can be handed out cheaply to callers running on other tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fragment::Fragment;
use crate::wire::{MAX_VALID_TIME, MIN_VALID_TIME};

/// Fragments for one (series uuid, pwe) pair, pairwise disjoint and kept in
/// ascending order of `end`.
#[derive(Default)]
pub struct IntervalIndex {
    // Keyed by `end`, since every lookup in the coordinator's algorithm
    // walks forward from a starting time looking for the first fragment
    // whose end has not yet passed.
    by_end: Mutex<BTreeMap<i64, Arc<Fragment>>>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self {
            by_end: Mutex::new(BTreeMap::new()),
        }
    }

    /// The fragment with the smallest `end >= t`, if any.
    pub fn lower_bound(&self, t: i64) -> Option<Arc<Fragment>> {
        let map = self.by_end.lock();
        map.range(t..).next().map(|(_, f)| f.clone())
    }

    /// Insert `fragment`, reserving its `[start, end]` range.
    ///
    /// Precondition (enforced by the coordinator, which only inserts for
    /// ranges it has already proven empty): `fragment` does not overlap any
    /// fragment already present. Violating this is a coordinator bug.
    pub fn insert(&self, fragment: Arc<Fragment>) {
        let mut map = self.by_end.lock();
        if cfg!(debug_assertions) {
            if let Some((_, neighbor)) = map.range(..fragment.start).next_back() {
                debug_assert!(
                    neighbor.end < fragment.start,
                    "overlapping fragment inserted into interval index"
                );
            }
            if let Some((_, neighbor)) = map.range(fragment.end + 1..).next() {
                debug_assert!(
                    neighbor.start > fragment.end,
                    "overlapping fragment inserted into interval index"
                );
            }
        }
        let prev_len = map.len();
        map.insert(fragment.end, fragment);
        debug_assert_eq!(map.len(), prev_len + 1, "duplicate fragment end inserted");
    }

    /// Fragments in ascending time order, starting from the first one whose
    /// `end >= t`, through to the end of the index.
    pub fn iterate_forward_from(&self, t: i64) -> Vec<Arc<Fragment>> {
        let map = self.by_end.lock();
        map.range(t..).map(|(_, f)| f.clone()).collect()
    }

    /// The fragment with the largest `end < t`, if any. Used to bound how
    /// far a backend request can widen backward without overlapping an
    /// already-reserved range.
    pub fn predecessor(&self, t: i64) -> Option<Arc<Fragment>> {
        let map = self.by_end.lock();
        map.range(..t).next_back().map(|(_, f)| f.clone())
    }

    /// The fragment with the smallest `start > t`, if any. Fragments are
    /// pairwise disjoint and stored in ascending `end` order, which for a
    /// disjoint set is also ascending `start` order, so the next entry
    /// whose `end` exceeds `t` is the nearest one starting after `t`.
    pub fn successor(&self, t: i64) -> Option<Arc<Fragment>> {
        let map = self.by_end.lock();
        map.range(t + 1..).next().map(|(_, f)| f.clone())
    }

    pub fn len(&self) -> usize {
        self.by_end.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The coordinator's gap-filling walk: starting from `start`,
    /// collect every fragment overlapping `[start, end]` and insert a
    /// new placeholder for every gap found along the way (including a
    /// trailing one if the walk runs out of fragments before `end`).
    ///
    /// Runs under a single lock acquisition so two concurrent callers on the
    /// same index can never both decide the same gap is empty and insert
    /// two overlapping placeholders for it.
    ///
    /// Returns `(collected, created)`: every fragment (pre-existing or new)
    /// that overlaps `[start, end]`, in ascending order, and the subset of
    /// those that this call just created (the ones a backend fetch must be
    /// dispatched for).
    pub fn reserve(
        &self,
        pwe: u8,
        start: i64,
        end: i64,
        request_hint: i64,
    ) -> (Vec<Arc<Fragment>>, Vec<Arc<Fragment>>) {
        let mut map = self.by_end.lock();
        let mut collected = Vec::new();
        let mut created = Vec::new();
        let mut next_exp = start;

        let existing_ends: Vec<i64> = map.range(start..).map(|(k, _)| *k).collect();
        for key in existing_ends {
            if next_exp > end {
                break;
            }
            let Some(frag) = map.get(&key).cloned() else {
                continue;
            };
            if frag.start > end {
                break;
            }
            if frag.start > next_exp {
                let gap_end = (frag.start - 1).min(end);
                let (gs, ge) = widen(&map, next_exp, gap_end, start, end, request_hint);
                let placeholder = Arc::new(Fragment::placeholder(gs, ge, pwe));
                map.insert(placeholder.end, placeholder.clone());
                collected.push(placeholder.clone());
                created.push(placeholder);
            }
            collected.push(frag.clone());
            next_exp = frag.end + 1;
        }
        if next_exp <= end {
            let (gs, ge) = widen(&map, next_exp, end, start, end, request_hint);
            let placeholder = Arc::new(Fragment::placeholder(gs, ge, pwe));
            map.insert(placeholder.end, placeholder.clone());
            collected.push(placeholder.clone());
            created.push(placeholder);
        }
        (collected, created)
    }
}

/// Apply `request_hint` widening to a gap `[gap_start, gap_end]` discovered
/// while filling `[req_start, req_end]`.
///
/// A gap only widens toward an edge of the *requested* interval it
/// coincides with (an interior gap bounded by real fragments on both sides
/// never widens), and never past whatever fragment already reserves the
/// other side of that edge. When a gap happens to touch both edges at once
/// (an empty index, one gap spanning the whole request), forward widening
/// takes priority, matching a prefetch-ahead bias.
fn widen(
    map: &BTreeMap<i64, Arc<Fragment>>,
    gap_start: i64,
    gap_end: i64,
    req_start: i64,
    req_end: i64,
    request_hint: i64,
) -> (i64, i64) {
    if request_hint <= 0 {
        return (gap_start, gap_end);
    }
    let width = gap_end - gap_start + 1;
    if width >= request_hint {
        return (gap_start, gap_end);
    }
    if gap_end == req_end {
        let mut new_end = (gap_start + request_hint).min(MAX_VALID_TIME);
        if let Some((_, succ)) = map.range(gap_end + 1..).next() {
            new_end = new_end.min(succ.start - 1);
        }
        (gap_start, new_end.max(gap_end))
    } else if gap_start == req_start {
        let mut new_start = (gap_end - request_hint).max(MIN_VALID_TIME);
        if let Some((_, pred)) = map.range(..gap_start).next_back() {
            new_start = new_start.max(pred.end + 1);
        }
        (new_start.min(gap_start), gap_end)
    } else {
        (gap_start, gap_end)
    }
}

//! A contiguous, cacheable run of packed points at one resolution, and the
//! interior-mutable placeholder -> populated transition it goes through
//! exactly once.

use std::sync::{Arc, OnceLock};

use crate::point::PackedPoint;

/// Resolution exponents are valid in `0..PWE_MAX`.
pub const PWE_MAX: u8 = 63;

/// Sentinel generation meaning "no valid data / empty response".
pub const GENERATION_MAX: u64 = u64::MAX;

/// Data that only exists once a fragment has been populated. Held behind a
/// [`OnceLock`] so a fragment can be shared (by the index, and by every
/// outstanding query that references it) before its data has arrived, and
/// every holder observes the populated state once it lands.
#[derive(Debug)]
struct Populated {
    points: Arc<[PackedPoint]>,
    epoch: i64,
    generation: u64,
    joins_prev: bool,
    joins_next: bool,
}

/// A fragment covering `[start, end]` (inclusive, nanoseconds) at
/// resolution `pwe` for one series.
///
/// Fragments are inserted into the [`crate::index::IntervalIndex`] as
/// placeholders (data unset) and mutated in place, exactly once, when their
/// backend response arrives. After population they are read-only.
#[derive(Debug)]
pub struct Fragment {
    pub start: i64,
    pub end: i64,
    pub pwe: u8,
    data: OnceLock<Populated>,
}

impl Fragment {
    /// Construct an unpopulated placeholder reserving `[start, end]`.
    pub fn placeholder(start: i64, end: i64, pwe: u8) -> Self {
        debug_assert!(end >= start);
        debug_assert!(pwe < PWE_MAX);
        Self {
            start,
            end,
            pwe,
            data: OnceLock::new(),
        }
    }

    /// Populate this fragment's data. Called exactly once; a second call is
    /// a coordinator bug (invariant violation per the error-handling
    /// design) and panics rather than silently overwriting shared state.
    #[allow(clippy::too_many_arguments)]
    pub fn populate(
        &self,
        points: Arc<[PackedPoint]>,
        epoch: i64,
        generation: u64,
        joins_prev: bool,
        joins_next: bool,
    ) {
        let populated = Populated {
            points,
            epoch,
            generation,
            joins_prev,
            joins_next,
        };
        self.data
            .set(populated)
            .unwrap_or_else(|_| panic!("fragment [{}, {}] populated twice", self.start, self.end));
    }

    pub fn is_placeholder(&self) -> bool {
        self.data.get().is_none()
    }

    pub fn points(&self) -> Option<&[PackedPoint]> {
        self.data.get().map(|p| &*p.points)
    }

    pub fn epoch(&self) -> Option<i64> {
        self.data.get().map(|p| p.epoch)
    }

    pub fn generation(&self) -> Option<u64> {
        self.data.get().map(|p| p.generation)
    }

    pub fn joins_prev(&self) -> bool {
        self.data.get().map(|p| p.joins_prev).unwrap_or(false)
    }

    pub fn joins_next(&self) -> bool {
        self.data.get().map(|p| p.joins_next).unwrap_or(false)
    }

    pub fn is_empty_response(&self) -> bool {
        self.data
            .get()
            .map(|p| p.points.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_as_placeholder() {
        let f = Fragment::placeholder(0, 100, 4);
        assert!(f.is_placeholder());
        assert!(f.points().is_none());
    }

    #[test]
    fn populate_transitions_exactly_once() {
        let f = Fragment::placeholder(0, 100, 4);
        f.populate(Arc::from(vec![]), 50, 1, false, false);
        assert!(!f.is_placeholder());
        assert_eq!(f.generation(), Some(1));
    }

    #[test]
    #[should_panic(expected = "populated twice")]
    fn double_populate_panics() {
        let f = Fragment::placeholder(0, 100, 4);
        f.populate(Arc::from(vec![]), 50, 1, false, false);
        f.populate(Arc::from(vec![]), 50, 1, false, false);
    }
}

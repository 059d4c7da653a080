//! Transforms a raw, ascending run of [`StatPoint`]s into a populated
//! [`Fragment`] whose packed points are ready for direct GPU upload.

use std::sync::Arc;

use thiserror::Error;

use crate::fragment::{Fragment, PWE_MAX};
use crate::point::{PackedPoint, StatPoint};

/// The builder's inputs are internally generated by the coordinator and no
/// failure is expected from the transform itself (see module docs); this
/// enum only covers the one local-validation check the coordinator runs
/// before reserving a range, so it can fold a bad `pwe` into an empty
/// callback instead of reserving for a resolution that can never be built.
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("resolution exponent {0} is out of range (must be < {PWE_MAX})")]
    InvalidResolution(u8),
}

impl tsplot_error::CacheError for BuilderError {
    fn code(&self) -> tsplot_error::ErrorCode {
        tsplot_error::ErrorCode::InvalidArgument
    }
}

/// Reject a `pwe` outside `0..PWE_MAX` before any range is reserved for it.
pub fn validate_pwe(pwe: u8) -> Result<(), BuilderError> {
    if pwe < PWE_MAX {
        Ok(())
    } else {
        Err(BuilderError::InvalidResolution(pwe))
    }
}

/// Populate `target`, an already-inserted placeholder covering
/// `[target.start, target.end]`, from a raw, ascending slice of stat
/// points.
///
/// `points` MUST contain every point whose midpoint lies in
/// `[target.start, target.end]` and MAY additionally contain one extra
/// point immediately to the left and/or right, used to draw a visual
/// connector into a neighboring fragment. `prev`/`next` are the neighbor
/// fragments as currently known to the index, consulted only to decide
/// which side owns the bridge between this fragment and its neighbor.
///
/// `target` is populated in place (same identity every holder of the
/// `Arc<Fragment>` already has), rather than a fresh `Fragment` being
/// returned, so placeholders keep their pointer identity once filled.
pub fn fill_fragment(
    target: &Fragment,
    points: &[StatPoint],
    prev: Option<&Fragment>,
    next: Option<&Fragment>,
    generation: u64,
) {
    let start = target.start;
    let end = target.end;
    let pwe = target.pwe;
    let pw: i64 = 1i64 << pwe;
    let half = pw / 2;
    let midpoint = |p: &StatPoint| p.time + half;

    // 1. Bridge decision. A gap is owned by whichever side claims it first;
    // a neighbor that already claimed its side of the bridge (joins_next /
    // joins_prev already true) blocks this fragment from claiming it too.
    let joins_prev = prev.is_some_and(|p| !p.joins_next() && !p.is_placeholder() && !p.is_empty_response());
    let joins_next = next.is_some_and(|n| !n.joins_prev() && !n.is_placeholder() && !n.is_empty_response());

    // 2. Trim edge points that belong to the neighbor instead.
    let mut lo = 0usize;
    let mut hi = points.len();
    let mut left_extra_kept = false;
    if !points.is_empty() {
        if midpoint(&points[0]) < start {
            if joins_prev {
                lo = 0;
                left_extra_kept = true;
            } else {
                lo = 1;
            }
        }
        if hi > lo && midpoint(&points[hi - 1]) > end {
            if joins_next {
                // keep
            } else {
                hi -= 1;
            }
        }
    }
    let trimmed = &points[lo..hi.max(lo)];

    if trimmed.is_empty() {
        let epoch = (start >> 1) + (end >> 1);
        target.populate(Arc::from(Vec::new()), epoch, generation, joins_prev, joins_next);
        return;
    }

    // 3. Epoch: midpoint of first and last (trimmed) source times.
    let epoch = (trimmed[0].time >> 1) + (trimmed[trimmed.len() - 1].time >> 1);
    let rel = |t: i64| (t - epoch) as f32;

    // 4. Upper bound buffer.
    let cap = (2 * trimmed.len()).min((((end - start) >> pwe) + 3) as usize);
    let mut out: Vec<PackedPoint> = Vec::with_capacity(cap);

    // 5-7. Emit pass with gap insertion and isolated-point marking.
    let mut prev_count: u64 = if left_extra_kept { trimmed[0].count } else { 0 };
    let mut prev_time: Option<i64> = None;
    // Whether the point about to be emitted has no real predecessor of its
    // own: either it is the first point on a non-bridging edge, or the
    // point immediately before it in time was more than `pw` away (so a
    // synthetic gap was just inserted ahead of it).
    let mut preceded_by_gap = !joins_prev;

    for (i, p) in trimmed.iter().enumerate() {
        if i > 0 {
            let pt = prev_time.expect("prev_time set after first iteration");
            if p.time - pt > pw {
                out.push(PackedPoint::gap(rel(pt + pw)));
                if preceded_by_gap {
                    mark_previous_real_isolated(&mut out);
                }
                prev_count = 0;
                preceded_by_gap = true;
            } else {
                preceded_by_gap = false;
            }
        }
        out.push(PackedPoint::real(
            rel(p.time),
            p.min,
            p.mean,
            p.max,
            p.count,
            prev_count,
        ));
        prev_count = p.count;
        prev_time = Some(p.time);
    }

    // 6 (cont'd). Trailing gap if the right edge isn't covered by a
    // bridging neighbor.
    if !joins_next {
        if let Some(pt) = prev_time {
            out.push(PackedPoint::gap(rel(pt + pw)));
            if preceded_by_gap {
                mark_previous_real_isolated(&mut out);
            }
        }
    }

    // 8. Shrink to true length.
    out.shrink_to_fit();

    target.populate(Arc::from(out), epoch, generation, joins_prev, joins_next);
}

/// Flip the sign bits on the real point immediately preceding the gap
/// marker that was just pushed (`out[len - 2]`), marking it isolated.
fn mark_previous_real_isolated(out: &mut [PackedPoint]) {
    let len = out.len();
    if len >= 2 {
        out[len - 2].mark_isolated();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(time: i64, v: f64, count: u64) -> StatPoint {
        StatPoint::new(time, v, v, v, count)
    }

    #[test]
    fn contiguous_run_bridging_next_has_no_gaps() {
        // A populated, non-bridging-on-its-own-left neighbor on the right
        // lets this fragment claim `joins_next`, so no trailing gap
        // marker is needed to cap the line.
        let next = Fragment::placeholder(100, 200, 4);
        next.populate(Arc::from(vec![PackedPoint::real(0.0, 1.0, 1.0, 1.0, 1, 0)]), 150, 1, false, false);

        let pts = vec![pt(0, 1.0, 1), pt(16, 2.0, 1), pt(32, 3.0, 1)];
        let f = Fragment::placeholder(0, 32, 4);
        fill_fragment(&f, &pts, None, Some(&next), 1);
        let out = f.points().unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|p| !p.is_gap()));
    }

    #[test]
    fn left_extra_kept_for_bridging_seeds_its_own_prevcount() {
        // A populated, non-bridging-on-its-own-right neighbor on the left
        // lets this fragment claim `joins_prev`, so the left extra point
        // (time 16, one pointwidth before the requested range) is kept as
        // the first output. Its own `prevcount` field must carry its own
        // count rather than drop to zero.
        let prev = Fragment::placeholder(0, 16, 16);
        prev.populate(Arc::from(vec![PackedPoint::real(0.0, 1.0, 1.0, 1.0, 1, 0)]), 8, 1, false, false);

        let pts = vec![pt(16, 9.0, 5), pt(32, 1.0, 1), pt(48, 2.0, 1)];
        let f = Fragment::placeholder(32, 48, 4);
        fill_fragment(&f, &pts, Some(&prev), None, 1);
        let out = f.points().unwrap();
        assert_eq!(out[0].prevcount, 5.0);
    }

    #[test]
    fn no_bridging_neighbor_gets_a_trailing_gap_marker() {
        let pts = vec![pt(0, 1.0, 1), pt(16, 2.0, 1), pt(32, 3.0, 1)];
        let f = Fragment::placeholder(0, 32, 4);
        fill_fragment(&f, &pts, None, None, 1);
        let out = f.points().unwrap();
        assert_eq!(out.len(), 4);
        assert!(out[..3].iter().all(|p| !p.is_gap()));
        assert!(out[3].is_gap());
    }

    #[test]
    fn internal_gap_inserts_one_marker() {
        let pw = 16i64;
        let pts = vec![pt(0, 1.0, 1), pt(3 * pw, 2.0, 1)];
        let f = Fragment::placeholder(0, 3 * pw, 4);
        fill_fragment(&f, &pts, None, None, 1);
        let out = f.points().unwrap();
        // real, gap, real, trailing-gap (no bridging neighbor on the right)
        assert_eq!(out.len(), 4);
        assert!(!out[0].is_gap());
        assert!(out[1].is_gap());
        assert!(!out[2].is_gap());
        assert!(out[3].is_gap());
        // The point on each side of the internal gap is isolated (it has
        // no bridging neighbor and is followed/preceded by a gap).
        assert!(out[0].count < 0.0);
    }

    #[test]
    fn trailing_gap_when_not_bridging_next() {
        let pw = 16i64;
        let pts = vec![pt(0, 1.0, 1)];
        let f = Fragment::placeholder(0, pw, 4);
        fill_fragment(&f, &pts, None, None, 1);
        let out = f.points().unwrap();
        assert_eq!(out.len(), 2);
        assert!(!out[0].is_gap());
        assert!(out[1].is_gap());
        // Single point surrounded by "nothing" on both non-bridging edges
        // is isolated.
        assert!(out[0].count < 0.0);
    }

    #[test]
    fn outputs_strictly_ascending_in_reltime() {
        let pw = 16i64;
        let pts = vec![pt(0, 1.0, 1), pt(pw, 2.0, 1), pt(5 * pw, 3.0, 1)];
        let f = Fragment::placeholder(0, 5 * pw, 4);
        fill_fragment(&f, &pts, None, None, 1);
        let out = f.points().unwrap();
        for w in out.windows(2) {
            assert!(w[1].reltime > w[0].reltime);
        }
    }

    #[test]
    fn validate_pwe_rejects_out_of_range() {
        assert!(validate_pwe(0).is_ok());
        assert!(validate_pwe(PWE_MAX - 1).is_ok());
        assert!(validate_pwe(PWE_MAX).is_err());
    }

    #[test]
    fn empty_input_populates_empty_fragment() {
        let f = Fragment::placeholder(0, 100, 4);
        fill_fragment(&f, &[], None, None, 1);
        assert!(f.points().unwrap().is_empty());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]
        #[test]
        fn gap_invariant_holds_for_arbitrary_ascending_runs(
            times in proptest::collection::vec(0i64..100, 1..20),
        ) {
            let pw = 4i64;
            let mut sorted: Vec<i64> = times.into_iter().map(|t| t - (t % pw)).collect();
            sorted.sort_unstable();
            sorted.dedup();
            let pts: Vec<StatPoint> = sorted.iter().map(|&t| pt(t, 1.0, 1)).collect();
            if pts.is_empty() {
                return Ok(());
            }
            let start = pts[0].time;
            let end = pts[pts.len() - 1].time;
            let f = Fragment::placeholder(start, end, 2);
            fill_fragment(&f, &pts, None, None, 1);
            let out = f.points().unwrap();
            let mut last_time: Option<f32> = None;
            for p in out {
                if let Some(lt) = last_time {
                    proptest::prop_assert!(p.reltime + f.epoch().unwrap() as f32 > lt);
                }
                last_time = Some(p.reltime + f.epoch().unwrap() as f32);
            }
        }
    }
}

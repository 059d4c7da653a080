//! The input record ([`StatPoint`]) and the GPU-bound output record
//! ([`PackedPoint`]).

use bytemuck::{Pod, Zeroable};

/// One aggregation bucket as emitted by the backend. Immutable; arrays of
/// these are always strictly ascending in `time`, with `time` aligned to
/// the resolution `1 << pwe`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatPoint {
    pub time: i64,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

impl StatPoint {
    pub fn new(time: i64, min: f64, mean: f64, max: f64, count: u64) -> Self {
        Self {
            time,
            min,
            mean,
            max,
            count,
        }
    }
}

/// A single record of a fragment's packed point buffer, laid out to be
/// uploaded directly as a GPU vertex buffer.
///
/// Field order is load-bearing: it fixes the vertex attribute offsets the
/// renderer binds to (`0, 4, 8, 12, 16, 20, 24, 28`). Do not reorder.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedPoint {
    pub reltime: f32,
    pub min: f32,
    /// Count of the previous point. Sign-flipped to mark this point as
    /// isolated (drawn as a vertical line rather than a strip segment).
    pub prevcount: f32,
    pub mean: f32,
    /// Duplicate of `reltime`; consumed by the triangle-strip expansion in
    /// the (out-of-scope) vertex shader.
    pub reltime2: f32,
    pub max: f32,
    /// Sign-flipped in lockstep with `prevcount` to mark isolation.
    pub count: f32,
    _pad: i32,
}

pub const PACKED_POINT_STRIDE: usize = 32;

impl PackedPoint {
    pub fn real(reltime: f32, min: f64, mean: f64, max: f64, count: u64, prevcount: u64) -> Self {
        Self {
            reltime,
            min: min as f32,
            prevcount: prevcount as f32,
            mean: mean as f32,
            reltime2: reltime,
            max: max as f32,
            count: count as f32,
            _pad: 0,
        }
    }

    /// A synthetic gap marker: NaN value fields, zero count, breaks the
    /// rendered line at `reltime`.
    pub fn gap(reltime: f32) -> Self {
        Self {
            reltime,
            min: f32::NAN,
            prevcount: 0.0,
            mean: f32::NAN,
            reltime2: reltime,
            max: f32::NAN,
            count: 0.0,
            _pad: 0,
        }
    }

    /// Flip the sign of `prevcount`/`count` to mark this point as isolated.
    /// A no-op (idempotent only for the zero case) if already flipped.
    pub fn mark_isolated(&mut self) {
        self.prevcount = -self.prevcount.abs();
        self.count = -self.count.abs();
    }

    pub fn is_gap(&self) -> bool {
        self.min.is_nan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn stride_is_32_bytes() {
        assert_eq!(size_of::<PackedPoint>(), PACKED_POINT_STRIDE);
        assert_eq!(align_of::<PackedPoint>(), 4);
    }

    #[test]
    fn field_offsets_match_spec() {
        assert_eq!(offset_of!(PackedPoint, reltime), 0);
        assert_eq!(offset_of!(PackedPoint, min), 4);
        assert_eq!(offset_of!(PackedPoint, prevcount), 8);
        assert_eq!(offset_of!(PackedPoint, mean), 12);
        assert_eq!(offset_of!(PackedPoint, reltime2), 16);
        assert_eq!(offset_of!(PackedPoint, max), 20);
        assert_eq!(offset_of!(PackedPoint, count), 24);
        assert_eq!(offset_of!(PackedPoint, _pad), 28);
    }

    #[test]
    fn mark_isolated_flips_both_fields() {
        let mut p = PackedPoint::real(0.0, 1.0, 2.0, 3.0, 5, 7);
        p.mark_isolated();
        assert!(p.count < 0.0);
        assert!(p.prevcount < 0.0);
    }
}

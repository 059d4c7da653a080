//! Small value types that bind the cache to a plot session: series
//! identity/appearance, axis assignment, and the pannable/zoomable time
//! domain the UI scrolls over.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RGBA in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

/// Which y-axis a series is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisBinding {
    Left,
    Right,
}

/// A series the plot session knows about: its identity in the backend,
/// display name, color, and axis assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    pub uuid: Uuid,
    pub name: String,
    pub color: Color,
    pub axis: AxisBinding,
}

impl SeriesDescriptor {
    pub fn new(uuid: Uuid, name: impl Into<String>, color: Color, axis: AxisBinding) -> Self {
        Self {
            uuid,
            name: name.into(),
            color,
            axis,
        }
    }
}

/// A scrollable, zoomable time domain `[lo, hi]` (nanoseconds), with pan
/// and zoom helpers. Used both to drive `request_data` ranges and to feed
/// the time-axis tick selector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDomain {
    pub lo: i64,
    pub hi: i64,
}

impl TimeDomain {
    pub fn new(lo: i64, hi: i64) -> Self {
        assert!(hi > lo);
        Self { lo, hi }
    }

    pub fn span(&self) -> i64 {
        self.hi - self.lo
    }

    /// Shift the domain by `delta_ns`, preserving its span.
    pub fn pan(&self, delta_ns: i64) -> Self {
        Self {
            lo: self.lo + delta_ns,
            hi: self.hi + delta_ns,
        }
    }

    /// Zoom around a normalized anchor `t` in `[0, 1]` by `factor` (< 1
    /// zooms in, > 1 zooms out).
    pub fn zoom(&self, factor: f64, t: f32) -> Self {
        let anchor = self.lo + (t as f64 * self.span() as f64) as i64;
        let new_span = (self.span() as f64 * factor) as i64;
        let new_span = new_span.max(1);
        let lo = anchor - (t as f64 * new_span as f64) as i64;
        Self {
            lo,
            hi: lo + new_span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_preserves_span() {
        let d = TimeDomain::new(0, 1000);
        let panned = d.pan(500);
        assert_eq!(panned.span(), d.span());
        assert_eq!(panned.lo, 500);
    }

    #[test]
    fn zoom_in_shrinks_span() {
        let d = TimeDomain::new(0, 1000);
        let zoomed = d.zoom(0.5, 0.5);
        assert!(zoomed.span() < d.span());
    }
}

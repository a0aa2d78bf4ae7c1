//! Incremental stroke smoothing
//!
//! Pointer samples arrive sparse and irregularly spaced. The interpolator keeps
//! a short window of the latest control points, fits a spline through them and
//! hands out only the part of the curve that was not returned before, so the
//! work per frame depends on the newly added segment rather than the whole
//! stroke.

use crate::{CatmullRom, Point};
use std::collections::VecDeque;

/// Samples per unit of arclength
pub const POINT_DENSITY: f32 = 0.4;

/// Most segments produced for one call of [`CurveInterpolator::newest_points`]
pub const MAX_SEGMENTS: usize = 50;

/// Control points retained for spline continuity
const WINDOW: usize = 4;

/// Number of segments used to sample a curve range of `length`
pub fn segment_count(length: f32) -> usize {
    (length * POINT_DENSITY).clamp(1.0, MAX_SEGMENTS as f32).ceil() as usize
}

#[derive(Debug, Clone, Default)]
pub struct CurveInterpolator {
    points: VecDeque<Point>,
    previous: Option<CatmullRom>,
    current: Option<CatmullRom>,
}

impl CurveInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently added control point
    pub fn current_point(&self) -> Option<Point> {
        self.points.back().copied()
    }

    /// Retained control points, oldest first
    pub fn control_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().copied()
    }

    /// Appends a control point and refits the spline over the retained window
    pub fn add_control_point(&mut self, point: impl Into<Point>) {
        self.points.push_back(point.into());
        while self.points.len() > WINDOW {
            self.points.pop_front();
        }

        if self.points.len() >= 2 {
            let spline = CatmullRom::new(self.points.make_contiguous());
            self.previous = std::mem::replace(&mut self.current, spline);
        }
    }

    /// Points of the curve not returned by earlier calls
    ///
    /// - no control points: nothing
    /// - a single control point: that point
    /// - first segment: the whole curve
    /// - afterwards: the tail from just past the second-to-last control point,
    ///   or only the latest control point while that tail is still empty
    pub fn newest_points(&self) -> Vec<Point> {
        let Some(latest) = self.current_point() else {
            return Vec::new();
        };

        match (&self.previous, &self.current) {
            (_, None) => vec![latest],
            (None, Some(current)) => current.sample_range(0.0, current.length(), segment_count(current.length())),
            (Some(_), Some(current)) => {
                let second_to_last = self.points[self.points.len() - 2];
                let start = current.nearest_arclength(second_to_last) + POINT_DENSITY;
                let length = current.length();
                if start >= length {
                    return vec![latest];
                }
                current.sample_range(start, length, segment_count(length - start))
            }
        }
    }

    /// Clears all state before an independent stroke
    pub fn reset(&mut self) {
        self.points.clear();
        self.previous = None;
        self.current = None;
    }
}

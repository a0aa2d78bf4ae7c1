//! Stroke smoothing for sketching on the simulation canvas
//!
//! Independent of the GPU engine: pointer samples go in, smoothed points come
//! out, and [`Point`] is plain-old-data so the result can be uploaded as a
//! `float32x2` vertex buffer as is.

mod interpolator;
mod point;
mod spline;

pub use interpolator::{CurveInterpolator, MAX_SEGMENTS, POINT_DENSITY, segment_count};
pub use point::Point;
pub use spline::CatmullRom;

//! Catmull-Rom splines with arclength parameterisation
//!
//! Spans use chordal knot spacing (alpha 1) and tension 0, evaluated with the
//! Barry-Goldman pyramid. Open ends are extrapolated by mirroring the
//! neighbouring control point, so the curve starts and ends exactly at the
//! first and last control points. Positions along the curve are addressed by
//! arclength through a lookup table sampled at a fixed rate per span.

use crate::Point;

/// Exponent applied to control point distances when spacing knots
const ALPHA: f32 = 1.0;

/// Arclength table samples per span
const SAMPLES_PER_SPAN: usize = 32;

/// Smallest knot interval; keeps coincident control points from dividing by zero
const MIN_KNOT_INTERVAL: f32 = 1e-4;

/// One cubic span between the two middle points of a four-point window
#[derive(Debug, Clone, Copy)]
struct Span {
    points: [Point; 4],
    knots: [f32; 4],
}

impl Span {
    fn new(points: [Point; 4]) -> Self {
        let mut knots = [0.0; 4];
        for i in 1..4 {
            knots[i] = knots[i - 1] + points[i - 1].distance(points[i]).powf(ALPHA).max(MIN_KNOT_INTERVAL);
        }
        Self { points, knots }
    }

    /// Position at local parameter `s` in `[0, 1]`
    fn evaluate(&self, s: f32) -> Point {
        let [p0, p1, p2, p3] = self.points;
        let [t0, t1, t2, t3] = self.knots;
        let t = t1 + (t2 - t1) * s;

        let a1 = blend(p0, p1, t0, t1, t);
        let a2 = blend(p1, p2, t1, t2, t);
        let a3 = blend(p2, p3, t2, t3, t);
        let b1 = blend(a1, a2, t0, t2, t);
        let b2 = blend(a2, a3, t1, t3, t);
        blend(b1, b2, t1, t2, t)
    }
}

fn blend(a: Point, b: Point, ta: f32, tb: f32, t: f32) -> Point {
    a * ((tb - t) / (tb - ta)) + b * ((t - ta) / (tb - ta))
}

/// Arclength table entry
#[derive(Debug, Clone, Copy)]
struct Sample {
    /// Global parameter; the integer part selects the span
    u: f32,
    /// Arclength from the start of the curve
    length: f32,
    position: Point,
}

/// An interpolating spline through a sequence of control points
#[derive(Debug, Clone)]
pub struct CatmullRom {
    spans: Vec<Span>,
    samples: Vec<Sample>,
}

impl CatmullRom {
    /// Builds the spline through `points`
    ///
    /// # Returns
    /// `None` if fewer than two control points are given
    pub fn new(points: &[Point]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let last = points.len() - 1;
        let spans = (0..last)
            .map(|i| {
                let (p1, p2) = (points[i], points[i + 1]);
                let p0 = if i > 0 { points[i - 1] } else { p1 + (p1 - p2) };
                let p3 = if i + 1 < last { points[i + 2] } else { p2 + (p2 - p1) };
                Span::new([p0, p1, p2, p3])
            })
            .collect::<Vec<_>>();

        let first = Sample {
            u: 0.0,
            length: 0.0,
            position: points[0],
        };
        let mut samples = Vec::with_capacity(spans.len() * SAMPLES_PER_SPAN + 1);
        samples.push(first);
        for (index, span) in spans.iter().enumerate() {
            for step in 1..=SAMPLES_PER_SPAN {
                let s = step as f32 / SAMPLES_PER_SPAN as f32;
                let position = span.evaluate(s);
                let previous = samples[samples.len() - 1];
                samples.push(Sample {
                    u: index as f32 + s,
                    length: previous.length + previous.position.distance(position),
                    position,
                });
            }
        }

        Some(Self { spans, samples })
    }

    /// Total arclength
    pub fn length(&self) -> f32 {
        self.samples.last().map_or(0.0, |sample| sample.length)
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    fn point_at_parameter(&self, u: f32) -> Point {
        let index = (u.max(0.0).floor() as usize).min(self.spans.len() - 1);
        self.spans[index].evaluate((u - index as f32).clamp(0.0, 1.0))
    }

    /// Position at arclength `distance` from the start, clamped to the curve
    pub fn point_at(&self, distance: f32) -> Point {
        let distance = distance.clamp(0.0, self.length());
        let index = self.samples.partition_point(|sample| sample.length < distance).min(self.samples.len() - 1);
        if index == 0 {
            return self.samples[0].position;
        }

        let (a, b) = (self.samples[index - 1], self.samples[index]);
        let chord = b.length - a.length;
        let t = if chord > 0.0 { (distance - a.length) / chord } else { 0.0 };
        self.point_at_parameter(a.u + (b.u - a.u) * t)
    }

    /// Arclength of the curve position nearest to `point`
    pub fn nearest_arclength(&self, point: Point) -> f32 {
        let mut best = (f32::INFINITY, 0.0);
        for pair in self.samples.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let chord = b.position - a.position;
            let chord_sq = chord.dot(chord);
            let t = if chord_sq > 0.0 { ((point - a.position).dot(chord) / chord_sq).clamp(0.0, 1.0) } else { 0.0 };

            let distance = a.position.lerp(b.position, t).distance(point);
            if distance < best.0 {
                best = (distance, a.length + (b.length - a.length) * t);
            }
        }
        best.1
    }

    /// `segments + 1` points evenly spaced by arclength over `[start, end]`
    pub fn sample_range(&self, start: f32, end: f32, segments: usize) -> Vec<Point> {
        let segments = segments.max(1);
        (0..=segments)
            .map(|i| self.point_at(start + (end - start) * i as f32 / segments as f32))
            .collect()
    }
}

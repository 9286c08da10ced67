//! Shape geometry. Everything here is a pure function of already
//! interpolated values.

mod paint;
mod primitives;

pub use paint::{parse_hex_color, DashPattern, GradientRamp, GradientStop};
pub use primitives::{ellipse, rectangle, star, StarKind, StarParams};

use glam::{Mat3, Vec2};
use kurbo::{BezPath, Point};
use lottie_data::model as data;

use crate::keyframes::Interpolatable;

/// Drawing direction of a generated primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl PathDirection {
    /// Decodes the `d` field; 3 means reversed.
    pub fn from_data(d: Option<u8>) -> Self {
        match d {
            Some(3) => PathDirection::CounterClockwise,
            _ => PathDirection::Clockwise,
        }
    }
}

/// A vertex with absolute control points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveVertex {
    pub point: Vec2,
    pub in_point: Vec2,
    pub out_point: Vec2,
}

impl CurveVertex {
    pub fn corner(point: Vec2) -> Self {
        Self {
            point,
            in_point: point,
            out_point: point,
        }
    }

    pub fn relative(point: Vec2, in_tangent: Vec2, out_tangent: Vec2) -> Self {
        Self {
            point,
            in_point: point + in_tangent,
            out_point: point + out_tangent,
        }
    }

    fn transformed(&self, m: &Mat3) -> Self {
        Self {
            point: m.transform_point2(self.point),
            in_point: m.transform_point2(self.in_point),
            out_point: m.transform_point2(self.out_point),
        }
    }
}

/// One cubic Bézier sub-path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BezierShape {
    pub vertices: Vec<CurveVertex>,
    pub closed: bool,
}

impl BezierShape {
    pub fn new(vertices: Vec<CurveVertex>, closed: bool) -> Self {
        Self { vertices, closed }
    }

    /// Converts decoded vertices whose tangents are relative to them.
    pub fn from_data(path: &data::BezierPath) -> Self {
        let vertices = path
            .v
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let point = Vec2::from_slice(v);
                let tangent = |list: &[data::Vec2]| {
                    list.get(idx).map(|t| Vec2::from_slice(t)).unwrap_or(Vec2::ZERO)
                };
                CurveVertex::relative(point, tangent(&path.i), tangent(&path.o))
            })
            .collect();
        Self {
            vertices,
            closed: path.c,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Same outline drawn in the opposite direction.
    pub fn reversed(&self) -> Self {
        let Some((first, rest)) = self.vertices.split_first() else {
            return self.clone();
        };
        // Keep the start vertex so closed outlines begin at the same point.
        let mut vertices = Vec::with_capacity(self.vertices.len());
        vertices.push(swap_handles(first));
        vertices.extend(rest.iter().rev().map(swap_handles));
        Self {
            vertices,
            closed: self.closed,
        }
    }

    pub fn transformed(&self, m: &Mat3) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| v.transformed(m)).collect(),
            closed: self.closed,
        }
    }

    pub fn append_to(&self, out: &mut BezPath) {
        let Some(first) = self.vertices.first() else {
            return;
        };
        out.move_to(point(first.point));
        let count = self.vertices.len();
        let segments = if self.closed { count } else { count - 1 };
        for i in 0..segments {
            let from = &self.vertices[i];
            let to = &self.vertices[(i + 1) % count];
            out.curve_to(point(from.out_point), point(to.in_point), point(to.point));
        }
        if self.closed {
            out.close_path();
        }
    }

    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        self.append_to(&mut path);
        path
    }
}

fn swap_handles(v: &CurveVertex) -> CurveVertex {
    CurveVertex {
        point: v.point,
        in_point: v.out_point,
        out_point: v.in_point,
    }
}

fn point(v: Vec2) -> Point {
    Point::new(v.x as f64, v.y as f64)
}

impl Interpolatable for BezierShape {
    /// Vertex-wise blend. Mismatched vertex counts blend the shared
    /// prefix; the closed flag follows `self`.
    fn lerp(&self, other: &Self, t: f32) -> Self {
        if t <= 0.0 {
            return self.clone();
        }
        if t >= 1.0 {
            return other.clone();
        }
        let vertices = self
            .vertices
            .iter()
            .zip(&other.vertices)
            .map(|(a, b)| CurveVertex {
                point: a.point.lerp(b.point, t),
                in_point: a.in_point.lerp(b.in_point, t),
                out_point: a.out_point.lerp(b.out_point, t),
            })
            .collect();
        Self {
            vertices,
            closed: self.closed,
        }
    }
}

/// Several sub-paths drawn as one outline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompoundPath {
    pub shapes: Vec<BezierShape>,
}

impl CompoundPath {
    pub fn single(shape: BezierShape) -> Self {
        Self {
            shapes: vec![shape],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.iter().all(BezierShape::is_empty)
    }

    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        for shape in &self.shapes {
            shape.append_to(&mut path);
        }
        path
    }

    pub fn transformed(&self, m: &Mat3) -> Self {
        Self {
            shapes: self.shapes.iter().map(|s| s.transformed(m)).collect(),
        }
    }
}

impl Interpolatable for CompoundPath {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        if self.shapes.len() != other.shapes.len() {
            return if t < 1.0 { self.clone() } else { other.clone() };
        }
        Self {
            shapes: self
                .shapes
                .iter()
                .zip(&other.shapes)
                .map(|(a, b)| a.lerp(b, t))
                .collect(),
        }
    }
}

/// Concatenates sub-paths into one outline. Boolean merge modes are drawn
/// as a plain union of outlines.
pub fn merge(paths: impl IntoIterator<Item = CompoundPath>) -> CompoundPath {
    CompoundPath {
        shapes: paths.into_iter().flat_map(|p| p.shapes).collect(),
    }
}

/// Resolved trim-path values, as fractions of the path length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimValues {
    pub start: f32,
    pub end: f32,
    /// Offset in turns (degrees / 360).
    pub offset: f32,
}

impl TrimValues {
    /// From authored percentages and degrees.
    pub fn from_authored(start: f32, end: f32, offset_degrees: f32) -> Self {
        Self {
            start: (start / 100.0).clamp(0.0, 1.0),
            end: (end / 100.0).clamp(0.0, 1.0),
            offset: offset_degrees / 360.0,
        }
    }

    /// Whole path visible; surfaces may skip trimming.
    pub fn is_identity(&self) -> bool {
        self.start <= 0.0 && self.end >= 1.0
    }
}

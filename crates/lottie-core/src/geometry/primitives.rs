use std::f32::consts::PI;

use glam::Vec2;

use super::{BezierShape, CurveVertex, PathDirection};

/// Control-point distance, as a fraction of the radius, for a quarter arc.
const ELLIPSE_CONTROL_POINT: f32 = 0.551_915;

fn oriented(shape: BezierShape, direction: PathDirection) -> BezierShape {
    match direction {
        PathDirection::Clockwise => shape,
        PathDirection::CounterClockwise => shape.reversed(),
    }
}

/// Four cubic arcs starting at the top of the ellipse.
pub fn ellipse(size: Vec2, center: Vec2, direction: PathDirection) -> BezierShape {
    let half = size * 0.5;
    let k = half * ELLIPSE_CONTROL_POINT;
    let (cx, cy) = (center.x, center.y);
    let vertices = vec![
        CurveVertex {
            point: Vec2::new(cx, cy - half.y),
            in_point: Vec2::new(cx - k.x, cy - half.y),
            out_point: Vec2::new(cx + k.x, cy - half.y),
        },
        CurveVertex {
            point: Vec2::new(cx + half.x, cy),
            in_point: Vec2::new(cx + half.x, cy - k.y),
            out_point: Vec2::new(cx + half.x, cy + k.y),
        },
        CurveVertex {
            point: Vec2::new(cx, cy + half.y),
            in_point: Vec2::new(cx + k.x, cy + half.y),
            out_point: Vec2::new(cx - k.x, cy + half.y),
        },
        CurveVertex {
            point: Vec2::new(cx - half.x, cy),
            in_point: Vec2::new(cx - half.x, cy + k.y),
            out_point: Vec2::new(cx - half.x, cy - k.y),
        },
    ];
    oriented(BezierShape::new(vertices, true), direction)
}

/// Rectangle centred on `position`. The corner radius is clamped to half
/// the shorter side.
pub fn rectangle(
    position: Vec2,
    size: Vec2,
    corner_radius: f32,
    direction: PathDirection,
) -> BezierShape {
    let half = size.abs() * 0.5;
    let (left, right) = (position.x - half.x, position.x + half.x);
    let (top, bottom) = (position.y - half.y, position.y + half.y);
    let radius = corner_radius.max(0.0).min(half.x.min(half.y));

    let vertices = if radius <= 0.0 {
        vec![
            CurveVertex::corner(Vec2::new(right, top)),
            CurveVertex::corner(Vec2::new(right, bottom)),
            CurveVertex::corner(Vec2::new(left, bottom)),
            CurveVertex::corner(Vec2::new(left, top)),
        ]
    } else {
        let handle = radius * ELLIPSE_CONTROL_POINT;
        let arc_end = |point: Vec2, in_point: Vec2| CurveVertex {
            point,
            in_point,
            out_point: point,
        };
        let arc_start = |point: Vec2, out_point: Vec2| CurveVertex {
            point,
            in_point: point,
            out_point,
        };
        vec![
            arc_end(
                Vec2::new(right, top + radius),
                Vec2::new(right, top + radius - handle),
            ),
            arc_start(
                Vec2::new(right, bottom - radius),
                Vec2::new(right, bottom - radius + handle),
            ),
            arc_end(
                Vec2::new(right - radius, bottom),
                Vec2::new(right - radius + handle, bottom),
            ),
            arc_start(
                Vec2::new(left + radius, bottom),
                Vec2::new(left + radius - handle, bottom),
            ),
            arc_end(
                Vec2::new(left, bottom - radius),
                Vec2::new(left, bottom - radius + handle),
            ),
            arc_start(
                Vec2::new(left, top + radius),
                Vec2::new(left, top + radius - handle),
            ),
            arc_end(
                Vec2::new(left + radius, top),
                Vec2::new(left + radius - handle, top),
            ),
            arc_start(
                Vec2::new(right - radius, top),
                Vec2::new(right - radius + handle, top),
            ),
        ]
    };
    oriented(BezierShape::new(vertices, true), direction)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarKind {
    Star,
    Polygon,
}

impl StarKind {
    pub fn from_data(sy: u8) -> Self {
        if sy == 2 {
            StarKind::Polygon
        } else {
            StarKind::Star
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarParams {
    pub kind: StarKind,
    pub position: Vec2,
    pub points: f32,
    /// Degrees, clockwise from the top.
    pub rotation: f32,
    pub outer_radius: f32,
    pub inner_radius: f32,
    /// Percent.
    pub outer_roundness: f32,
    pub inner_roundness: f32,
    pub direction: PathDirection,
}

/// Star or polygon outline. Stars alternate outer and inner vertices;
/// roundness turns corners into tangent handles along the circle.
pub fn star(params: &StarParams) -> BezierShape {
    let points = params.points.round();
    if points < 1.0 {
        return BezierShape::default();
    }
    let is_star = params.kind == StarKind::Star;
    let vertex_count = if is_star { points * 2.0 } else { points } as usize;
    let angle_step = 2.0 * PI / vertex_count as f32;
    let start_angle = (params.rotation - 90.0).to_radians();

    let vertices = (0..vertex_count)
        .map(|i| {
            let outer = !is_star || i % 2 == 0;
            let (radius, roundness) = if outer {
                (params.outer_radius, params.outer_roundness)
            } else {
                (params.inner_radius, params.inner_roundness)
            };
            let angle = start_angle + angle_step * i as f32;
            let (sin, cos) = angle.sin_cos();
            let point = params.position + Vec2::new(cos, sin) * radius;
            if roundness.abs() <= f32::EPSILON {
                return CurveVertex::corner(point);
            }
            let tangent = Vec2::new(-sin, cos) * (radius * angle_step * roundness * 0.01);
            CurveVertex {
                point,
                in_point: point - tangent,
                out_point: point + tangent,
            }
        })
        .collect();
    oriented(BezierShape::new(vertices, true), params.direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn ellipse_starts_at_top_and_spans_size() {
        let shape = ellipse(Vec2::new(100.0, 50.0), Vec2::new(10.0, 20.0), PathDirection::Clockwise);
        assert_eq!(shape.vertices.len(), 4);
        assert!(approx(shape.vertices[0].point, Vec2::new(10.0, -5.0)));
        assert!(approx(shape.vertices[1].point, Vec2::new(60.0, 20.0)));
        assert!(shape.closed);
    }

    #[test]
    fn geometry_is_idempotent() {
        let a = ellipse(Vec2::splat(40.0), Vec2::ZERO, PathDirection::CounterClockwise);
        let b = ellipse(Vec2::splat(40.0), Vec2::ZERO, PathDirection::CounterClockwise);
        assert_eq!(a, b);
        let params = StarParams {
            kind: StarKind::Star,
            position: Vec2::ZERO,
            points: 5.0,
            rotation: 12.0,
            outer_radius: 50.0,
            inner_radius: 20.0,
            outer_roundness: 30.0,
            inner_roundness: 0.0,
            direction: PathDirection::Clockwise,
        };
        assert_eq!(star(&params), star(&params));
        assert_eq!(
            rectangle(Vec2::ZERO, Vec2::new(8.0, 4.0), 1.0, PathDirection::Clockwise),
            rectangle(Vec2::ZERO, Vec2::new(8.0, 4.0), 1.0, PathDirection::Clockwise)
        );
    }

    #[test]
    fn rectangle_radius_is_clamped_to_half_the_short_side() {
        let shape = rectangle(Vec2::ZERO, Vec2::new(20.0, 10.0), 50.0, PathDirection::Clockwise);
        assert_eq!(shape.vertices.len(), 8);
        // Radius 5: the right edge collapses to a single point at y = 0.
        assert!(approx(shape.vertices[0].point, Vec2::new(10.0, 0.0)));
        assert!(approx(shape.vertices[1].point, Vec2::new(10.0, 0.0)));
        assert!(approx(shape.vertices[2].point, Vec2::new(5.0, 5.0)));
    }

    #[test]
    fn sharp_rectangle_has_four_corners() {
        let shape = rectangle(Vec2::new(5.0, 5.0), Vec2::new(10.0, 10.0), 0.0, PathDirection::Clockwise);
        let points: Vec<Vec2> = shape.vertices.iter().map(|v| v.point).collect();
        assert_eq!(
            points,
            vec![
                Vec2::new(10.0, 0.0),
                Vec2::new(10.0, 10.0),
                Vec2::new(0.0, 10.0),
                Vec2::new(0.0, 0.0)
            ]
        );
    }

    #[test]
    fn star_alternates_radii_and_polygon_does_not() {
        let mut params = StarParams {
            kind: StarKind::Star,
            position: Vec2::ZERO,
            points: 5.0,
            rotation: 0.0,
            outer_radius: 50.0,
            inner_radius: 20.0,
            outer_roundness: 0.0,
            inner_roundness: 0.0,
            direction: PathDirection::Clockwise,
        };
        let shape = star(&params);
        assert_eq!(shape.vertices.len(), 10);
        assert!(approx(shape.vertices[0].point, Vec2::new(0.0, -50.0)));
        assert!((shape.vertices[1].point.length() - 20.0).abs() < 1e-4);

        params.kind = StarKind::Polygon;
        let shape = star(&params);
        assert_eq!(shape.vertices.len(), 5);
        assert!(shape
            .vertices
            .iter()
            .all(|v| (v.point.length() - 50.0).abs() < 1e-3));
    }

    #[test]
    fn zero_points_give_an_empty_path() {
        let params = StarParams {
            kind: StarKind::Polygon,
            position: Vec2::ZERO,
            points: 0.0,
            rotation: 0.0,
            outer_radius: 10.0,
            inner_radius: 0.0,
            outer_roundness: 0.0,
            inner_roundness: 0.0,
            direction: PathDirection::Clockwise,
        };
        assert!(star(&params).is_empty());
    }
}

use glam::Vec2;

/// Timing curve for one keyframe segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Linear,
    /// Unit cubic Bézier through `(0,0)`, `p1`, `p2`, `(1,1)`.
    Cubic { p1: Vec2, p2: Vec2 },
}

impl Easing {
    /// Curve for a segment from the left keyframe's out tangent to the
    /// right keyframe's in tangent. Missing sides default to the linear
    /// control points.
    pub fn between(out_tangent: Option<Vec2>, in_tangent: Option<Vec2>) -> Self {
        match (out_tangent, in_tangent) {
            (None, None) => Easing::Linear,
            (p1, p2) => {
                let p1 = p1.unwrap_or(Vec2::ZERO);
                let p2 = p2.unwrap_or(Vec2::ONE);
                if p1.x == p1.y && p2.x == p2.y {
                    Easing::Linear
                } else {
                    Easing::Cubic { p1, p2 }
                }
            }
        }
    }

    pub fn apply(&self, progress: f32) -> f32 {
        match *self {
            Easing::Linear => progress.clamp(0.0, 1.0),
            Easing::Cubic { p1, p2 } => solve_cubic_bezier(p1, p2, progress),
        }
    }
}

fn bezier_component(a: f32, b: f32, t: f32) -> f32 {
    let one_minus_t = 1.0 - t;
    3.0 * one_minus_t * one_minus_t * t * a + 3.0 * one_minus_t * t * t * b + t * t * t
}

fn bezier_slope(a: f32, b: f32, t: f32) -> f32 {
    let one_minus_t = 1.0 - t;
    3.0 * one_minus_t * one_minus_t * a + 6.0 * one_minus_t * t * (b - a) + 3.0 * t * t * (1.0 - b)
}

/// Solves the unit cubic Bézier for `y` at horizontal position `x`.
///
/// Newton iterations converge quickly for ordinary curves; when the slope
/// flattens out the solver falls back to bisection, which keeps the result
/// monotonic in `x` for any curve whose control x values lie in `[0, 1]`.
pub fn solve_cubic_bezier(p1: Vec2, p2: Vec2, x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let (x1, x2) = (p1.x.clamp(0.0, 1.0), p2.x.clamp(0.0, 1.0));

    let mut t = x;
    let mut converged = false;
    for _ in 0..8 {
        let err = bezier_component(x1, x2, t) - x;
        if err.abs() < 1e-6 {
            converged = true;
            break;
        }
        let slope = bezier_slope(x1, x2, t);
        if slope.abs() < 1e-6 {
            break;
        }
        t -= err / slope;
        if !(0.0..=1.0).contains(&t) {
            break;
        }
    }

    if !converged {
        let (mut lo, mut hi) = (0.0f32, 1.0f32);
        t = x;
        for _ in 0..32 {
            let estimate = bezier_component(x1, x2, t);
            if (estimate - x).abs() < 1e-6 {
                break;
            }
            if estimate < x {
                lo = t;
            } else {
                hi = t;
            }
            t = (lo + hi) * 0.5;
        }
    }

    bezier_component(p1.y, p2.y, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_control_points_collapse_to_linear() {
        assert_eq!(
            Easing::between(Some(Vec2::new(0.2, 0.2)), Some(Vec2::new(0.8, 0.8))),
            Easing::Linear
        );
        assert_eq!(Easing::between(None, None), Easing::Linear);
    }

    #[test]
    fn ease_in_out_is_monotonic_and_pinned() {
        let easing = Easing::between(Some(Vec2::new(0.42, 0.0)), Some(Vec2::new(0.58, 1.0)));
        let mut previous = easing.apply(0.0);
        assert_eq!(previous, 0.0);
        for step in 1..=200 {
            let value = easing.apply(step as f32 / 200.0);
            assert!(
                value >= previous - 1e-6,
                "easing went backwards at step {step}: {previous} -> {value}"
            );
            previous = value;
        }
        assert_eq!(easing.apply(1.0), 1.0);
        assert!((easing.apply(0.5) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn steep_curves_still_solve() {
        // Near-vertical start: Newton's slope vanishes, bisection takes over.
        let y = solve_cubic_bezier(Vec2::new(0.0, 1.0), Vec2::new(0.0, 1.0), 0.01);
        assert!(y > 0.1, "expected a fast start, got {y}");
        let y = solve_cubic_bezier(Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.0), 0.5);
        assert!((0.0..=0.5).contains(&y), "expected a slow start, got {y}");
    }
}

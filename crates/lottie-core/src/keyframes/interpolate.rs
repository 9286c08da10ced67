use glam::{Vec2, Vec3, Vec4};

/// A value that can be blended between two keyframes.
pub trait Interpolatable: Sized + Clone {
    fn lerp(&self, other: &Self, t: f32) -> Self;

    /// Blends along the cubic `self, self + out, other + in, other`.
    /// `t` is a fraction of the path's arc length, so eased progress maps
    /// to distance travelled rather than to the raw curve parameter.
    /// Only point-like values honour the tangents.
    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        _spatial_out: Option<Vec3>,
        _spatial_in: Option<Vec3>,
    ) -> Self {
        self.lerp(other, t)
    }
}

fn cubic_point<V>(p0: V, p1: V, p2: V, p3: V, t: f32) -> V
where
    V: std::ops::Mul<f32, Output = V> + std::ops::Add<Output = V>,
{
    let one_minus_t = 1.0 - t;
    let one_minus_t_sq = one_minus_t * one_minus_t;
    let t_sq = t * t;
    p0 * (one_minus_t_sq * one_minus_t)
        + p1 * (3.0 * one_minus_t_sq * t)
        + p2 * (3.0 * one_minus_t * t_sq)
        + p3 * (t_sq * t)
}

const ARC_SAMPLES: usize = 32;

/// Maps an arc-length fraction to the curve parameter reaching it, using a
/// polyline of `ARC_SAMPLES` chords. `chord(a, b)` measures the curve
/// between parameters `a` and `b`.
fn arc_length_parameter(t: f32, chord: impl Fn(f32, f32) -> f32) -> f32 {
    if t <= 0.0 || t >= 1.0 {
        return t;
    }
    let step = 1.0 / ARC_SAMPLES as f32;
    let mut lengths = [0.0f32; ARC_SAMPLES + 1];
    for i in 1..=ARC_SAMPLES {
        let a = (i - 1) as f32 * step;
        lengths[i] = lengths[i - 1] + chord(a, a + step);
    }
    let total = lengths[ARC_SAMPLES];
    if total <= f32::EPSILON {
        return t;
    }
    let target = t * total;
    let i = lengths
        .partition_point(|&length| length < target)
        .clamp(1, ARC_SAMPLES);
    let (start, end) = (lengths[i - 1], lengths[i]);
    let within = if end > start {
        (target - start) / (end - start)
    } else {
        0.0
    };
    ((i - 1) as f32 + within) * step
}

fn has_spatial_tangents(out: Option<Vec3>, inn: Option<Vec3>) -> bool {
    out.is_some_and(|v| v != Vec3::ZERO) || inn.is_some_and(|v| v != Vec3::ZERO)
}

impl Interpolatable for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Interpolatable for Vec2 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec2::lerp(*self, *other, t)
    }

    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        spatial_out: Option<Vec3>,
        spatial_in: Option<Vec3>,
    ) -> Self {
        if !has_spatial_tangents(spatial_out, spatial_in) {
            return self.lerp(other, t);
        }
        let p1 = *self + spatial_out.unwrap_or(Vec3::ZERO).truncate();
        let p2 = *other + spatial_in.unwrap_or(Vec3::ZERO).truncate();
        let at = |u| cubic_point(*self, p1, p2, *other, u);
        let u = arc_length_parameter(t, |a, b| at(a).distance(at(b)));
        at(u)
    }
}

impl Interpolatable for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec3::lerp(*self, *other, t)
    }

    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        spatial_out: Option<Vec3>,
        spatial_in: Option<Vec3>,
    ) -> Self {
        if !has_spatial_tangents(spatial_out, spatial_in) {
            return self.lerp(other, t);
        }
        let p1 = *self + spatial_out.unwrap_or(Vec3::ZERO);
        let p2 = *other + spatial_in.unwrap_or(Vec3::ZERO);
        let at = |u| cubic_point(*self, p1, p2, *other, u);
        let u = arc_length_parameter(t, |a, b| at(a).distance(at(b)));
        at(u)
    }
}

impl Interpolatable for Vec4 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec4::lerp(*self, *other, t)
    }
}

// Gradient colour arrays. Mismatched lengths blend the shared prefix.
impl Interpolatable for Vec<f32> {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| a + (b - a) * t)
            .collect()
    }
}

impl Interpolatable for bool {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        if t < 1.0 {
            *self
        } else {
            *other
        }
    }
}

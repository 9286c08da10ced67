//! Keyframe model and interpolation.

mod easing;
mod interpolate;

pub use easing::{solve_cubic_bezier, Easing};
pub use interpolate::Interpolatable;

use glam::{Vec2, Vec3};
use lottie_data::model as data;

use crate::context::Diagnostics;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe<T> {
    /// Frame number.
    pub time: f32,
    pub value: T,
    /// Easing control point for the segment that ends here.
    pub in_tangent: Option<Vec2>,
    /// Easing control point for the segment that starts here.
    pub out_tangent: Option<Vec2>,
    pub spatial_in_tangent: Option<Vec3>,
    pub spatial_out_tangent: Option<Vec3>,
    /// The value stays constant until the next keyframe.
    pub is_hold: bool,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self {
            time,
            value,
            in_tangent: None,
            out_tangent: None,
            spatial_in_tangent: None,
            spatial_out_tangent: None,
            is_hold: false,
        }
    }

    pub fn hold(mut self) -> Self {
        self.is_hold = true;
        self
    }

    pub fn eased(mut self, out_tangent: Vec2, in_tangent: Vec2) -> Self {
        self.out_tangent = Some(out_tangent);
        self.in_tangent = Some(in_tangent);
        self
    }

    fn map<U>(&self, f: impl Fn(&T) -> U) -> Keyframe<U> {
        Keyframe {
            time: self.time,
            value: f(&self.value),
            in_tangent: self.in_tangent,
            out_tangent: self.out_tangent,
            spatial_in_tangent: self.spatial_in_tangent,
            spatial_out_tangent: self.spatial_out_tangent,
            is_hold: self.is_hold,
        }
    }
}

/// An ordered, non-empty keyframe sequence for one channel. Immutable
/// once built.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeGroup<T> {
    keyframes: Vec<Keyframe<T>>,
}

impl<T: Interpolatable> KeyframeGroup<T> {
    pub fn constant(value: T) -> Self {
        Self {
            keyframes: vec![Keyframe::new(0.0, value)],
        }
    }

    /// Validates ordering; times must increase strictly.
    pub fn new(keyframes: Vec<Keyframe<T>>) -> Result<Self> {
        if keyframes.is_empty() {
            return Err(EngineError::EmptyKeyframes);
        }
        for pair in keyframes.windows(2) {
            if pair[1].time <= pair[0].time {
                return Err(EngineError::UnorderedKeyframes {
                    previous: pair[0].time,
                    next: pair[1].time,
                });
            }
        }
        Ok(Self { keyframes })
    }

    /// Converts a decoded property, reporting malformed keyframes to
    /// `diagnostics` and dropping them when the policy allows.
    pub fn from_property<D>(
        property: &data::Property<D>,
        convert: impl Fn(&D) -> T,
        default: T,
        diagnostics: &Diagnostics,
    ) -> Self {
        match &property.k {
            data::Value::Default => Self::constant(default),
            data::Value::Static(v) => Self::constant(convert(v)),
            data::Value::Animated(raw) => {
                Self::from_authored(raw, &convert, default, diagnostics)
            }
        }
    }

    fn from_authored<D>(
        raw: &[data::Keyframe<D>],
        convert: &impl Fn(&D) -> T,
        default: T,
        diagnostics: &Diagnostics,
    ) -> Self {
        let mut keyframes: Vec<Keyframe<T>> = Vec::with_capacity(raw.len());
        // Easing and spatial handles authored on the previous keyframe
        // for the segment that ends at the next one.
        let mut pending_in: Option<Vec2> = None;
        let mut pending_spatial_in: Option<Vec3> = None;
        let mut previous_end: Option<T> = None;

        for (index, kf) in raw.iter().enumerate() {
            let value = kf
                .s
                .as_ref()
                .map(convert)
                .or_else(|| previous_end.take())
                .or_else(|| keyframes.last().map(|k| k.value.clone()));
            let Some(value) = value else {
                diagnostics.assert(false, || format!("keyframe {index} has no value"));
                continue;
            };

            if let Some(last) = keyframes.last() {
                if kf.t <= last.time {
                    let previous = last.time;
                    diagnostics.assert(false, || {
                        format!("keyframe {index} at {} does not follow {previous}", kf.t)
                    });
                    continue;
                }
            }

            keyframes.push(Keyframe {
                time: kf.t,
                value,
                in_tangent: pending_in.take(),
                out_tangent: kf.o.as_ref().map(|o| tangent_point(o, 0.0)),
                spatial_in_tangent: pending_spatial_in.take(),
                spatial_out_tangent: kf.to.as_deref().map(spatial_vector),
                is_hold: kf.h == Some(1),
            });
            pending_in = kf.i.as_ref().map(|i| tangent_point(i, 1.0));
            pending_spatial_in = kf.ti.as_deref().map(spatial_vector);
            previous_end = kf.e.as_ref().map(convert);
        }

        if keyframes.is_empty() {
            diagnostics.assert(false, || "animated property has no usable keyframes".into());
            return Self::constant(default);
        }
        Self { keyframes }
    }
}

fn tangent_point(tangent: &data::BezierTangent, fallback: f32) -> Vec2 {
    Vec2::new(
        tangent.x.first().copied().unwrap_or(fallback),
        tangent.y.first().copied().unwrap_or(fallback),
    )
}

fn spatial_vector(v: &[f32]) -> Vec3 {
    Vec3::new(
        v.first().copied().unwrap_or(0.0),
        v.get(1).copied().unwrap_or(0.0),
        v.get(2).copied().unwrap_or(0.0),
    )
}

impl<T> KeyframeGroup<T> {
    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    /// More than one keyframe.
    pub fn is_animated(&self) -> bool {
        self.keyframes.len() > 1
    }

    /// First and last keyframe times of an animated group.
    pub fn animated_range(&self) -> Option<(f32, f32)> {
        match (self.keyframes.first(), self.keyframes.last()) {
            (Some(first), Some(last)) if self.is_animated() => Some((first.time, last.time)),
            _ => None,
        }
    }

    /// True when every segment holds its value.
    pub fn is_all_hold(&self) -> bool {
        let segments = self.keyframes.len().saturating_sub(1);
        self.keyframes[..segments].iter().all(|k| k.is_hold)
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> KeyframeGroup<U> {
        KeyframeGroup {
            keyframes: self.keyframes.iter().map(|k| k.map(&f)).collect(),
        }
    }

    /// Shifts and stretches keyframe times: `time * stretch + offset`.
    pub fn retimed(mut self, stretch: f32, offset: f32) -> Self {
        for kf in &mut self.keyframes {
            kf.time = kf.time * stretch + offset;
        }
        self
    }
}

impl<T: Interpolatable> KeyframeGroup<T> {
    /// Value at `frame`, clamped to the first and last keyframes.
    pub fn value_at(&self, frame: f32) -> T {
        let keyframes = &self.keyframes;
        let idx = keyframes.partition_point(|kf| kf.time <= frame);
        if idx == 0 {
            return keyframes[0].value.clone();
        }
        if idx >= keyframes.len() {
            return keyframes[keyframes.len() - 1].value.clone();
        }

        let start = &keyframes[idx - 1];
        let end = &keyframes[idx];
        if start.is_hold {
            return start.value.clone();
        }
        let progress = (frame - start.time) / (end.time - start.time);
        let eased = Easing::between(start.out_tangent, end.in_tangent).apply(progress);
        start.value.lerp_spatial(
            &end.value,
            eased,
            start.spatial_out_tangent,
            end.spatial_in_tangent,
        )
    }
}

use lottie_data::model as data;

use super::EvaluationStats;
use crate::context::Diagnostics;
use crate::keyframes::{Interpolatable, KeyframeGroup};

/// A keyframed value cached at the last frame it was evaluated for.
#[derive(Debug, Clone)]
pub struct AnimatableProperty<T> {
    keyframes: KeyframeGroup<T>,
    value: T,
    last_update_frame: Option<f32>,
}

impl<T: Interpolatable + PartialEq> AnimatableProperty<T> {
    pub fn new(keyframes: KeyframeGroup<T>) -> Self {
        let first = keyframes.keyframes()[0].time;
        let value = keyframes.value_at(first);
        Self {
            keyframes,
            value,
            last_update_frame: None,
        }
    }

    pub fn constant(value: T) -> Self {
        Self::new(KeyframeGroup::constant(value))
    }

    pub fn from_data<D>(
        property: &data::Property<D>,
        convert: impl Fn(&D) -> T,
        default: T,
        diagnostics: &Diagnostics,
    ) -> Self {
        Self::new(KeyframeGroup::from_property(
            property,
            convert,
            default,
            diagnostics,
        ))
    }

    /// Constant properties never go stale.
    pub fn needs_update(&self, frame: f32) -> bool {
        self.keyframes.is_animated() && self.last_update_frame != Some(frame)
    }

    /// Re-evaluates for `frame` if stale. Returns whether the value changed.
    pub fn update(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        if !self.needs_update(frame) {
            return false;
        }
        stats.property_evaluations += 1;
        self.last_update_frame = Some(frame);
        let next = self.keyframes.value_at(frame);
        if next == self.value {
            return false;
        }
        self.value = next;
        true
    }

    /// Uncached evaluation at an arbitrary frame.
    pub fn value_at(&self, frame: f32) -> T {
        self.keyframes.value_at(frame)
    }
}

impl<T> AnimatableProperty<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn keyframes(&self) -> &KeyframeGroup<T> {
        &self.keyframes
    }

    pub fn is_animated(&self) -> bool {
        self.keyframes.is_animated()
    }
}

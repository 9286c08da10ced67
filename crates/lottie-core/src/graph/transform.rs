use glam::{Mat3, Vec2};
use lottie_data::model as data;

use super::{AnimatableProperty, AnimatorNode, EvaluationStats, NodeState};
use crate::context::Diagnostics;

/// Decomposed 2D transform in the units surfaces consume: scale as a
/// fraction, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformComponents {
    pub anchor: Vec2,
    pub position: Vec2,
    pub scale: Vec2,
    pub rotation: f32,
    pub skew: f32,
    pub skew_axis: f32,
}

impl Default for TransformComponents {
    fn default() -> Self {
        Self {
            anchor: Vec2::ZERO,
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            skew: 0.0,
            skew_axis: 0.0,
        }
    }
}

impl TransformComponents {
    /// `T * R * Skew * S * -A`.
    pub fn matrix(&self) -> Mat3 {
        let translate = Mat3::from_translation(self.position);
        let rotate = Mat3::from_angle(self.rotation.to_radians());
        let scale = Mat3::from_scale(self.scale);
        let anchor = Mat3::from_translation(-self.anchor);
        if self.skew == 0.0 {
            return translate * rotate * scale * anchor;
        }
        let axis = self.skew_axis.to_radians();
        let shear = Mat3::from_cols(
            glam::Vec3::X,
            glam::Vec3::new((-self.skew.to_radians()).tan(), 1.0, 0.0),
            glam::Vec3::Z,
        );
        let skew = Mat3::from_angle(axis) * shear * Mat3::from_angle(-axis);
        translate * rotate * skew * scale * anchor
    }
}

/// Position authored either as one vector or as separate x/y channels.
#[derive(Debug, Clone)]
pub enum PositionChannel {
    Unified(AnimatableProperty<Vec2>),
    Split {
        x: AnimatableProperty<f32>,
        y: AnimatableProperty<f32>,
    },
}

impl PositionChannel {
    pub fn from_data(position: &data::PositionProperty, diagnostics: &Diagnostics) -> Self {
        match position {
            data::PositionProperty::Unified(p) => PositionChannel::Unified(
                AnimatableProperty::from_data(p, |v| Vec2::new(v.0[0], v.0[1]), Vec2::ZERO, diagnostics),
            ),
            data::PositionProperty::Split { x, y } => PositionChannel::Split {
                x: AnimatableProperty::from_data(x, |v| *v, 0.0, diagnostics),
                y: AnimatableProperty::from_data(y, |v| *v, 0.0, diagnostics),
            },
        }
    }

    pub fn from_vec2(position: &data::Property<data::Vec2>, diagnostics: &Diagnostics) -> Self {
        PositionChannel::Unified(AnimatableProperty::from_data(
            position,
            |v| Vec2::from_slice(v),
            Vec2::ZERO,
            diagnostics,
        ))
    }

    pub fn value(&self) -> Vec2 {
        match self {
            PositionChannel::Unified(p) => *p.value(),
            PositionChannel::Split { x, y } => Vec2::new(*x.value(), *y.value()),
        }
    }

    pub fn value_at(&self, frame: f32) -> Vec2 {
        match self {
            PositionChannel::Unified(p) => p.value_at(frame),
            PositionChannel::Split { x, y } => Vec2::new(x.value_at(frame), y.value_at(frame)),
        }
    }

    pub fn needs_update(&self, frame: f32) -> bool {
        match self {
            PositionChannel::Unified(p) => p.needs_update(frame),
            PositionChannel::Split { x, y } => x.needs_update(frame) || y.needs_update(frame),
        }
    }

    pub fn update(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        match self {
            PositionChannel::Unified(p) => p.update(frame, stats),
            PositionChannel::Split { x, y } => {
                let x_changed = x.update(frame, stats);
                y.update(frame, stats) || x_changed
            }
        }
    }

    pub fn is_animated(&self) -> bool {
        match self {
            PositionChannel::Unified(p) => p.is_animated(),
            PositionChannel::Split { x, y } => x.is_animated() || y.is_animated(),
        }
    }

    pub fn animated_range(&self) -> Option<(f32, f32)> {
        match self {
            PositionChannel::Unified(p) => p.keyframes().animated_range(),
            PositionChannel::Split { x, y } => union_range([
                x.keyframes().animated_range(),
                y.keyframes().animated_range(),
            ]),
        }
    }
}

pub(crate) fn union_range(
    ranges: impl IntoIterator<Item = Option<(f32, f32)>>,
) -> Option<(f32, f32)> {
    ranges
        .into_iter()
        .flatten()
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
}

/// Layer or group transform. Layers additionally resolve a global matrix
/// through their parent chain.
#[derive(Debug, Clone)]
pub struct TransformNode {
    state: NodeState,
    pub anchor: AnimatableProperty<Vec2>,
    pub position: PositionChannel,
    pub scale: AnimatableProperty<Vec2>,
    pub rotation: AnimatableProperty<f32>,
    pub skew: AnimatableProperty<f32>,
    pub skew_axis: AnimatableProperty<f32>,
    pub opacity: AnimatableProperty<f32>,
    auto_orient: bool,
    frame: f32,
    components: TransformComponents,
    local: Mat3,
    global: Mat3,
}

impl TransformNode {
    pub fn from_data(transform: &data::Transform, auto_orient: bool, diagnostics: &Diagnostics) -> Self {
        let mut node = Self {
            state: NodeState::built(),
            anchor: AnimatableProperty::from_data(
                &transform.a,
                |v| Vec2::new(v.0[0], v.0[1]),
                Vec2::ZERO,
                diagnostics,
            ),
            position: PositionChannel::from_data(&transform.p, diagnostics),
            scale: AnimatableProperty::from_data(
                &transform.s,
                |v| Vec2::new(v.0[0], v.0[1]) / 100.0,
                Vec2::ONE,
                diagnostics,
            ),
            rotation: AnimatableProperty::from_data(&transform.rz, |v| *v, 0.0, diagnostics),
            skew: AnimatableProperty::from_data(&transform.sk, |v| *v, 0.0, diagnostics),
            skew_axis: AnimatableProperty::from_data(&transform.sa, |v| *v, 0.0, diagnostics),
            opacity: AnimatableProperty::from_data(&transform.o, |v| *v / 100.0, 1.0, diagnostics),
            auto_orient,
            frame: 0.0,
            components: TransformComponents::default(),
            local: Mat3::IDENTITY,
            global: Mat3::IDENTITY,
        };
        node.rebuild_output();
        node.global = node.local;
        node
    }

    pub fn identity() -> Self {
        Self::from_data(&data::Transform::default(), false, &Diagnostics::default())
    }

    pub fn components(&self) -> &TransformComponents {
        &self.components
    }

    pub fn local(&self) -> Mat3 {
        self.local
    }

    pub fn global(&self) -> Mat3 {
        self.global
    }

    pub fn opacity(&self) -> f32 {
        *self.opacity.value()
    }

    pub fn is_auto_oriented(&self) -> bool {
        self.auto_orient && self.position.is_animated()
    }

    /// Parent-first composition: `parent * local`.
    pub fn resolve_global(&mut self, parent: Option<Mat3>) {
        self.global = match parent {
            Some(parent) => parent * self.local,
            None => self.local,
        };
    }

    /// Uncached components at `frame`.
    pub fn components_at(&self, frame: f32) -> TransformComponents {
        TransformComponents {
            anchor: self.anchor.value_at(frame),
            position: self.position.value_at(frame),
            scale: self.scale.value_at(frame),
            rotation: self.rotation.value_at(frame) + self.orientation_at(frame),
            skew: self.skew.value_at(frame),
            skew_axis: self.skew_axis.value_at(frame),
        }
    }

    /// Frame the motion tangent is taken at. Outside the motion path the
    /// layer keeps facing along its first or last tangent.
    fn orientation_frame(&self, frame: f32) -> f32 {
        match self.position.animated_range() {
            Some((first, last)) => frame.clamp(first, last),
            None => frame,
        }
    }

    /// Extra rotation, in degrees, that keeps the layer facing along its
    /// motion path.
    fn orientation_at(&self, frame: f32) -> f32 {
        if !self.is_auto_oriented() {
            return 0.0;
        }
        const STEP: f32 = 0.01;
        let frame = self.orientation_frame(frame);
        let position = self.position.value_at(frame);
        let mut delta = self.position.value_at(frame + STEP) - position;
        if delta.length_squared() <= f32::EPSILON {
            delta = position - self.position.value_at(frame - STEP);
        }
        if delta.length_squared() <= f32::EPSILON {
            return 0.0;
        }
        delta.y.atan2(delta.x).to_degrees()
    }

    /// First and last keyframe over every component that moves.
    pub fn animated_range(&self) -> Option<(f32, f32)> {
        union_range([
            self.anchor.keyframes().animated_range(),
            self.position.animated_range(),
            self.scale.keyframes().animated_range(),
            self.rotation.keyframes().animated_range(),
            self.skew.keyframes().animated_range(),
            self.skew_axis.keyframes().animated_range(),
        ])
    }
}

impl AnimatorNode for TransformNode {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.anchor.needs_update(frame)
            || self.position.needs_update(frame)
            || self.scale.needs_update(frame)
            || self.rotation.needs_update(frame)
            || self.skew.needs_update(frame)
            || self.skew_axis.needs_update(frame)
            || self.opacity.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        // The tangent can turn while the position value stays put.
        let turned = self.is_auto_oriented()
            && self.orientation_frame(frame) != self.orientation_frame(self.frame);
        self.frame = frame;
        let mut changed = turned;
        changed |= self.anchor.update(frame, stats);
        changed |= self.position.update(frame, stats);
        changed |= self.scale.update(frame, stats);
        changed |= self.rotation.update(frame, stats);
        changed |= self.skew.update(frame, stats);
        changed |= self.skew_axis.update(frame, stats);
        changed |= self.opacity.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        let position = self.position.value();
        self.components = TransformComponents {
            anchor: *self.anchor.value(),
            position,
            scale: *self.scale.value(),
            rotation: *self.rotation.value() + self.orientation_at(self.frame),
            skew: *self.skew.value(),
            skew_axis: *self.skew_axis.value(),
        };
        self.local = self.components.matrix();
    }
}

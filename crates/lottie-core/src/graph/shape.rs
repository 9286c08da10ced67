use std::collections::HashMap;

use glam::{Mat3, Vec2, Vec4};
use lottie_data::model as data;

use super::transform::{union_range, PositionChannel, TransformNode};
use super::{AnimatableProperty, AnimatorNode, EvaluationStats, NodeState};
use crate::context::Diagnostics;
use crate::geometry::{
    self, BezierShape, CompoundPath, DashPattern, GradientRamp, PathDirection, StarKind,
    StarParams, TrimValues,
};
use crate::surface::{
    FillRule, FillStyle, GradientKind, GradientPaint, LineCap, LineJoin, Paint, PaintOutput,
    StrokeStyle,
};

fn color(v: &data::Vec4) -> Vec4 {
    Vec4::from_array(*v)
}

fn vec2(v: &data::Vec2) -> Vec2 {
    Vec2::from_array(*v)
}

fn percent(v: &f32) -> f32 {
    *v / 100.0
}

macro_rules! node_state {
    () => {
        fn state(&self) -> &NodeState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut NodeState {
            &mut self.state
        }
    };
}

#[derive(Debug, Clone)]
pub struct EllipseNode {
    state: NodeState,
    pub size: AnimatableProperty<Vec2>,
    pub position: AnimatableProperty<Vec2>,
    direction: PathDirection,
    path: CompoundPath,
}

impl EllipseNode {
    pub fn from_data(shape: &data::EllipseShape, diagnostics: &Diagnostics) -> Self {
        let mut node = Self {
            state: NodeState::built(),
            size: AnimatableProperty::from_data(&shape.s, vec2, Vec2::ZERO, diagnostics),
            position: AnimatableProperty::from_data(&shape.p, vec2, Vec2::ZERO, diagnostics),
            direction: PathDirection::from_data(shape.d),
            path: CompoundPath::default(),
        };
        node.rebuild_output();
        node
    }

    pub fn path_at(&self, frame: f32) -> CompoundPath {
        CompoundPath::single(geometry::ellipse(
            self.size.value_at(frame),
            self.position.value_at(frame),
            self.direction,
        ))
    }

    pub fn animated_range(&self) -> Option<(f32, f32)> {
        union_range([
            self.size.keyframes().animated_range(),
            self.position.keyframes().animated_range(),
        ])
    }
}

impl AnimatorNode for EllipseNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.size.needs_update(frame) || self.position.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let size = self.size.update(frame, stats);
        self.position.update(frame, stats) || size
    }

    fn rebuild_output(&mut self) {
        self.path = CompoundPath::single(geometry::ellipse(
            *self.size.value(),
            *self.position.value(),
            self.direction,
        ));
    }
}

#[derive(Debug, Clone)]
pub struct RectangleNode {
    state: NodeState,
    pub size: AnimatableProperty<Vec2>,
    pub position: AnimatableProperty<Vec2>,
    pub corner_radius: AnimatableProperty<f32>,
    direction: PathDirection,
    path: CompoundPath,
}

impl RectangleNode {
    pub fn from_data(shape: &data::RectShape, diagnostics: &Diagnostics) -> Self {
        let mut node = Self {
            state: NodeState::built(),
            size: AnimatableProperty::from_data(&shape.s, vec2, Vec2::ZERO, diagnostics),
            position: AnimatableProperty::from_data(&shape.p, vec2, Vec2::ZERO, diagnostics),
            corner_radius: AnimatableProperty::from_data(&shape.r, |v| *v, 0.0, diagnostics),
            direction: PathDirection::from_data(shape.d),
            path: CompoundPath::default(),
        };
        node.rebuild_output();
        node
    }

    pub fn path_at(&self, frame: f32) -> CompoundPath {
        CompoundPath::single(geometry::rectangle(
            self.position.value_at(frame),
            self.size.value_at(frame),
            self.corner_radius.value_at(frame),
            self.direction,
        ))
    }

    pub fn animated_range(&self) -> Option<(f32, f32)> {
        union_range([
            self.size.keyframes().animated_range(),
            self.position.keyframes().animated_range(),
            self.corner_radius.keyframes().animated_range(),
        ])
    }
}

impl AnimatorNode for RectangleNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.size.needs_update(frame)
            || self.position.needs_update(frame)
            || self.corner_radius.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.size.update(frame, stats);
        changed |= self.position.update(frame, stats);
        changed |= self.corner_radius.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        self.path = CompoundPath::single(geometry::rectangle(
            *self.position.value(),
            *self.size.value(),
            *self.corner_radius.value(),
            self.direction,
        ));
    }
}

#[derive(Debug, Clone)]
pub struct StarNode {
    state: NodeState,
    kind: StarKind,
    direction: PathDirection,
    pub position: PositionChannel,
    pub points: AnimatableProperty<f32>,
    pub rotation: AnimatableProperty<f32>,
    pub outer_radius: AnimatableProperty<f32>,
    pub inner_radius: AnimatableProperty<f32>,
    pub outer_roundness: AnimatableProperty<f32>,
    pub inner_roundness: AnimatableProperty<f32>,
    path: CompoundPath,
}

impl StarNode {
    pub fn from_data(shape: &data::PolystarShape, diagnostics: &Diagnostics) -> Self {
        let scalar = |p: &data::Property<f32>| AnimatableProperty::from_data(p, |v| *v, 0.0, diagnostics);
        let optional = |p: &Option<data::Property<f32>>| match p {
            Some(p) => scalar(p),
            None => AnimatableProperty::constant(0.0),
        };
        let mut node = Self {
            state: NodeState::built(),
            kind: StarKind::from_data(shape.sy),
            direction: PathDirection::from_data(shape.d),
            position: PositionChannel::from_data(&shape.p, diagnostics),
            points: scalar(&shape.pt),
            rotation: scalar(&shape.r),
            outer_radius: scalar(&shape.or),
            inner_radius: optional(&shape.ir),
            outer_roundness: scalar(&shape.os),
            inner_roundness: optional(&shape.is),
            path: CompoundPath::default(),
        };
        node.rebuild_output();
        node
    }

    fn params_at(&self, frame: f32) -> StarParams {
        StarParams {
            kind: self.kind,
            position: self.position.value_at(frame),
            points: self.points.value_at(frame),
            rotation: self.rotation.value_at(frame),
            outer_radius: self.outer_radius.value_at(frame),
            inner_radius: self.inner_radius.value_at(frame),
            outer_roundness: self.outer_roundness.value_at(frame),
            inner_roundness: self.inner_roundness.value_at(frame),
            direction: self.direction,
        }
    }

    pub fn path_at(&self, frame: f32) -> CompoundPath {
        CompoundPath::single(geometry::star(&self.params_at(frame)))
    }

    pub fn animated_range(&self) -> Option<(f32, f32)> {
        union_range([
            self.position.animated_range(),
            self.points.keyframes().animated_range(),
            self.rotation.keyframes().animated_range(),
            self.outer_radius.keyframes().animated_range(),
            self.inner_radius.keyframes().animated_range(),
            self.outer_roundness.keyframes().animated_range(),
            self.inner_roundness.keyframes().animated_range(),
        ])
    }
}

impl AnimatorNode for StarNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.position.needs_update(frame)
            || self.points.needs_update(frame)
            || self.rotation.needs_update(frame)
            || self.outer_radius.needs_update(frame)
            || self.inner_radius.needs_update(frame)
            || self.outer_roundness.needs_update(frame)
            || self.inner_roundness.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.position.update(frame, stats);
        changed |= self.points.update(frame, stats);
        changed |= self.rotation.update(frame, stats);
        changed |= self.outer_radius.update(frame, stats);
        changed |= self.inner_radius.update(frame, stats);
        changed |= self.outer_roundness.update(frame, stats);
        changed |= self.inner_roundness.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        let params = StarParams {
            kind: self.kind,
            position: self.position.value(),
            points: *self.points.value(),
            rotation: *self.rotation.value(),
            outer_radius: *self.outer_radius.value(),
            inner_radius: *self.inner_radius.value(),
            outer_roundness: *self.outer_roundness.value(),
            inner_roundness: *self.inner_roundness.value(),
            direction: self.direction,
        };
        self.path = CompoundPath::single(geometry::star(&params));
    }
}

/// Free-form path. Its keyframes interpolate whole vertex lists.
#[derive(Debug, Clone)]
pub struct PathNode {
    state: NodeState,
    pub shape: AnimatableProperty<BezierShape>,
    direction: PathDirection,
    path: CompoundPath,
}

impl PathNode {
    pub fn from_data(shape: &data::PathShape, diagnostics: &Diagnostics) -> Self {
        let mut node = Self {
            state: NodeState::built(),
            shape: AnimatableProperty::from_data(
                &shape.ks,
                BezierShape::from_data,
                BezierShape::default(),
                diagnostics,
            ),
            direction: PathDirection::from_data(shape.d),
            path: CompoundPath::default(),
        };
        node.rebuild_output();
        node
    }

    pub fn oriented(&self, shape: &BezierShape) -> CompoundPath {
        match self.direction {
            PathDirection::Clockwise => CompoundPath::single(shape.clone()),
            PathDirection::CounterClockwise => CompoundPath::single(shape.reversed()),
        }
    }

    pub fn path_at(&self, frame: f32) -> CompoundPath {
        self.oriented(&self.shape.value_at(frame))
    }
}

impl AnimatorNode for PathNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.shape.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        self.shape.update(frame, stats)
    }

    fn rebuild_output(&mut self) {
        self.path = self.oriented(self.shape.value());
    }
}

/// Several geometry items drawn as one outline: the result of a merge
/// item, or of one paint covering more than one shape. Built once when
/// the group is constructed; sources always precede it in the group.
#[derive(Debug, Clone)]
pub struct CombinedShapeNode {
    state: NodeState,
    sources: Vec<usize>,
    source_revisions: Vec<u64>,
    inputs: Vec<CompoundPath>,
    merge_mode: Option<u8>,
    path: CompoundPath,
}

impl CombinedShapeNode {
    fn new(sources: Vec<usize>, merge_mode: Option<u8>, items: &[ShapeItem]) -> Self {
        let inputs: Vec<CompoundPath> = sources
            .iter()
            .map(|&s| items[s].path().cloned().unwrap_or_default())
            .collect();
        let source_revisions = sources.iter().map(|&s| items[s].revision()).collect();
        let path = geometry::merge(inputs.iter().cloned());
        Self {
            state: NodeState::built(),
            sources,
            source_revisions,
            inputs,
            merge_mode,
            path,
        }
    }

    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    pub fn merge_mode(&self) -> Option<u8> {
        self.merge_mode
    }

    /// Pulls source outputs whose revision moved since the last pull.
    fn sync(&mut self, items: &[ShapeItem]) {
        for (slot, &source) in self.sources.iter().enumerate() {
            let revision = items[source].revision();
            if revision != self.source_revisions[slot] {
                self.source_revisions[slot] = revision;
                self.inputs[slot] = items[source].path().cloned().unwrap_or_default();
                self.state.has_upstream_updates = true;
            }
        }
    }
}

impl AnimatorNode for CombinedShapeNode {
    node_state!();

    fn has_stale_properties(&self, _frame: f32) -> bool {
        false
    }

    fn update_properties(&mut self, _frame: f32, _stats: &mut EvaluationStats) -> bool {
        false
    }

    fn rebuild_output(&mut self) {
        self.path = geometry::merge(self.inputs.iter().cloned());
    }
}

/// Width, joins and dashes shared by solid and gradient strokes.
#[derive(Debug, Clone)]
pub struct StrokeParams {
    pub width: AnimatableProperty<f32>,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    /// Dash and gap lengths in authored order.
    pub dashes: Vec<AnimatableProperty<f32>>,
    pub dash_offset: Option<AnimatableProperty<f32>>,
}

impl StrokeParams {
    fn from_data(
        width: &data::Property<f32>,
        lc: u8,
        lj: u8,
        ml: Option<f32>,
        dash: &[data::DashProperty],
        diagnostics: &Diagnostics,
    ) -> Self {
        let scalar = |p: &data::Property<f32>| AnimatableProperty::from_data(p, |v| *v, 0.0, diagnostics);
        let mut dashes = Vec::new();
        let mut dash_offset = None;
        for entry in dash {
            if entry.n.as_deref() == Some("o") {
                dash_offset = Some(scalar(&entry.v));
            } else {
                dashes.push(scalar(&entry.v));
            }
        }
        Self {
            width: scalar(width),
            cap: LineCap::from_data(lc),
            join: LineJoin::from_data(lj),
            miter_limit: ml.unwrap_or(4.0),
            dashes,
            dash_offset,
        }
    }

    fn needs_update(&self, frame: f32) -> bool {
        self.width.needs_update(frame)
            || self.dashes.iter().any(|d| d.needs_update(frame))
            || self.dash_offset.as_ref().is_some_and(|d| d.needs_update(frame))
    }

    fn update(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.width.update(frame, stats);
        for dash in &mut self.dashes {
            changed |= dash.update(frame, stats);
        }
        if let Some(offset) = &mut self.dash_offset {
            changed |= offset.update(frame, stats);
        }
        changed
    }

    pub fn is_dash_animated(&self) -> bool {
        self.dashes.iter().any(AnimatableProperty::is_animated)
            || self.dash_offset.as_ref().is_some_and(AnimatableProperty::is_animated)
    }

    fn dash_at(&self, frame: Option<f32>) -> Option<DashPattern> {
        let read = |p: &AnimatableProperty<f32>| match frame {
            Some(frame) => p.value_at(frame),
            None => *p.value(),
        };
        let lengths = self.dashes.iter().map(read).collect();
        let offset = self.dash_offset.as_ref().map(read).unwrap_or(0.0);
        DashPattern::resolve(lengths, offset)
    }

    fn style(&self, paint: Paint, opacity: f32, width: f32, frame: Option<f32>) -> StrokeStyle {
        StrokeStyle {
            paint,
            opacity,
            width,
            cap: self.cap,
            join: self.join,
            miter_limit: self.miter_limit,
            dash: self.dash_at(frame),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FillNode {
    state: NodeState,
    pub color: AnimatableProperty<Vec4>,
    pub opacity: AnimatableProperty<f32>,
    rule: FillRule,
    output: FillStyle,
}

impl FillNode {
    pub fn from_data(shape: &data::FillShape, diagnostics: &Diagnostics) -> Self {
        let mut node = Self {
            state: NodeState::built(),
            color: AnimatableProperty::from_data(&shape.c, color, Vec4::ONE, diagnostics),
            opacity: AnimatableProperty::from_data(&shape.o, percent, 1.0, diagnostics),
            rule: FillRule::from_data(shape.r),
            output: FillStyle {
                paint: Paint::Solid(Vec4::ONE),
                opacity: 1.0,
                rule: FillRule::NonZero,
            },
        };
        node.rebuild_output();
        node
    }

    pub fn output(&self) -> &FillStyle {
        &self.output
    }

    pub fn output_at(&self, frame: f32) -> FillStyle {
        FillStyle {
            paint: Paint::Solid(self.color.value_at(frame)),
            opacity: self.opacity.value_at(frame),
            rule: self.rule,
        }
    }
}

impl AnimatorNode for FillNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.color.needs_update(frame) || self.opacity.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let color = self.color.update(frame, stats);
        self.opacity.update(frame, stats) || color
    }

    fn rebuild_output(&mut self) {
        self.output = FillStyle {
            paint: Paint::Solid(*self.color.value()),
            opacity: *self.opacity.value(),
            rule: self.rule,
        };
    }
}

#[derive(Debug, Clone)]
pub struct StrokeNode {
    state: NodeState,
    pub color: AnimatableProperty<Vec4>,
    pub opacity: AnimatableProperty<f32>,
    pub params: StrokeParams,
    output: StrokeStyle,
}

impl StrokeNode {
    pub fn from_data(shape: &data::StrokeShape, diagnostics: &Diagnostics) -> Self {
        let params = StrokeParams::from_data(&shape.w, shape.lc, shape.lj, shape.ml, &shape.d, diagnostics);
        let output = params.style(Paint::Solid(Vec4::ONE), 1.0, 0.0, None);
        let mut node = Self {
            state: NodeState::built(),
            color: AnimatableProperty::from_data(&shape.c, color, Vec4::ONE, diagnostics),
            opacity: AnimatableProperty::from_data(&shape.o, percent, 1.0, diagnostics),
            params,
            output,
        };
        node.rebuild_output();
        node
    }

    pub fn output(&self) -> &StrokeStyle {
        &self.output
    }

    pub fn output_at(&self, frame: f32) -> StrokeStyle {
        self.params.style(
            Paint::Solid(self.color.value_at(frame)),
            self.opacity.value_at(frame),
            self.params.width.value_at(frame),
            Some(frame),
        )
    }
}

impl AnimatorNode for StrokeNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.color.needs_update(frame) || self.opacity.needs_update(frame) || self.params.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.color.update(frame, stats);
        changed |= self.opacity.update(frame, stats);
        changed |= self.params.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        self.output = self.params.style(
            Paint::Solid(*self.color.value()),
            *self.opacity.value(),
            *self.params.width.value(),
            None,
        );
    }
}

/// Gradient fill, or gradient stroke when `stroke` is present.
#[derive(Debug, Clone)]
pub struct GradientNode {
    state: NodeState,
    kind: GradientKind,
    stop_count: usize,
    rule: FillRule,
    pub start: AnimatableProperty<Vec2>,
    pub end: AnimatableProperty<Vec2>,
    pub colors: AnimatableProperty<Vec<f32>>,
    pub opacity: AnimatableProperty<f32>,
    pub stroke: Option<StrokeParams>,
    output: PaintOutput,
}

impl GradientNode {
    pub fn fill_from_data(shape: &data::GradientFillShape, diagnostics: &Diagnostics) -> Self {
        Self::build(
            shape.t,
            &shape.g,
            &shape.s,
            &shape.e,
            &shape.o,
            FillRule::from_data(shape.r),
            None,
            diagnostics,
        )
    }

    pub fn stroke_from_data(shape: &data::GradientStrokeShape, diagnostics: &Diagnostics) -> Self {
        let stroke = StrokeParams::from_data(&shape.w, shape.lc, shape.lj, shape.ml, &shape.d, diagnostics);
        Self::build(
            shape.t,
            &shape.g,
            &shape.s,
            &shape.e,
            &shape.o,
            FillRule::NonZero,
            Some(stroke),
            diagnostics,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        kind: u8,
        gradient: &data::GradientColors,
        start: &data::Property<data::Vec2>,
        end: &data::Property<data::Vec2>,
        opacity: &data::Property<f32>,
        rule: FillRule,
        stroke: Option<StrokeParams>,
        diagnostics: &Diagnostics,
    ) -> Self {
        let stop_count = gradient.p as usize;
        let colors = AnimatableProperty::from_data(&gradient.k, Clone::clone, Vec::new(), diagnostics);
        for kf in colors.keyframes().keyframes() {
            if let Err(err) = GradientRamp::decode(&kf.value, stop_count) {
                diagnostics.assert(false, || err.to_string());
            }
        }
        let mut node = Self {
            state: NodeState::built(),
            kind: if kind == 2 {
                GradientKind::Radial
            } else {
                GradientKind::Linear
            },
            stop_count,
            rule,
            start: AnimatableProperty::from_data(start, vec2, Vec2::ZERO, diagnostics),
            end: AnimatableProperty::from_data(end, vec2, Vec2::ZERO, diagnostics),
            colors,
            opacity: AnimatableProperty::from_data(opacity, percent, 1.0, diagnostics),
            stroke,
            output: PaintOutput::Fill(FillStyle {
                paint: Paint::Solid(Vec4::ZERO),
                opacity: 0.0,
                rule,
            }),
        };
        node.rebuild_output();
        node
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count
    }

    pub fn output(&self) -> &PaintOutput {
        &self.output
    }

    fn compose(&self, start: Vec2, end: Vec2, raw: &[f32], opacity: f32, frame: Option<f32>) -> PaintOutput {
        let paint = Paint::Gradient(GradientPaint {
            kind: self.kind,
            start,
            end,
            ramp: GradientRamp::decode_lenient(raw, self.stop_count),
            stop_count: self.stop_count,
        });
        match &self.stroke {
            Some(stroke) => {
                let width = match frame {
                    Some(frame) => stroke.width.value_at(frame),
                    None => *stroke.width.value(),
                };
                PaintOutput::Stroke(stroke.style(paint, opacity, width, frame))
            }
            None => PaintOutput::Fill(FillStyle {
                paint,
                opacity,
                rule: self.rule,
            }),
        }
    }

    pub fn output_at(&self, frame: f32) -> PaintOutput {
        self.compose(
            self.start.value_at(frame),
            self.end.value_at(frame),
            &self.colors.value_at(frame),
            self.opacity.value_at(frame),
            Some(frame),
        )
    }
}

impl AnimatorNode for GradientNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.start.needs_update(frame)
            || self.end.needs_update(frame)
            || self.colors.needs_update(frame)
            || self.opacity.needs_update(frame)
            || self.stroke.as_ref().is_some_and(|s| s.needs_update(frame))
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.start.update(frame, stats);
        changed |= self.end.update(frame, stats);
        changed |= self.colors.update(frame, stats);
        changed |= self.opacity.update(frame, stats);
        if let Some(stroke) = &mut self.stroke {
            changed |= stroke.update(frame, stats);
        }
        changed
    }

    fn rebuild_output(&mut self) {
        self.output = self.compose(
            *self.start.value(),
            *self.end.value(),
            self.colors.value(),
            *self.opacity.value(),
            None,
        );
    }
}

#[derive(Debug, Clone)]
pub struct TrimNode {
    state: NodeState,
    pub start: AnimatableProperty<f32>,
    pub end: AnimatableProperty<f32>,
    pub offset: AnimatableProperty<f32>,
    values: TrimValues,
}

impl TrimNode {
    pub fn from_data(shape: &data::TrimShape, diagnostics: &Diagnostics) -> Self {
        let scalar = |p: &data::Property<f32>, default| AnimatableProperty::from_data(p, |v| *v, default, diagnostics);
        let mut node = Self {
            state: NodeState::built(),
            start: scalar(&shape.s, 0.0),
            end: scalar(&shape.e, 100.0),
            offset: scalar(&shape.o, 0.0),
            values: TrimValues::from_authored(0.0, 100.0, 0.0),
        };
        node.rebuild_output();
        node
    }

    pub fn values(&self) -> TrimValues {
        self.values
    }

    pub fn values_at(&self, frame: f32) -> TrimValues {
        TrimValues::from_authored(
            self.start.value_at(frame),
            self.end.value_at(frame),
            self.offset.value_at(frame),
        )
    }
}

impl AnimatorNode for TrimNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.start.needs_update(frame) || self.end.needs_update(frame) || self.offset.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.start.update(frame, stats);
        changed |= self.end.update(frame, stats);
        changed |= self.offset.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        self.values = TrimValues::from_authored(*self.start.value(), *self.end.value(), *self.offset.value());
    }
}

/// Placement of one repeated instance of a repeater's template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeaterCopy {
    pub transform: Mat3,
    pub opacity: f32,
    pub visible: bool,
}

/// Repeats the entries before it. One output slot exists for the largest
/// copy count any keyframe asks for; surplus slots are hidden.
#[derive(Debug, Clone)]
pub struct RepeaterNode {
    state: NodeState,
    pub copies: AnimatableProperty<f32>,
    pub offset: AnimatableProperty<f32>,
    pub step: TransformNode,
    pub start_opacity: AnimatableProperty<f32>,
    pub end_opacity: AnimatableProperty<f32>,
    above: bool,
    max_copies: usize,
    output: Vec<RepeaterCopy>,
}

impl RepeaterNode {
    pub fn from_data(shape: &data::RepeaterShape, diagnostics: &Diagnostics) -> Self {
        let copies = AnimatableProperty::from_data(&shape.c, |v| *v, 1.0, diagnostics);
        let max_copies = copies
            .keyframes()
            .keyframes()
            .iter()
            .map(|kf| kf.value.ceil().max(0.0) as usize)
            .max()
            .unwrap_or(0);
        let mut node = Self {
            state: NodeState::built(),
            copies,
            offset: AnimatableProperty::from_data(&shape.o, |v| *v, 0.0, diagnostics),
            step: TransformNode::from_data(&shape.tr.t, false, diagnostics),
            start_opacity: AnimatableProperty::from_data(&shape.tr.so, percent, 1.0, diagnostics),
            end_opacity: AnimatableProperty::from_data(&shape.tr.eo, percent, 1.0, diagnostics),
            above: shape.m != 2,
            max_copies,
            output: Vec::new(),
        };
        node.rebuild_output();
        node
    }

    pub fn max_copies(&self) -> usize {
        self.max_copies
    }

    /// Later copies draw above earlier ones.
    pub fn stacks_above(&self) -> bool {
        self.above
    }

    pub fn output(&self) -> &[RepeaterCopy] {
        &self.output
    }

    pub fn is_animated(&self) -> bool {
        self.copies.is_animated()
            || self.offset.is_animated()
            || self.start_opacity.is_animated()
            || self.end_opacity.is_animated()
            || self.step.animated_range().is_some()
    }

    fn layout(&self, count: f32, offset: f32, start: f32, end: f32, step: Mat3) -> Vec<RepeaterCopy> {
        let visible = count.ceil().max(0.0) as usize;
        let anchor = self.step.components().anchor;
        // The step pivots around its anchor: `T(a) * T(p) * R * S * T(-a)`.
        let step = Mat3::from_translation(anchor) * step;
        let offset = offset.round() as i32;
        (0..self.max_copies)
            .map(|i| {
                let power = i as i32 + offset;
                let transform = matrix_power(step, power);
                let t = if visible > 1 {
                    i as f32 / (visible - 1) as f32
                } else {
                    0.0
                };
                RepeaterCopy {
                    transform,
                    opacity: start + (end - start) * t,
                    visible: i < visible,
                }
            })
            .collect()
    }
}

fn matrix_power(m: Mat3, power: i32) -> Mat3 {
    let base = if power < 0 { m.inverse() } else { m };
    (0..power.unsigned_abs()).fold(Mat3::IDENTITY, |acc, _| acc * base)
}

impl AnimatorNode for RepeaterNode {
    node_state!();

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.copies.needs_update(frame)
            || self.offset.needs_update(frame)
            || self.start_opacity.needs_update(frame)
            || self.end_opacity.needs_update(frame)
            || self.step.has_stale_properties(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.copies.update(frame, stats);
        changed |= self.offset.update(frame, stats);
        changed |= self.start_opacity.update(frame, stats);
        changed |= self.end_opacity.update(frame, stats);
        changed |= self.step.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        self.output = self.layout(
            *self.copies.value(),
            *self.offset.value(),
            *self.start_opacity.value(),
            *self.end_opacity.value(),
            self.step.local(),
        );
    }
}

/// One shape item of a group. Transforms live on the group itself and
/// merges become [`CombinedShapeNode`]s.
#[derive(Debug, Clone)]
pub enum ShapeItem {
    Ellipse(EllipseNode),
    Rectangle(RectangleNode),
    Star(StarNode),
    Path(PathNode),
    Combined(CombinedShapeNode),
    Fill(FillNode),
    Stroke(StrokeNode),
    Gradient(GradientNode),
    Trim(TrimNode),
    Repeater(RepeaterNode),
    Group(ShapeGroupNode),
}

impl ShapeItem {
    fn node(&self) -> &dyn AnimatorNode {
        match self {
            ShapeItem::Ellipse(n) => n,
            ShapeItem::Rectangle(n) => n,
            ShapeItem::Star(n) => n,
            ShapeItem::Path(n) => n,
            ShapeItem::Combined(n) => n,
            ShapeItem::Fill(n) => n,
            ShapeItem::Stroke(n) => n,
            ShapeItem::Gradient(n) => n,
            ShapeItem::Trim(n) => n,
            ShapeItem::Repeater(n) => n,
            ShapeItem::Group(g) => &g.transform,
        }
    }

    pub fn revision(&self) -> u64 {
        self.node().revision()
    }

    /// Cached outline of a geometry item.
    pub fn path(&self) -> Option<&CompoundPath> {
        match self {
            ShapeItem::Ellipse(n) => Some(&n.path),
            ShapeItem::Rectangle(n) => Some(&n.path),
            ShapeItem::Star(n) => Some(&n.path),
            ShapeItem::Path(n) => Some(&n.path),
            ShapeItem::Combined(n) => Some(&n.path),
            _ => None,
        }
    }

    /// Cached output of a paint item.
    pub fn paint(&self) -> Option<PaintOutput> {
        match self {
            ShapeItem::Fill(n) => Some(PaintOutput::Fill(n.output.clone())),
            ShapeItem::Stroke(n) => Some(PaintOutput::Stroke(n.output.clone())),
            ShapeItem::Gradient(n) => Some(n.output.clone()),
            _ => None,
        }
    }

    pub fn paint_at(&self, frame: f32) -> Option<PaintOutput> {
        match self {
            ShapeItem::Fill(n) => Some(PaintOutput::Fill(n.output_at(frame))),
            ShapeItem::Stroke(n) => Some(PaintOutput::Stroke(n.output_at(frame))),
            ShapeItem::Gradient(n) => Some(n.output_at(frame)),
            _ => None,
        }
    }

    fn is_geometry(&self) -> bool {
        self.path().is_some()
    }
}

/// A paint applied to one outline, optionally trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderItem {
    /// Index of a geometry item in the owning group.
    pub geometry: usize,
    /// Index of a paint item in the owning group.
    pub paint: usize,
    /// Index of the trim item in the owning group.
    pub trim: Option<usize>,
}

/// Drawing order of a group. The first entry draws on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEntry {
    Render(usize),
    Group(usize),
    Repeater {
        repeater: usize,
        template: Vec<GroupEntry>,
    },
}

#[derive(Debug, Clone)]
pub struct ShapeGroupNode {
    pub name: String,
    pub transform: TransformNode,
    items: Vec<ShapeItem>,
    renders: Vec<RenderItem>,
    entries: Vec<GroupEntry>,
}

impl ShapeGroupNode {
    /// Builds the group from its items. `inherited_trim` is the nearest
    /// enclosing group's trim, applied when the group has none of its own.
    pub fn build(
        name: &str,
        shapes: &[data::Shape],
        inherited_trim: Option<&data::TrimShape>,
        diagnostics: &Diagnostics,
    ) -> Self {
        let mut items: Vec<ShapeItem> = Vec::new();
        let mut renders: Vec<RenderItem> = Vec::new();
        let mut entries: Vec<GroupEntry> = Vec::new();
        let mut transform = None;
        let mut active: Vec<usize> = Vec::new();
        let mut combined: HashMap<Vec<usize>, usize> = HashMap::new();

        let trim_data = shapes
            .iter()
            .rev()
            .find_map(|s| match s {
                data::Shape::Trim(t) => Some(t),
                _ => None,
            })
            .or(inherited_trim);
        let trim = trim_data.map(|t| {
            items.push(ShapeItem::Trim(TrimNode::from_data(t, diagnostics)));
            items.len() - 1
        });

        for shape in shapes.iter().filter(|s| !s.is_hidden()) {
            let geometry = match shape {
                data::Shape::Ellipse(s) => Some(ShapeItem::Ellipse(EllipseNode::from_data(s, diagnostics))),
                data::Shape::Rect(s) => Some(ShapeItem::Rectangle(RectangleNode::from_data(s, diagnostics))),
                data::Shape::Polystar(s) => Some(ShapeItem::Star(StarNode::from_data(s, diagnostics))),
                data::Shape::Path(s) => Some(ShapeItem::Path(PathNode::from_data(s, diagnostics))),
                _ => None,
            };
            if let Some(item) = geometry {
                items.push(item);
                active.push(items.len() - 1);
                continue;
            }

            let paint = match shape {
                data::Shape::Fill(s) => Some(ShapeItem::Fill(FillNode::from_data(s, diagnostics))),
                data::Shape::Stroke(s) => Some(ShapeItem::Stroke(StrokeNode::from_data(s, diagnostics))),
                data::Shape::GradientFill(s) => {
                    Some(ShapeItem::Gradient(GradientNode::fill_from_data(s, diagnostics)))
                }
                data::Shape::GradientStroke(s) => {
                    Some(ShapeItem::Gradient(GradientNode::stroke_from_data(s, diagnostics)))
                }
                _ => None,
            };
            if let Some(item) = paint {
                items.push(item);
                let paint = items.len() - 1;
                let geometry = match active.as_slice() {
                    [] => continue,
                    [single] => *single,
                    several => *combined.entry(several.to_vec()).or_insert_with(|| {
                        let node = CombinedShapeNode::new(several.to_vec(), None, &items);
                        items.push(ShapeItem::Combined(node));
                        items.len() - 1
                    }),
                };
                renders.push(RenderItem {
                    geometry,
                    paint,
                    trim,
                });
                entries.push(GroupEntry::Render(renders.len() - 1));
                continue;
            }

            match shape {
                data::Shape::Group(g) => {
                    let group = ShapeGroupNode::build(
                        g.nm.as_deref().unwrap_or(""),
                        &g.it,
                        trim_data,
                        diagnostics,
                    );
                    items.push(ShapeItem::Group(group));
                    entries.push(GroupEntry::Group(items.len() - 1));
                }
                data::Shape::MergePaths(m) => {
                    if active.is_empty() {
                        continue;
                    }
                    if m.mm > 1 {
                        tracing::debug!(mode = m.mm, "merge mode drawn as a union of outlines");
                    }
                    let node = CombinedShapeNode::new(active.clone(), Some(m.mm), &items);
                    items.push(ShapeItem::Combined(node));
                    active = vec![items.len() - 1];
                }
                data::Shape::Repeater(r) => {
                    items.push(ShapeItem::Repeater(RepeaterNode::from_data(r, diagnostics)));
                    let template = std::mem::take(&mut entries);
                    entries.push(GroupEntry::Repeater {
                        repeater: items.len() - 1,
                        template,
                    });
                }
                data::Shape::Transform(t) => {
                    transform = Some(TransformNode::from_data(&t.t, false, diagnostics));
                }
                data::Shape::Trim(_) => {}
                data::Shape::Unknown => diagnostics.warn("skipping shape item of unknown type"),
                _ => {}
            }
        }

        Self {
            name: name.to_string(),
            transform: transform.unwrap_or_else(TransformNode::identity),
            items,
            renders,
            entries,
        }
    }

    pub fn items(&self) -> &[ShapeItem] {
        &self.items
    }

    pub fn renders(&self) -> &[RenderItem] {
        &self.renders
    }

    pub fn entries(&self) -> &[GroupEntry] {
        &self.entries
    }

    pub fn subgroup(&self, item: usize) -> Option<&ShapeGroupNode> {
        match self.items.get(item) {
            Some(ShapeItem::Group(g)) => Some(g),
            _ => None,
        }
    }

    pub fn repeater(&self, item: usize) -> Option<&RepeaterNode> {
        match self.items.get(item) {
            Some(ShapeItem::Repeater(r)) => Some(r),
            _ => None,
        }
    }

    /// Updates every item in construction order so combined shapes see
    /// their sources' fresh output. Returns whether anything changed.
    pub fn update(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.transform.update(frame, stats);
        for index in 0..self.items.len() {
            let (before, rest) = self.items.split_at_mut(index);
            changed |= match &mut rest[0] {
                ShapeItem::Ellipse(n) => n.update(frame, stats),
                ShapeItem::Rectangle(n) => n.update(frame, stats),
                ShapeItem::Star(n) => n.update(frame, stats),
                ShapeItem::Path(n) => n.update(frame, stats),
                ShapeItem::Combined(n) => {
                    n.sync(before);
                    n.update(frame, stats)
                }
                ShapeItem::Fill(n) => n.update(frame, stats),
                ShapeItem::Stroke(n) => n.update(frame, stats),
                ShapeItem::Gradient(n) => n.update(frame, stats),
                ShapeItem::Trim(n) => n.update(frame, stats),
                ShapeItem::Repeater(n) => n.update(frame, stats),
                ShapeItem::Group(g) => g.update(frame, stats),
            };
        }
        changed
    }

    pub fn render_path(&self, render: &RenderItem) -> &CompoundPath {
        static EMPTY: CompoundPath = CompoundPath { shapes: Vec::new() };
        self.items[render.geometry].path().unwrap_or(&EMPTY)
    }

    pub fn render_paint(&self, render: &RenderItem) -> Option<PaintOutput> {
        self.items[render.paint].paint()
    }

    pub fn render_trim(&self, render: &RenderItem) -> Option<TrimValues> {
        match render.trim.map(|t| &self.items[t]) {
            Some(ShapeItem::Trim(t)) => Some(t.values()),
            _ => None,
        }
    }

    /// Revisions of everything a render item reads.
    pub fn render_revision(&self, render: &RenderItem) -> (u64, u64, u64) {
        (
            self.items[render.geometry].revision(),
            self.items[render.paint].revision(),
            render.trim.map(|t| self.items[t].revision()).unwrap_or(0),
        )
    }

    /// Uncached outline of a geometry item.
    pub fn geometry_at(&self, item: usize, frame: f32) -> CompoundPath {
        match &self.items[item] {
            ShapeItem::Ellipse(n) => n.path_at(frame),
            ShapeItem::Rectangle(n) => n.path_at(frame),
            ShapeItem::Star(n) => n.path_at(frame),
            ShapeItem::Path(n) => n.path_at(frame),
            ShapeItem::Combined(n) => {
                geometry::merge(n.sources.iter().map(|&s| self.geometry_at(s, frame)))
            }
            _ => CompoundPath::default(),
        }
    }

    /// Frames over which a geometry item's outline changes.
    pub fn geometry_range(&self, item: usize) -> Option<(f32, f32)> {
        match &self.items[item] {
            ShapeItem::Ellipse(n) => n.animated_range(),
            ShapeItem::Rectangle(n) => n.animated_range(),
            ShapeItem::Star(n) => n.animated_range(),
            ShapeItem::Path(n) => n.shape.keyframes().animated_range(),
            ShapeItem::Combined(n) => {
                union_range(n.sources.iter().map(|&s| self.geometry_range(s)))
            }
            _ => None,
        }
    }

    /// Number of render items in this group and every subgroup.
    pub fn render_count(&self) -> usize {
        self.renders.len()
            + self
                .items
                .iter()
                .map(|item| match item {
                    ShapeItem::Group(g) => g.render_count(),
                    _ => 0,
                })
                .sum::<usize>()
    }

    pub fn is_geometry(&self, item: usize) -> bool {
        self.items.get(item).is_some_and(ShapeItem::is_geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group(items: serde_json::Value) -> ShapeGroupNode {
        let shapes: Vec<data::Shape> = serde_json::from_value(items).expect("valid shapes");
        ShapeGroupNode::build("root", &shapes, None, &Diagnostics::default())
    }

    fn fill(r: f32) -> serde_json::Value {
        json!({"ty": "fl", "c": {"k": [r, 0, 0, 1]}, "o": {"k": 100}})
    }

    #[test]
    fn paint_covers_all_preceding_geometry() {
        let g = group(json!([
            {"ty": "el", "s": {"k": [10, 10]}, "p": {"k": [0, 0]}},
            {"ty": "rc", "s": {"k": [4, 4]}, "p": {"k": [0, 0]}, "r": {"k": 0}},
            fill(1.0),
            {"ty": "st", "c": {"k": [0, 0, 0, 1]}, "o": {"k": 100}, "w": {"k": 2}}
        ]));
        assert_eq!(g.renders().len(), 2);
        let combined = g.renders()[0].geometry;
        assert!(matches!(g.items()[combined], ShapeItem::Combined(_)));
        assert_eq!(g.renders()[1].geometry, combined, "fill and stroke share one combined node");
        assert_eq!(g.render_path(&g.renders()[0]).shapes.len(), 2);
    }

    #[test]
    fn combined_shape_follows_its_sources() {
        let mut g = group(json!([
            {"ty": "el", "s": {"a": 1, "k": [{"t": 0, "s": [0, 0]}, {"t": 10, "s": [20, 20]}]}, "p": {"k": [0, 0]}},
            {"ty": "el", "s": {"k": [4, 4]}, "p": {"k": [0, 0]}},
            {"ty": "mm", "mm": 1},
            fill(1.0)
        ]));
        let render = g.renders()[0];
        let before = g.render_revision(&render);
        let mut stats = EvaluationStats::default();
        g.update(5.0, &mut stats);
        assert_ne!(g.render_revision(&render), before);
        assert_eq!(*g.render_path(&render), g.geometry_at(render.geometry, 5.0));

        let settled = stats;
        g.update(5.0, &mut stats);
        assert_eq!(stats, settled, "same frame twice does no work");
    }

    #[test]
    fn group_trim_applies_to_paints_and_is_inherited() {
        let g = group(json!([
            {"ty": "gr", "it": [
                {"ty": "el", "s": {"k": [10, 10]}, "p": {"k": [0, 0]}},
                fill(0.0)
            ]},
            {"ty": "el", "s": {"k": [10, 10]}, "p": {"k": [0, 0]}},
            fill(1.0),
            {"ty": "tm", "s": {"k": 0}, "e": {"k": 50}, "o": {"k": 0}}
        ]));
        let own = g.render_trim(&g.renders()[0]).expect("trimmed");
        assert_eq!(own.end, 0.5);
        let GroupEntry::Group(sub) = g.entries()[0] else {
            panic!("first entry is the subgroup");
        };
        let sub = g.subgroup(sub).expect("subgroup");
        assert_eq!(sub.render_trim(&sub.renders()[0]).map(|t| t.end), Some(0.5));
    }

    #[test]
    fn repeater_wraps_preceding_entries() {
        let g = group(json!([
            {"ty": "rc", "s": {"k": [4, 4]}, "p": {"k": [0, 0]}, "r": {"k": 0}},
            fill(1.0),
            {"ty": "rp", "c": {"k": 3}, "o": {"k": 0}, "m": 1, "tr": {
                "p": {"k": [10, 0]}, "so": {"k": 100}, "eo": {"k": 0}
            }}
        ]));
        assert_eq!(g.entries().len(), 1);
        let GroupEntry::Repeater { repeater, template } = &g.entries()[0] else {
            panic!("expected repeater entry");
        };
        assert_eq!(template, &vec![GroupEntry::Render(0)]);
        let copies = g.repeater(*repeater).expect("repeater").output();
        assert_eq!(copies.len(), 3);
        assert_eq!(copies[2].transform.transform_point2(Vec2::ZERO), Vec2::new(20.0, 0.0));
        assert_eq!(copies[1].opacity, 0.5);
        assert!(copies.iter().all(|c| c.visible));
    }

    #[test]
    fn animated_copy_count_hides_surplus_copies() {
        let g = group(json!([
            {"ty": "el", "s": {"k": [4, 4]}, "p": {"k": [0, 0]}},
            fill(1.0),
            {"ty": "rp", "c": {"a": 1, "k": [{"t": 0, "s": [2]}, {"t": 10, "s": [5]}]}, "tr": {}}
        ]));
        let GroupEntry::Repeater { repeater, .. } = &g.entries()[0] else {
            panic!("expected repeater entry");
        };
        let node = g.repeater(*repeater).expect("repeater");
        assert_eq!(node.max_copies(), 5);
        assert_eq!(node.output().iter().filter(|c| c.visible).count(), 2);
    }

    #[test]
    fn gradient_ramp_is_decoded_from_raw_numbers() {
        let g = group(json!([
            {"ty": "el", "s": {"k": [4, 4]}, "p": {"k": [0, 0]}},
            {"ty": "gf", "o": {"k": 100}, "s": {"k": [0, 0]}, "e": {"k": [10, 0]}, "t": 1,
             "g": {"p": 2, "k": {"k": [0, 1, 0, 0, 1, 0, 0, 1]}}}
        ]));
        let Some(PaintOutput::Fill(fill)) = g.render_paint(&g.renders()[0]) else {
            panic!("expected gradient fill");
        };
        let Paint::Gradient(gradient) = fill.paint else {
            panic!("expected gradient paint");
        };
        assert_eq!(gradient.ramp.stops.len(), 2);
        assert_eq!(gradient.kind, GradientKind::Linear);
    }
}

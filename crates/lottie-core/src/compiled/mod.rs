//! Ahead-of-time strategy: every animated channel becomes a full-length
//! [`KeyframeTimeline`] installed on its handle, and the host advances
//! them on its own clock. The engine does no per-frame work afterwards.

mod compat;
mod timeline;
mod wrapper;

pub use compat::{CompatibilityClassifier, CompatibilityIssue, CompatibilityReport, CompatibilityRule};
pub use timeline::{CalculationMode, KeyframeTimeline, TimelineValue};
pub use wrapper::{ClippingWrapper, WrappedTimeline, PAUSE_BEGIN_BIAS};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::Diagnostics;
use crate::error::{EngineError, Result};
use crate::geometry::{CompoundPath, TrimValues};
use crate::graph::{
    AnimatableProperty, Composition, CompositionLayer, CompositionTree, LayerContent, LayerId,
    PositionChannel, RenderItem, ShapeGroupNode, ShapeItem, TransformNode, TrimNode,
};
use crate::interpretive;
use crate::keyframes::{Interpolatable, KeyframeGroup};
use crate::surface::{
    CompositionBinding, ContentBinding, EntryBinding, GroupBinding, HandleId, LayerBinding,
    MaskChannel, PaintChannel, SurfaceBindings, TargetSurface, TargetSurfaceHandle, TimelineKey,
    TransformChannel, TrimChannel,
};
use crate::timing::TimingConfiguration;

/// One compiled property and the handle it drives.
#[derive(Debug, Clone)]
pub struct CompiledChannel {
    pub handle: HandleId,
    pub key: TimelineKey,
    pub timeline: Arc<KeyframeTimeline>,
}

/// Timelines for a whole document plus the wrapper currently installed.
#[derive(Debug, Default)]
pub struct CompiledEngine {
    channels: Vec<CompiledChannel>,
    wrapper: Option<ClippingWrapper>,
}

impl CompiledEngine {
    /// Pushes the static state of the first frame, then compiles every
    /// animated channel. Nothing is installed until [`play`](Self::play)
    /// or [`pause_at`](Self::pause_at).
    pub fn build<S: TargetSurface>(
        tree: &mut CompositionTree,
        bindings: &mut SurfaceBindings,
        surface: &mut S,
        diagnostics: &Diagnostics,
    ) -> Result<Self> {
        tree.evaluate(tree.in_frame());
        bindings.invalidate();
        interpretive::push_composition(tree.root(), &mut bindings.root, surface)?;

        let mut builder = ChannelBuilder {
            domain: (tree.in_frame(), tree.out_frame()),
            framerate: tree.framerate(),
            diagnostics,
            channels: Vec::new(),
        };
        builder.composition(tree.root(), &bindings.root, TimeMapping::ROOT);
        for channel in &builder.channels {
            channel.timeline.validate()?;
        }
        tracing::debug!(channels = builder.channels.len(), "compiled timelines");
        Ok(Self {
            channels: builder.channels,
            wrapper: None,
        })
    }

    pub fn channels(&self) -> &[CompiledChannel] {
        &self.channels
    }

    /// The wrapper shared by every installed timeline.
    pub fn wrapper(&self) -> Option<&ClippingWrapper> {
        self.wrapper.as_ref()
    }

    /// Frame the host shows at `host_time`, if timelines are installed.
    pub fn frame_at(&self, host_time: f64) -> Option<f64> {
        self.wrapper.as_ref()?.frame_at(host_time)
    }

    /// Replaces whatever is installed with every channel under `wrapper`.
    pub fn install<S: TargetSurface>(&mut self, surface: &mut S, wrapper: ClippingWrapper) -> Result<()> {
        self.remove(surface)?;
        for channel in &self.channels {
            let target = surface
                .handle_mut(channel.handle)
                .ok_or(EngineError::MissingHandle(channel.handle.0))?;
            target.install_timeline(
                channel.key,
                WrappedTimeline::new(Arc::clone(&channel.timeline), wrapper),
            );
        }
        self.wrapper = Some(wrapper);
        Ok(())
    }

    pub fn play<S: TargetSurface>(
        &mut self,
        surface: &mut S,
        timing: TimingConfiguration,
        begin_time: f64,
    ) -> Result<()> {
        self.install(surface, ClippingWrapper::new(timing, begin_time))
    }

    /// Holds `frame` from host time `now` on.
    pub fn pause_at<S: TargetSurface>(
        &mut self,
        surface: &mut S,
        frame: f64,
        timing: TimingConfiguration,
        now: f64,
    ) -> Result<()> {
        self.install(surface, ClippingWrapper::paused_at(frame, timing, now))
    }

    /// Removes every installed timeline; handles fall back to their
    /// pushed values.
    pub fn stop<S: TargetSurface>(&mut self, surface: &mut S) -> Result<()> {
        self.remove(surface)?;
        self.wrapper = None;
        Ok(())
    }

    fn remove<S: TargetSurface>(&self, surface: &mut S) -> Result<()> {
        if self.wrapper.is_none() {
            return Ok(());
        }
        let handles: BTreeSet<HandleId> = self.channels.iter().map(|c| c.handle).collect();
        for id in handles {
            surface
                .handle_mut(id)
                .ok_or(EngineError::MissingHandle(id.0))?
                .remove_timelines();
        }
        Ok(())
    }
}

/// Maps a composition's frames onto root frames:
/// `root = frame * stretch + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeMapping {
    stretch: f32,
    offset: f32,
}

impl TimeMapping {
    const ROOT: Self = Self {
        stretch: 1.0,
        offset: 0.0,
    };

    fn to_root(self, frame: f32) -> f32 {
        frame * self.stretch + self.offset
    }

    fn to_local(self, root: f32) -> f32 {
        (root - self.offset) / self.stretch
    }

    /// Mapping for the content of a precomposition layer, which starts at
    /// the layer's start time and plays at its stretch.
    fn nested(self, layer: &CompositionLayer) -> Self {
        Self {
            stretch: self.stretch * layer.stretch,
            offset: self.to_root(layer.start_time),
        }
    }

    fn retime<T: Clone>(self, group: &KeyframeGroup<T>) -> KeyframeGroup<T> {
        group.clone().retimed(self.stretch, self.offset)
    }
}

struct ChannelBuilder<'a> {
    /// Root frames every timeline covers at least.
    domain: (f32, f32),
    framerate: f32,
    diagnostics: &'a Diagnostics,
    channels: Vec<CompiledChannel>,
}

fn scalar(v: &f32) -> TimelineValue {
    TimelineValue::Scalar(*v)
}

fn vector(v: &glam::Vec2) -> TimelineValue {
    TimelineValue::Vector2(*v)
}

impl ChannelBuilder<'_> {
    fn domain_with(&self, range: Option<(f32, f32)>) -> (f32, f32) {
        match range {
            Some((lo, hi)) => (self.domain.0.min(lo), self.domain.1.max(hi)),
            None => self.domain,
        }
    }

    fn push(&mut self, handle: HandleId, key: TimelineKey, timeline: KeyframeTimeline) {
        self.channels.push(CompiledChannel {
            handle,
            key,
            timeline: Arc::new(timeline),
        });
    }

    fn constant(&mut self, handle: HandleId, key: TimelineKey, value: TimelineValue) {
        let timeline = KeyframeTimeline::constant(value, self.domain, self.framerate);
        self.push(handle, key, timeline);
    }

    fn keyframes<T: Interpolatable>(
        &mut self,
        handle: HandleId,
        key: TimelineKey,
        group: &KeyframeGroup<T>,
        mapping: TimeMapping,
        convert: impl Fn(&T) -> TimelineValue,
    ) {
        let group = mapping.retime(group);
        let domain = self.domain_with(group.animated_range());
        let timeline = KeyframeTimeline::from_keyframes(&group, domain, self.framerate, convert);
        self.push(handle, key, timeline);
    }

    /// Compiles an animated property. Returns false for static ones,
    /// whose pushed value already holds.
    fn keyed<T: Interpolatable>(
        &mut self,
        handle: HandleId,
        key: TimelineKey,
        property: &AnimatableProperty<T>,
        mapping: TimeMapping,
        convert: impl Fn(&T) -> TimelineValue,
    ) -> bool {
        if !property.keyframes().is_animated() {
            return false;
        }
        self.keyframes(handle, key, property.keyframes(), mapping, convert);
        true
    }

    /// Samples a derived value at every root frame of `range` (local
    /// frames). For channels no single keyframe group describes.
    fn baked(
        &mut self,
        handle: HandleId,
        key: TimelineKey,
        range: (f32, f32),
        mapping: TimeMapping,
        sample: impl Fn(f32) -> TimelineValue,
    ) {
        let first = mapping.to_root(range.0).floor();
        let last = mapping.to_root(range.1).ceil();
        let samples = (first as i64..=last as i64)
            .map(|frame| {
                let frame = frame as f32;
                (frame, sample(mapping.to_local(frame)))
            })
            .collect();
        let domain = self.domain_with(Some((first, last)));
        let timeline = KeyframeTimeline::baked(samples, domain, self.framerate);
        self.push(handle, key, timeline);
    }

    fn composition(&mut self, composition: &Composition, binding: &CompositionBinding, mapping: TimeMapping) {
        for (index, (layer, slot)) in composition.layers().iter().zip(&binding.layers).enumerate() {
            if let Some(bound) = slot {
                self.layer(composition, LayerId(index), layer, bound, mapping);
            }
        }
    }

    fn layer(
        &mut self,
        composition: &Composition,
        id: LayerId,
        layer: &CompositionLayer,
        bound: &LayerBinding,
        mapping: TimeMapping,
    ) {
        let handle = bound.handle;
        let chain: Vec<&TransformNode> = std::iter::once(id)
            .chain(composition.ancestors(id))
            .filter_map(|l| composition.layer(l))
            .map(|l| &l.transform)
            .collect();
        // The handle shows the product of the whole parent chain, so one
        // moving ancestor means every depth needs its components.
        if chain.iter().any(|t| t.animated_range().is_some()) {
            for (depth, transform) in chain.into_iter().enumerate() {
                self.transform(handle, depth, transform, mapping);
            }
        }
        self.keyed(handle, TimelineKey::Opacity, &layer.transform.opacity, mapping, scalar);
        self.visibility(handle, layer, mapping);

        for (index, mask) in layer.masks.iter().enumerate() {
            let key = |channel| TimelineKey::Mask { index, channel };
            self.keyed(handle, key(MaskChannel::Path), &mask.path, mapping, |shape| {
                TimelineValue::Path(CompoundPath::single(shape.clone()))
            });
            self.keyed(handle, key(MaskChannel::Opacity), &mask.opacity, mapping, scalar);
            self.keyed(handle, key(MaskChannel::Expansion), &mask.expansion, mapping, scalar);
        }

        match (&layer.content, &bound.content) {
            (LayerContent::Shape(group), ContentBinding::Shape(binding)) => {
                self.group(group, binding, mapping);
            }
            (LayerContent::Precomp(inner), ContentBinding::Precomp(binding)) => {
                if layer.time_remap.is_some() {
                    self.diagnostics.warn(format!(
                        "layer '{}': time remapping is not compiled; content follows start time and stretch",
                        layer.name
                    ));
                }
                self.composition(inner, binding, mapping.nested(layer));
            }
            (LayerContent::Text(text), ContentBinding::Text(id)) => {
                self.keyed(*id, TimelineKey::Text, &text.document, mapping, |doc| {
                    TimelineValue::Text(doc.clone())
                });
            }
            _ => {}
        }
    }

    fn visibility(&mut self, handle: HandleId, layer: &CompositionLayer, mapping: TimeMapping) {
        let (start, end) = (mapping.to_root(layer.in_frame), mapping.to_root(layer.out_frame));
        let domain = self.domain_with(Some((start, end)));
        let timeline = if layer.hidden || end <= start {
            KeyframeTimeline::constant(TimelineValue::Visibility(false), domain, self.framerate)
        } else {
            KeyframeTimeline::stepped(
                TimelineValue::Visibility(false),
                vec![
                    (start, TimelineValue::Visibility(true)),
                    (end, TimelineValue::Visibility(false)),
                ],
                domain,
                self.framerate,
            )
        };
        self.push(handle, TimelineKey::Visibility, timeline);
    }

    /// All six components of one transform at `depth`.
    fn transform(&mut self, handle: HandleId, depth: usize, node: &TransformNode, mapping: TimeMapping) {
        let key = |channel| TimelineKey::Transform { depth, channel };
        let current = *node.components();

        if !self.keyed(handle, key(TransformChannel::Anchor), &node.anchor, mapping, vector) {
            self.constant(handle, key(TransformChannel::Anchor), vector(&current.anchor));
        }

        let position_keyed = match &node.position {
            PositionChannel::Unified(position) => {
                self.keyed(handle, key(TransformChannel::Position), position, mapping, vector)
            }
            PositionChannel::Split { .. } => false,
        };
        if !position_keyed {
            match node.position.animated_range() {
                Some(range) => self.baked(handle, key(TransformChannel::Position), range, mapping, |f| {
                    TimelineValue::Vector2(node.position.value_at(f))
                }),
                None => self.constant(handle, key(TransformChannel::Position), vector(&current.position)),
            }
        }

        let rotation = key(TransformChannel::Rotation);
        if node.is_auto_oriented() {
            if let Some(range) = node.animated_range() {
                self.baked(handle, rotation, range, mapping, |f| {
                    TimelineValue::Scalar(node.components_at(f).rotation)
                });
            }
        } else if !self.keyed(handle, rotation, &node.rotation, mapping, scalar) {
            self.constant(handle, rotation, scalar(&current.rotation));
        }

        if !self.keyed(handle, key(TransformChannel::Scale), &node.scale, mapping, vector) {
            self.constant(handle, key(TransformChannel::Scale), vector(&current.scale));
        }
        if !self.keyed(handle, key(TransformChannel::Skew), &node.skew, mapping, scalar) {
            self.constant(handle, key(TransformChannel::Skew), scalar(&current.skew));
        }
        if !self.keyed(handle, key(TransformChannel::SkewAxis), &node.skew_axis, mapping, scalar) {
            self.constant(handle, key(TransformChannel::SkewAxis), scalar(&current.skew_axis));
        }
    }

    fn group(&mut self, group: &ShapeGroupNode, binding: &GroupBinding, mapping: TimeMapping) {
        if group.transform.animated_range().is_some() {
            self.transform(binding.handle, 0, &group.transform, mapping);
        }
        self.keyed(binding.handle, TimelineKey::Opacity, &group.transform.opacity, mapping, scalar);
        self.entries(group, &binding.entries, mapping);
    }

    fn entries(&mut self, group: &ShapeGroupNode, entries: &[EntryBinding], mapping: TimeMapping) {
        for entry in entries {
            match entry {
                EntryBinding::Render { handle, render, .. } => {
                    if let Some(item) = group.renders().get(*render) {
                        self.render(group, item, *handle, mapping);
                    }
                }
                EntryBinding::Group { item, binding } => {
                    if let Some(subgroup) = group.subgroup(*item) {
                        self.group(subgroup, binding, mapping);
                    }
                }
                // Copy placements stay as pushed; their drawables animate
                // like the template's.
                EntryBinding::Repeater { copies, .. } => {
                    for copy in copies {
                        self.entries(group, &copy.entries, mapping);
                    }
                }
            }
        }
    }

    fn render(&mut self, group: &ShapeGroupNode, item: &RenderItem, handle: HandleId, mapping: TimeMapping) {
        let items = group.items();
        match items.get(item.geometry) {
            Some(ShapeItem::Path(node)) => {
                self.keyed(handle, TimelineKey::Path, &node.shape, mapping, |shape| {
                    TimelineValue::Path(node.oriented(shape))
                });
            }
            Some(_) => {
                if let Some(range) = group.geometry_range(item.geometry) {
                    self.baked(handle, TimelineKey::Path, range, mapping, |f| {
                        TimelineValue::Path(group.geometry_at(item.geometry, f))
                    });
                }
            }
            None => {}
        }

        let paint = |channel| TimelineKey::Paint(channel);
        match items.get(item.paint) {
            Some(ShapeItem::Fill(fill)) => {
                self.keyed(handle, paint(PaintChannel::Color), &fill.color, mapping, |c| {
                    TimelineValue::Color(*c)
                });
                self.keyed(handle, paint(PaintChannel::Opacity), &fill.opacity, mapping, scalar);
            }
            Some(ShapeItem::Stroke(stroke)) => {
                self.keyed(handle, paint(PaintChannel::Color), &stroke.color, mapping, |c| {
                    TimelineValue::Color(*c)
                });
                self.keyed(handle, paint(PaintChannel::Opacity), &stroke.opacity, mapping, scalar);
                self.keyed(handle, paint(PaintChannel::Width), &stroke.params.width, mapping, scalar);
            }
            Some(ShapeItem::Gradient(gradient)) => {
                self.keyed(handle, paint(PaintChannel::GradientStart), &gradient.start, mapping, vector);
                self.keyed(handle, paint(PaintChannel::GradientEnd), &gradient.end, mapping, vector);
                self.keyed(handle, paint(PaintChannel::GradientRamp), &gradient.colors, mapping, |raw| {
                    TimelineValue::Numbers(raw.clone())
                });
                self.keyed(handle, paint(PaintChannel::Opacity), &gradient.opacity, mapping, scalar);
                if let Some(params) = &gradient.stroke {
                    self.keyed(handle, paint(PaintChannel::Width), &params.width, mapping, scalar);
                }
            }
            _ => {}
        }

        if let Some(ShapeItem::Trim(trim)) = item.trim.and_then(|t| items.get(t)) {
            self.trim(handle, TrimChannel::Start, trim, &trim.start, mapping);
            self.trim(handle, TrimChannel::End, trim, &trim.end, mapping);
            self.trim(handle, TrimChannel::Offset, trim, &trim.offset, mapping);
        }
    }

    fn trim(
        &mut self,
        handle: HandleId,
        channel: TrimChannel,
        node: &TrimNode,
        property: &AnimatableProperty<f32>,
        mapping: TimeMapping,
    ) {
        let keyframes = property.keyframes();
        if !keyframes.is_animated() {
            return;
        }
        let pick = move |values: TrimValues| match channel {
            TrimChannel::Start => values.start,
            TrimChannel::End => values.end,
            TrimChannel::Offset => values.offset,
        };
        let key = TimelineKey::Trim(channel);
        // Clamping between keys differs from clamping the keys, so
        // out-of-range percentages are sampled instead.
        let exact = matches!(channel, TrimChannel::Offset)
            || keyframes
                .keyframes()
                .iter()
                .all(|kf| (0.0..=100.0).contains(&kf.value));
        if exact {
            self.keyframes(handle, key, keyframes, mapping, |v| {
                TimelineValue::Scalar(pick(TrimValues::from_authored(*v, *v, *v)))
            });
        } else if let Some(range) = keyframes.animated_range() {
            self.baked(handle, key, range, mapping, |f| {
                TimelineValue::Scalar(pick(node.values_at(f)))
            });
        }
    }
}

//! A surface that records writes and samples installed timelines. Used by
//! headless hosts and tests.

use std::collections::BTreeMap;

use glam::{Mat3, Vec2};
use kurbo::BezPath;

use super::{
    FillStyle, HandleId, HandleRole, MaskChannel, MaskOutput, MatteMode, Paint, PaintChannel,
    StrokeStyle, TargetSurface, TargetSurfaceHandle, TextOutput, TimelineKey, TransformChannel,
    TrimChannel,
};
use crate::compiled::{TimelineValue, WrappedTimeline};
use crate::error::Result;
use crate::geometry::{GradientRamp, TrimValues};
use crate::graph::TransformComponents;
use crate::providers::ImageHandle;
use crate::snapshot::ValueSender;

/// Everything written to one handle.
#[derive(Debug, Clone)]
pub struct HandleRecord {
    pub id: HandleId,
    pub parent: Option<HandleId>,
    pub role: HandleRole,
    pub name: String,
    pub transform: Mat3,
    pub opacity: f32,
    pub visible: bool,
    pub path: Option<BezPath>,
    pub fill: Option<FillStyle>,
    pub stroke: Option<StrokeStyle>,
    pub trim: Option<TrimValues>,
    pub masks: Vec<MaskOutput>,
    pub text: Option<TextOutput>,
    pub image: Option<(Option<ImageHandle>, Vec2)>,
    pub timelines: BTreeMap<TimelineKey, WrappedTimeline>,
    /// Number of direct property writes received.
    pub writes: usize,
}

impl HandleRecord {
    fn new(id: HandleId, parent: Option<HandleId>, role: HandleRole, name: &str) -> Self {
        Self {
            id,
            parent,
            role,
            name: name.to_string(),
            transform: Mat3::IDENTITY,
            opacity: 1.0,
            visible: true,
            path: None,
            fill: None,
            stroke: None,
            trim: None,
            masks: Vec::new(),
            text: None,
            image: None,
            timelines: BTreeMap::new(),
            writes: 0,
        }
    }

    /// State shown at `host_time`: written values, overridden by whatever
    /// installed timelines are active.
    pub fn presented(&self, host_time: f64) -> PresentedState {
        let mut state = PresentedState {
            transform: self.transform,
            opacity: self.opacity,
            visible: self.visible,
            path: self.path.clone(),
            fill: self.fill.clone(),
            stroke: self.stroke.clone(),
            trim: self.trim,
            masks: self.masks.clone(),
            text: self.text.clone(),
        };

        let mut depths: BTreeMap<usize, TransformComponents> = BTreeMap::new();
        for (key, timeline) in &self.timelines {
            let Some(value) = timeline.sample(host_time) else {
                continue;
            };
            match *key {
                TimelineKey::Transform { depth, channel } => {
                    apply_transform(depths.entry(depth).or_default(), channel, &value)
                }
                TimelineKey::Opacity => {
                    if let Some(v) = value.as_scalar() {
                        state.opacity = v;
                    }
                }
                TimelineKey::Visibility => {
                    if let Some(v) = value.as_bool() {
                        state.visible = v;
                    }
                }
                TimelineKey::Path => {
                    if let Some(path) = value.as_path() {
                        state.path = Some(path.to_bez_path());
                    }
                }
                TimelineKey::Paint(channel) => state.apply_paint(channel, &value),
                TimelineKey::Trim(channel) => {
                    if let Some(v) = value.as_scalar() {
                        let trim = state.trim.get_or_insert(TrimValues {
                            start: 0.0,
                            end: 1.0,
                            offset: 0.0,
                        });
                        match channel {
                            TrimChannel::Start => trim.start = v,
                            TrimChannel::End => trim.end = v,
                            TrimChannel::Offset => trim.offset = v,
                        }
                    }
                }
                TimelineKey::Mask { index, channel } => {
                    if let Some(mask) = state.masks.get_mut(index) {
                        match (channel, &value) {
                            (MaskChannel::Path, TimelineValue::Path(path)) => mask.path = path.to_bez_path(),
                            (MaskChannel::Opacity, TimelineValue::Scalar(v)) => mask.opacity = *v,
                            (MaskChannel::Expansion, TimelineValue::Scalar(v)) => mask.expansion = *v,
                            _ => {}
                        }
                    }
                }
                TimelineKey::Text => {
                    if let Some(text) = value.as_text() {
                        state.text = Some(text.clone());
                    }
                }
            }
        }
        if !depths.is_empty() {
            // Ancestors (deeper) first: `M_n * ... * M_1 * M_0`.
            state.transform = depths
                .values()
                .rev()
                .fold(Mat3::IDENTITY, |acc, components| acc * components.matrix());
        }
        state
    }

    fn touch(&mut self) {
        self.writes += 1;
    }
}

fn apply_transform(components: &mut TransformComponents, channel: TransformChannel, value: &TimelineValue) {
    match (channel, value) {
        (TransformChannel::Anchor, TimelineValue::Vector2(v)) => components.anchor = *v,
        (TransformChannel::Position, TimelineValue::Vector2(v)) => components.position = *v,
        (TransformChannel::Scale, TimelineValue::Vector2(v)) => components.scale = *v,
        (TransformChannel::Rotation, TimelineValue::Scalar(v)) => components.rotation = *v,
        (TransformChannel::Skew, TimelineValue::Scalar(v)) => components.skew = *v,
        (TransformChannel::SkewAxis, TimelineValue::Scalar(v)) => components.skew_axis = *v,
        _ => {}
    }
}

/// What a handle shows at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedState {
    pub transform: Mat3,
    pub opacity: f32,
    pub visible: bool,
    pub path: Option<BezPath>,
    pub fill: Option<FillStyle>,
    pub stroke: Option<StrokeStyle>,
    pub trim: Option<TrimValues>,
    pub masks: Vec<MaskOutput>,
    pub text: Option<TextOutput>,
}

impl PresentedState {
    fn apply_paint(&mut self, channel: PaintChannel, value: &TimelineValue) {
        let (paint, opacity, width) = match (&mut self.fill, &mut self.stroke) {
            (_, Some(stroke)) => (&mut stroke.paint, &mut stroke.opacity, Some(&mut stroke.width)),
            (Some(fill), None) => (&mut fill.paint, &mut fill.opacity, None),
            (None, None) => return,
        };
        match (channel, value) {
            (PaintChannel::Color, TimelineValue::Color(c)) => {
                if let Paint::Solid(color) = paint {
                    *color = *c;
                }
            }
            (PaintChannel::Opacity, TimelineValue::Scalar(v)) => *opacity = *v,
            (PaintChannel::Width, TimelineValue::Scalar(v)) => {
                if let Some(width) = width {
                    *width = *v;
                }
            }
            (PaintChannel::GradientStart, TimelineValue::Vector2(v)) => {
                if let Paint::Gradient(gradient) = paint {
                    gradient.start = *v;
                }
            }
            (PaintChannel::GradientEnd, TimelineValue::Vector2(v)) => {
                if let Paint::Gradient(gradient) = paint {
                    gradient.end = *v;
                }
            }
            (PaintChannel::GradientRamp, TimelineValue::Numbers(raw)) => {
                if let Paint::Gradient(gradient) = paint {
                    gradient.ramp = GradientRamp::decode_lenient(raw, gradient.stop_count);
                }
            }
            _ => {}
        }
    }
}

/// In-memory [`TargetSurface`].
#[derive(Debug, Default)]
pub struct RecordingSurface {
    handles: Vec<HandleRecord>,
    mattes: Vec<(HandleId, HandleId, MatteMode)>,
    snapshot_requests: Vec<ValueSender<Vec<u8>>>,
}

impl RecordingSurface {
    pub fn record(&self, id: HandleId) -> Option<&HandleRecord> {
        self.handles.get(id.0)
    }

    pub fn records(&self) -> &[HandleRecord] {
        &self.handles
    }

    pub fn presented(&self, id: HandleId, host_time: f64) -> Option<PresentedState> {
        self.record(id).map(|record| record.presented(host_time))
    }

    /// `(target, source, mode)` for every matte link.
    pub fn mattes(&self) -> &[(HandleId, HandleId, MatteMode)] {
        &self.mattes
    }

    pub fn total_writes(&self) -> usize {
        self.handles.iter().map(|h| h.writes).sum()
    }

    pub fn timeline_count(&self) -> usize {
        self.handles.iter().map(|h| h.timelines.len()).sum()
    }

    pub fn pending_snapshots(&self) -> usize {
        self.snapshot_requests.len()
    }

    /// Answers the oldest snapshot request. Returns false when none is
    /// pending or the requester gave up.
    pub fn deliver_snapshot(&mut self, image: Vec<u8>) -> bool {
        if self.snapshot_requests.is_empty() {
            return false;
        }
        self.snapshot_requests.remove(0).deliver(image)
    }
}

impl TargetSurfaceHandle for HandleRecord {
    fn set_transform(&mut self, transform: Mat3) {
        self.transform = transform;
        self.touch();
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
        self.touch();
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.touch();
    }

    fn set_path(&mut self, path: &BezPath) {
        self.path = Some(path.clone());
        self.touch();
    }

    fn set_fill(&mut self, fill: &FillStyle) {
        self.fill = Some(fill.clone());
        self.stroke = None;
        self.touch();
    }

    fn set_stroke(&mut self, stroke: &StrokeStyle) {
        self.stroke = Some(stroke.clone());
        self.fill = None;
        self.touch();
    }

    fn set_trim(&mut self, trim: Option<TrimValues>) {
        self.trim = trim;
        self.touch();
    }

    fn set_masks(&mut self, masks: &[MaskOutput]) {
        self.masks = masks.to_vec();
        self.touch();
    }

    fn set_text(&mut self, text: &TextOutput) {
        self.text = Some(text.clone());
        self.touch();
    }

    fn set_image(&mut self, image: Option<&ImageHandle>, size: Vec2) {
        self.image = Some((image.cloned(), size));
        self.touch();
    }

    fn install_timeline(&mut self, key: TimelineKey, timeline: WrappedTimeline) {
        self.timelines.insert(key, timeline);
    }

    fn remove_timelines(&mut self) {
        self.timelines.clear();
    }
}

impl TargetSurface for RecordingSurface {
    type Handle = HandleRecord;

    fn create_handle(&mut self, parent: Option<HandleId>, role: HandleRole, name: &str) -> HandleId {
        let id = HandleId(self.handles.len());
        self.handles.push(HandleRecord::new(id, parent, role, name));
        id
    }

    fn handle_mut(&mut self, id: HandleId) -> Option<&mut HandleRecord> {
        self.handles.get_mut(id.0)
    }

    fn set_matte(&mut self, target: HandleId, source: HandleId, mode: MatteMode) {
        self.mattes.push((target, source, mode));
    }

    fn request_snapshot(&mut self, reply: ValueSender<Vec<u8>>) -> Result<()> {
        self.snapshot_requests.push(reply);
        Ok(())
    }

    fn clear(&mut self) {
        self.handles.clear();
        self.mattes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::{ClippingWrapper, KeyframeTimeline};
    use crate::geometry::CompoundPath;
    use crate::snapshot;
    use crate::timing::TimingConfiguration;
    use std::sync::Arc;
    use std::time::Duration;

    fn constant(value: TimelineValue) -> WrappedTimeline {
        WrappedTimeline::new(
            Arc::new(KeyframeTimeline::constant(value, (0.0, 30.0), 30.0)),
            ClippingWrapper::new(TimingConfiguration::new(0.0, 30.0, 30.0), 1.0),
        )
    }

    #[test]
    fn timelines_override_written_values_once_begun() {
        let mut surface = RecordingSurface::default();
        let id = surface.create_handle(None, HandleRole::Layer, "layer");
        let handle = surface.handle_mut(id).expect("handle exists");
        handle.set_opacity(0.25);
        handle.install_timeline(TimelineKey::Opacity, constant(TimelineValue::Scalar(0.75)));
        handle.install_timeline(
            TimelineKey::Transform {
                depth: 1,
                channel: TransformChannel::Position,
            },
            constant(TimelineValue::Vector2(Vec2::new(10.0, 0.0))),
        );
        handle.install_timeline(
            TimelineKey::Transform {
                depth: 0,
                channel: TransformChannel::Scale,
            },
            constant(TimelineValue::Vector2(Vec2::splat(2.0))),
        );

        let before = surface.presented(id, 0.5).expect("handle exists");
        assert_eq!(before.opacity, 0.25);
        assert_eq!(before.transform, Mat3::IDENTITY);

        let after = surface.presented(id, 1.5).expect("handle exists");
        assert_eq!(after.opacity, 0.75);
        assert_eq!(after.transform.transform_point2(Vec2::ONE), Vec2::new(12.0, 2.0));

        surface.handle_mut(id).expect("handle exists").remove_timelines();
        assert_eq!(surface.timeline_count(), 0);
        assert_eq!(surface.presented(id, 1.5).map(|s| s.opacity), Some(0.25));
    }

    #[test]
    fn paths_and_trims_sample_from_timelines() {
        let mut surface = RecordingSurface::default();
        let id = surface.create_handle(None, HandleRole::Render, "shape");
        let handle = surface.handle_mut(id).expect("handle exists");
        handle.install_timeline(TimelineKey::Path, constant(TimelineValue::Path(CompoundPath::default())));
        handle.install_timeline(TimelineKey::Trim(TrimChannel::End), constant(TimelineValue::Scalar(0.5)));
        let state = surface.presented(id, 2.0).expect("handle exists");
        assert_eq!(state.path, Some(BezPath::new()));
        assert_eq!(state.trim.map(|t| t.end), Some(0.5));
        assert_eq!(surface.total_writes(), 0, "installing timelines is not a write");
    }

    #[test]
    fn snapshot_requests_are_answered_in_order() {
        let mut surface = RecordingSurface::default();
        assert!(!surface.deliver_snapshot(vec![1]));
        let (tx, pending) = snapshot::channel(Duration::from_secs(1));
        surface.request_snapshot(tx).expect("request accepted");
        assert_eq!(surface.pending_snapshots(), 1);
        assert!(surface.deliver_snapshot(vec![1, 2, 3]));
        assert_eq!(pending.wait().expect("delivered"), vec![1, 2, 3]);
    }
}

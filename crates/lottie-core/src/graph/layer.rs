use glam::{Vec2, Vec4};
use kurbo::BezPath;
use lottie_data::model as data;

use super::shape::ShapeGroupNode;
use super::tree::Composition;
use super::{AnimatableProperty, AnimatorNode, EvaluationStats, LayerId, NodeState, TransformNode};
use crate::context::Diagnostics;
use crate::geometry::{self, BezierShape, PathDirection};
use crate::keyframes::Interpolatable;
use crate::providers::{FontProvider, ImageHandle, TextResolver};
pub use crate::surface::MatteMode;
use crate::surface::{MaskMode, MaskOutput, TextJustification, TextOutput};

/// Non-owning link from a matted layer to the layer providing its matte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatteReference {
    pub source: LayerId,
    pub mode: MatteMode,
}

#[derive(Debug, Clone)]
pub struct MaskNode {
    state: NodeState,
    pub mode: MaskMode,
    pub inverted: bool,
    pub path: AnimatableProperty<BezierShape>,
    pub opacity: AnimatableProperty<f32>,
    pub expansion: AnimatableProperty<f32>,
    output: MaskOutput,
}

impl MaskNode {
    pub fn from_data(mask: &data::MaskProperties, diagnostics: &Diagnostics) -> Self {
        let mut node = Self {
            state: NodeState::built(),
            mode: MaskMode::from_data(mask.mode.as_deref()),
            inverted: mask.inv,
            path: AnimatableProperty::from_data(
                &mask.pt,
                BezierShape::from_data,
                BezierShape::default(),
                diagnostics,
            ),
            opacity: AnimatableProperty::from_data(&mask.o, |v| *v / 100.0, 1.0, diagnostics),
            expansion: AnimatableProperty::from_data(&mask.x, |v| *v, 0.0, diagnostics),
            output: MaskOutput {
                mode: MaskMode::Add,
                inverted: false,
                path: BezPath::new(),
                opacity: 1.0,
                expansion: 0.0,
            },
        };
        node.rebuild_output();
        node
    }

    pub fn output(&self) -> &MaskOutput {
        &self.output
    }

    pub fn output_at(&self, frame: f32) -> MaskOutput {
        MaskOutput {
            mode: self.mode,
            inverted: self.inverted,
            path: self.path.value_at(frame).to_bez_path(),
            opacity: self.opacity.value_at(frame),
            expansion: self.expansion.value_at(frame),
        }
    }
}

impl AnimatorNode for MaskNode {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.path.needs_update(frame) || self.opacity.needs_update(frame) || self.expansion.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        let mut changed = self.path.update(frame, stats);
        changed |= self.opacity.update(frame, stats);
        changed |= self.expansion.update(frame, stats);
        changed
    }

    fn rebuild_output(&mut self) {
        self.output = MaskOutput {
            mode: self.mode,
            inverted: self.inverted,
            path: self.path.value().to_bez_path(),
            opacity: *self.opacity.value(),
            expansion: *self.expansion.value(),
        };
    }
}

impl Interpolatable for TextOutput {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        if t < 1.0 {
            self.clone()
        } else {
            other.clone()
        }
    }
}

/// Text document keyframes, resolved through the host's text resolver and
/// font provider when the layer is built.
#[derive(Debug, Clone)]
pub struct TextNode {
    state: NodeState,
    pub keypath: String,
    pub document: AnimatableProperty<TextOutput>,
}

impl TextNode {
    pub fn from_data(
        text: &data::TextData,
        keypath: &str,
        resolver: &dyn TextResolver,
        fonts: &dyn FontProvider,
        diagnostics: &Diagnostics,
    ) -> Self {
        let convert = |doc: &data::TextDocument| TextOutput {
            text: resolver.resolve(keypath, &doc.t),
            font_family: doc.f.clone(),
            font: fonts.font(&doc.f),
            size: doc.s,
            justification: match doc.j {
                1 => TextJustification::Right,
                2 => TextJustification::Center,
                _ => TextJustification::Left,
            },
            tracking: doc.tr,
            line_height: doc.lh,
            fill_color: Vec4::from_array(doc.fc),
            stroke_color: doc.sc.map(Vec4::from_array),
            stroke_width: doc.sw.unwrap_or(0.0),
            box_size: doc.sz.map(Vec2::from_array),
            box_position: doc.ps.map(Vec2::from_array),
        };
        Self {
            state: NodeState::built(),
            keypath: keypath.to_string(),
            document: AnimatableProperty::from_data(&text.d, convert, TextOutput::default(), diagnostics),
        }
    }

    pub fn output(&self) -> &TextOutput {
        self.document.value()
    }
}

impl AnimatorNode for TextNode {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn has_stale_properties(&self, frame: f32) -> bool {
        self.document.needs_update(frame)
    }

    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        self.document.update(frame, stats)
    }

    fn rebuild_output(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolidContent {
    pub color: Vec4,
    pub size: Vec2,
}

impl SolidContent {
    pub fn path(&self) -> BezPath {
        geometry::rectangle(self.size * 0.5, self.size, 0.0, PathDirection::Clockwise).to_bez_path()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageContent {
    pub image: Option<ImageHandle>,
    pub size: Vec2,
}

#[derive(Debug, Clone)]
pub enum LayerContent {
    Null,
    Shape(ShapeGroupNode),
    Solid(SolidContent),
    Image(ImageContent),
    Text(TextNode),
    Precomp(Box<Composition>),
}

/// One layer of a composition. The layer owns its content and masks;
/// parent and matte links are arena indices.
#[derive(Debug, Clone)]
pub struct CompositionLayer {
    pub name: String,
    pub index: Option<u32>,
    pub parent: Option<LayerId>,
    pub transform: TransformNode,
    pub content: LayerContent,
    pub masks: Vec<MaskNode>,
    pub matte: Option<MatteReference>,
    /// Drawn only through the layers it mattes.
    pub is_matte_source: bool,
    pub time_remap: Option<AnimatableProperty<f32>>,
    pub in_frame: f32,
    pub out_frame: f32,
    pub start_time: f32,
    pub stretch: f32,
    pub hidden: bool,
    visible: bool,
}

impl CompositionLayer {
    pub(crate) fn new(layer: &data::Layer, content: LayerContent, diagnostics: &Diagnostics) -> Self {
        let stretch = if layer.sr > 0.0 {
            layer.sr
        } else {
            diagnostics.warn(format!("layer '{}' has stretch {}; using 1", layer.name(), layer.sr));
            1.0
        };
        let masks = layer
            .masks_properties
            .iter()
            .flatten()
            .map(|m| MaskNode::from_data(m, diagnostics))
            .collect();
        Self {
            name: layer.name().to_string(),
            index: layer.ind,
            parent: None,
            transform: TransformNode::from_data(&layer.ks, layer.ao == Some(1), diagnostics),
            content,
            masks,
            matte: None,
            is_matte_source: layer.td.is_some_and(|td| td != 0),
            time_remap: layer
                .tm
                .as_ref()
                .map(|tm| AnimatableProperty::from_data(tm, |v| *v, 0.0, diagnostics)),
            in_frame: layer.ip,
            out_frame: layer.op,
            start_time: layer.st,
            stretch,
            hidden: layer.is_hidden(),
            visible: false,
        }
    }

    /// Source time for a frame of the containing composition: start time
    /// and stretch retime what the layer plays, not its own properties,
    /// which are keyed in composition time.
    pub fn source_frame(&self, frame: f32) -> f32 {
        (frame - self.start_time) / self.stretch
    }

    /// Frame at which a precomposition's content is evaluated.
    pub fn content_frame(&self, frame: f32, framerate: f32) -> f32 {
        match &self.time_remap {
            Some(tm) => tm.value_at(frame) * framerate,
            None => self.source_frame(frame),
        }
    }

    /// Visible between the in and out points of the containing composition.
    pub fn is_visible_at(&self, frame: f32) -> bool {
        !self.hidden && self.in_frame <= frame && frame < self.out_frame
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> f32 {
        self.transform.opacity()
    }

    pub(crate) fn update_content(&mut self, frame: f32, framerate: f32, stats: &mut EvaluationStats) -> bool {
        self.visible = self.is_visible_at(frame);
        let mut changed = false;
        for mask in &mut self.masks {
            changed |= mask.update(frame, stats);
        }
        if let Some(tm) = &mut self.time_remap {
            changed |= tm.update(frame, stats);
        }
        changed |= match &mut self.content {
            LayerContent::Shape(group) => group.update(frame, stats),
            LayerContent::Text(text) => text.update(frame, stats),
            LayerContent::Precomp(composition) => {
                let inner = match &self.time_remap {
                    Some(tm) => *tm.value() * framerate,
                    None => (frame - self.start_time) / self.stretch,
                };
                composition.evaluate(inner, framerate, stats)
            }
            LayerContent::Null | LayerContent::Solid(_) | LayerContent::Image(_) => false,
        };
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AssertionPolicy;
    use serde_json::json;

    fn layer(value: serde_json::Value) -> data::Layer {
        serde_json::from_value(value).expect("valid layer")
    }

    #[test]
    fn source_time_applies_start_and_stretch() {
        let raw = layer(json!({"ty": 3, "ip": 0, "op": 100, "st": 10, "sr": 2}));
        let l = CompositionLayer::new(&raw, LayerContent::Null, &Diagnostics::default());
        assert_eq!(l.source_frame(30.0), 10.0);
        assert_eq!(l.content_frame(30.0, 30.0), 10.0);
        assert!(l.is_visible_at(0.0));
        assert!(!l.is_visible_at(100.0), "out point is exclusive");
    }

    #[test]
    fn time_remap_drives_content_frame() {
        let raw = layer(json!({
            "ty": 0, "ip": 0, "op": 60,
            "tm": {"a": 1, "k": [{"t": 0, "s": [0]}, {"t": 60, "s": [1]}]}
        }));
        let l = CompositionLayer::new(&raw, LayerContent::Null, &Diagnostics::default());
        assert_eq!(l.content_frame(30.0, 30.0), 15.0);
    }

    #[test]
    fn invalid_stretch_degrades_with_a_warning() {
        let diagnostics = Diagnostics::new(AssertionPolicy::Log);
        let raw = layer(json!({"ty": 3, "sr": 0}));
        let l = CompositionLayer::new(&raw, LayerContent::Null, &diagnostics);
        assert_eq!(l.stretch, 1.0);
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn text_goes_through_resolver_and_steps() {
        let text: data::TextData = serde_json::from_value(json!({"d": {"k": [
            {"t": 0, "s": {"t": "Hello", "f": "Sans", "s": 12, "fc": [0, 0, 0, 1]}},
            {"t": 10, "s": {"t": "World", "f": "Sans", "s": 12, "fc": [0, 0, 0, 1]}}
        ]}}))
        .expect("valid text");
        let resolver = |keypath: &str, source: &str| format!("{keypath}:{source}");
        let mut node = TextNode::from_data(
            &text,
            "Title",
            &resolver,
            &crate::providers::NoFonts,
            &Diagnostics::default(),
        );
        let mut stats = EvaluationStats::default();
        node.update(9.9, &mut stats);
        assert_eq!(node.output().text, "Title:Hello");
        node.update(10.0, &mut stats);
        assert_eq!(node.output().text, "Title:World");
    }

    #[test]
    fn solid_covers_its_size() {
        let solid = SolidContent {
            color: Vec4::ONE,
            size: Vec2::new(100.0, 50.0),
        };
        let bounds = kurbo::Shape::bounding_box(&solid.path());
        assert_eq!((bounds.x0, bounds.y0, bounds.x1, bounds.y1), (0.0, 0.0, 100.0, 50.0));
    }
}

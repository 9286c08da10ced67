//! The capability interface both strategies write through.
//!
//! A host wraps its own layer objects behind [`TargetSurface`] and
//! [`TargetSurfaceHandle`]; the engine never owns a native type.

mod binding;
mod recording;

pub use binding::{
    CompositionBinding, ContentBinding, CopyBinding, EntryBinding, GroupBinding, LayerBinding,
    SurfaceBindings,
};
pub(crate) use binding::PushedLayer;
pub use recording::{HandleRecord, PresentedState, RecordingSurface};

use glam::{Mat3, Vec2, Vec4};
use kurbo::BezPath;

use crate::compiled::WrappedTimeline;
use crate::error::Result;
use crate::geometry::{DashPattern, GradientRamp, TrimValues};
use crate::providers::{FontHandle, ImageHandle};
use crate::snapshot::ValueSender;

/// Identifies a handle created by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub usize);

/// What a handle stands for in the composition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleRole {
    Layer,
    Group,
    RepeaterCopy,
    Render,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    pub fn from_data(r: Option<u8>) -> Self {
        match r {
            Some(2) => FillRule::EvenOdd,
            _ => FillRule::NonZero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    Butt,
    #[default]
    Round,
    Square,
}

impl LineCap {
    pub fn from_data(lc: u8) -> Self {
        match lc {
            1 => LineCap::Butt,
            3 => LineCap::Square,
            _ => LineCap::Round,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    Miter,
    #[default]
    Round,
    Bevel,
}

impl LineJoin {
    pub fn from_data(lj: u8) -> Self {
        match lj {
            1 => LineJoin::Miter,
            3 => LineJoin::Bevel,
            _ => LineJoin::Round,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientKind {
    Linear,
    Radial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientPaint {
    pub kind: GradientKind,
    pub start: Vec2,
    pub end: Vec2,
    pub ramp: GradientRamp,
    /// Declared colour stop count, needed to decode raw ramp samples.
    pub stop_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Vec4),
    Gradient(GradientPaint),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub paint: Paint,
    pub opacity: f32,
    pub rule: FillRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub paint: Paint,
    pub opacity: f32,
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    pub dash: Option<DashPattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaintOutput {
    Fill(FillStyle),
    Stroke(StrokeStyle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskMode {
    #[default]
    Add,
    Subtract,
    Intersect,
    Lighten,
    Darken,
    Difference,
    None,
}

impl MaskMode {
    pub fn from_data(mode: Option<&str>) -> Self {
        match mode {
            Some("s") => MaskMode::Subtract,
            Some("i") => MaskMode::Intersect,
            Some("l") => MaskMode::Lighten,
            Some("d") => MaskMode::Darken,
            Some("f") => MaskMode::Difference,
            Some("n") => MaskMode::None,
            _ => MaskMode::Add,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaskOutput {
    pub mode: MaskMode,
    pub inverted: bool,
    pub path: BezPath,
    pub opacity: f32,
    pub expansion: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatteMode {
    Alpha,
    AlphaInverted,
    Luma,
    LumaInverted,
}

impl MatteMode {
    pub fn from_data(tt: u8) -> Option<Self> {
        match tt {
            1 => Some(MatteMode::Alpha),
            2 => Some(MatteMode::AlphaInverted),
            3 => Some(MatteMode::Luma),
            4 => Some(MatteMode::LumaInverted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextJustification {
    #[default]
    Left,
    Right,
    Center,
}

/// A fully resolved text document. Text never blends; it steps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextOutput {
    pub text: String,
    pub font_family: String,
    pub font: Option<FontHandle>,
    pub size: f32,
    pub justification: TextJustification,
    pub tracking: f32,
    pub line_height: f32,
    pub fill_color: Vec4,
    pub stroke_color: Option<Vec4>,
    pub stroke_width: f32,
    pub box_size: Option<Vec2>,
    pub box_position: Option<Vec2>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformChannel {
    Anchor,
    Position,
    Scale,
    Rotation,
    Skew,
    SkewAxis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaintChannel {
    Color,
    Opacity,
    Width,
    GradientStart,
    GradientEnd,
    GradientRamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrimChannel {
    Start,
    End,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaskChannel {
    Path,
    Opacity,
    Expansion,
}

/// Names the property an installed timeline drives.
///
/// Transform components carry a depth: 0 is the handle's own transform,
/// 1 its parent layer's, and so on. Surfaces compose deeper transforms
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimelineKey {
    Transform {
        depth: usize,
        channel: TransformChannel,
    },
    Opacity,
    Visibility,
    Path,
    Paint(PaintChannel),
    Trim(TrimChannel),
    Mask {
        index: usize,
        channel: MaskChannel,
    },
    Text,
}

/// One per-node object on the rendering side.
pub trait TargetSurfaceHandle {
    fn set_transform(&mut self, transform: Mat3);

    fn set_opacity(&mut self, opacity: f32);

    fn set_visible(&mut self, visible: bool);

    fn set_path(&mut self, path: &BezPath);

    fn set_fill(&mut self, fill: &FillStyle);

    fn set_stroke(&mut self, stroke: &StrokeStyle);

    fn set_trim(&mut self, trim: Option<TrimValues>);

    fn set_masks(&mut self, masks: &[MaskOutput]);

    fn set_text(&mut self, text: &TextOutput);

    fn set_image(&mut self, image: Option<&ImageHandle>, size: Vec2);

    fn install_timeline(&mut self, key: TimelineKey, timeline: WrappedTimeline);

    fn remove_timelines(&mut self);
}

/// Factory and owner of handles.
pub trait TargetSurface {
    type Handle: TargetSurfaceHandle;

    /// Handles created later draw above earlier siblings.
    fn create_handle(&mut self, parent: Option<HandleId>, role: HandleRole, name: &str) -> HandleId;

    fn handle_mut(&mut self, id: HandleId) -> Option<&mut Self::Handle>;

    fn set_matte(&mut self, target: HandleId, source: HandleId, mode: MatteMode);

    /// Asks the host for a rendered snapshot; the host replies through
    /// `reply` at most once, possibly later.
    fn request_snapshot(&mut self, reply: ValueSender<Vec<u8>>) -> Result<()>;

    /// Drops every handle and matte link. Ids handed out afterwards start
    /// over.
    fn clear(&mut self);
}

//! The dependency-tracked node graph built once per document.
//!
//! Every node caches its output and is rebuilt for a frame only when one
//! of its own properties went stale (`has_local_updates`) or a node it
//! depends on changed (`has_upstream_updates`). Evaluating the same frame
//! twice therefore performs no work the second time.

mod builder;
mod layer;
mod property;
mod shape;
mod transform;
mod tree;

pub use layer::{
    CompositionLayer, ImageContent, LayerContent, MaskNode, MatteMode, MatteReference,
    SolidContent, TextNode,
};
pub use property::AnimatableProperty;
pub use shape::{
    CombinedShapeNode, EllipseNode, FillNode, GradientNode, GroupEntry, PathNode, RectangleNode,
    RenderItem, RepeaterCopy, RepeaterNode, ShapeGroupNode, ShapeItem, StarNode, StrokeNode,
    StrokeParams, TrimNode,
};
pub use transform::{PositionChannel, TransformComponents, TransformNode};
pub use tree::{Composition, CompositionTree};

/// Index of a layer in the tree's arena. Parent and matte links use it as a
/// non-owning reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

/// Work performed by one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Keyframe interpolations performed.
    pub property_evaluations: usize,
    /// Node outputs recomputed.
    pub node_rebuilds: usize,
}

impl EvaluationStats {
    pub fn recomputations(&self) -> usize {
        self.property_evaluations + self.node_rebuilds
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeState {
    pub has_local_updates: bool,
    pub has_upstream_updates: bool,
    /// Bumped whenever the output changes; surfaces compare it against the
    /// revision they last received.
    revision: u64,
}

impl NodeState {
    /// Starts at revision 1 so the first push always happens.
    pub fn built() -> Self {
        Self {
            has_local_updates: false,
            has_upstream_updates: false,
            revision: 1,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump(&mut self) {
        self.revision += 1;
    }

    fn clear(&mut self) {
        self.has_local_updates = false;
        self.has_upstream_updates = false;
    }
}

/// A graph node holding animatable properties and a cached output.
pub trait AnimatorNode {
    fn state(&self) -> &NodeState;

    fn state_mut(&mut self) -> &mut NodeState;

    fn has_stale_properties(&self, frame: f32) -> bool;

    /// Brings every property to `frame`; returns whether any value changed.
    fn update_properties(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool;

    /// Recomputes the cached output from the current property values.
    fn rebuild_output(&mut self);

    /// Runs the state machine for `frame`. Returns whether the output
    /// changed.
    fn update(&mut self, frame: f32, stats: &mut EvaluationStats) -> bool {
        if self.has_stale_properties(frame) {
            self.state_mut().has_local_updates = true;
        }
        let state = *self.state();
        if !state.has_local_updates && !state.has_upstream_updates {
            return false;
        }
        let properties_changed = state.has_local_updates && self.update_properties(frame, stats);
        let changed = properties_changed || state.has_upstream_updates;
        if changed {
            self.rebuild_output();
            stats.node_rebuilds += 1;
            self.state_mut().bump();
        }
        self.state_mut().clear();
        changed
    }

    fn revision(&self) -> u64 {
        self.state().revision()
    }
}
